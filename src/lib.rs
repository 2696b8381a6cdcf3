//! Library crate for bot-probe-rs exposing reusable modules.
pub mod channel;
pub mod probe;
pub mod roundtrip;
pub mod types;
