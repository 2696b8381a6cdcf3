use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use time::{format_description::well_known, OffsetDateTime};

use bot_probe_rs::probe;
use bot_probe_rs::roundtrip::{self, ChatPlan, ChatVocabulary};
use bot_probe_rs::types::ProbeTarget;

/// bot-probe-rs — liveness prober and chat round-trip harness for an agent service.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bot-probe-rs",
    version,
    about = "Check that a conversational-agent service is alive and answering.",
    long_about = None
)]
struct Cli {
    /// Target host.
    #[arg(long, env = "HOST", default_value = "localhost")]
    host: String,

    /// Target API port.
    #[arg(long, env = "API_PORT", default_value_t = 3000)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Two-stage liveness probe: TCP connect, then HTTP GET /. Exits 0 if healthy.
    Health {
        /// TCP connect timeout in milliseconds.
        #[arg(long = "port-timeout-ms", default_value_t = 3000)]
        port_timeout_ms: u64,

        /// HTTP request timeout in milliseconds.
        #[arg(long = "http-timeout-ms", default_value_t = 5000)]
        http_timeout_ms: u64,
    },
    /// Send one chat stimulus over the event channel and await the reply.
    Chat {
        /// Event-tag vocabulary spoken on the channel.
        #[arg(long, default_value = "rooms", value_parser = ["plain", "rooms"])]
        vocabulary: String,

        /// Stimulus text.
        #[arg(long, default_value = "Hello Server Bod, are you working?")]
        text: String,

        #[arg(long = "room-id", default_value = "default")]
        room_id: String,

        #[arg(long = "user-id", default_value = "test-user")]
        user_id: String,

        #[arg(long = "user-name", default_value = "Test User")]
        user_name: String,

        /// Overall deadline in milliseconds (default comes from the vocabulary).
        #[arg(long = "deadline-ms")]
        deadline_ms: Option<u64>,

        /// Pause between room join and stimulus, in milliseconds.
        #[arg(long = "settle-ms", default_value_t = 1000)]
        settle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let target = ProbeTarget::new(cli.host, cli.port);

    match cli.command {
        Command::Health {
            port_timeout_ms,
            http_timeout_ms,
        } => {
            run_health(
                &target,
                Duration::from_millis(port_timeout_ms),
                Duration::from_millis(http_timeout_ms),
            )
            .await
        }
        Command::Chat {
            vocabulary,
            text,
            room_id,
            user_id,
            user_name,
            deadline_ms,
            settle_ms,
        } => {
            let Some(vocabulary) = ChatVocabulary::preset(&vocabulary) else {
                eprintln!("Unknown vocabulary: {vocabulary}");
                return ExitCode::FAILURE;
            };
            let deadline = deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(vocabulary.default_deadline);
            let plan = ChatPlan {
                vocabulary,
                room_id,
                user_id,
                user_name,
                text,
                settle: Duration::from_millis(settle_ms),
                deadline,
            };
            run_chat(&target, &plan).await
        }
    }
}

async fn run_health(
    target: &ProbeTarget,
    port_timeout: Duration,
    http_timeout: Duration,
) -> ExitCode {
    println!("Agent health check - {}", now_rfc3339());
    println!("Checking {}...", target.authority());

    let report = probe::probe(target, port_timeout, http_timeout).await;
    for result in &report.results {
        let verdict = if result.passed { "PASS" } else { "FAIL" };
        println!("{verdict}: {} stage - {}", result.stage, result.detail);
    }

    if report.healthy {
        println!("HEALTHY: agent service is running");
        ExitCode::SUCCESS
    } else {
        println!("UNHEALTHY: agent service failed the check");
        ExitCode::FAILURE
    }
}

async fn run_chat(target: &ProbeTarget, plan: &ChatPlan) -> ExitCode {
    println!("bot-probe-rs chat round trip:");
    println!("  target    : {}", target.authority());
    println!("  stimulus  : {} ({})", plan.text, plan.vocabulary.stimulus);
    println!(
        "  expecting : {} within {:?}",
        plan.vocabulary.responses.join("/"),
        plan.deadline
    );

    let outcome = roundtrip::run_round_trip(target, plan).await;
    if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
