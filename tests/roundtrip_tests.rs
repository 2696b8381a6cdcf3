use std::future::Future;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use bot_probe_rs::roundtrip::{run_round_trip, ChatPlan, ChatVocabulary, RoundTripOutcome};
use bot_probe_rs::types::ProbeTarget;

/// Accept one WebSocket connection on an ephemeral port and hand it to `handler`.
async fn spawn_fixture<F, Fut>(handler: F) -> ProbeTarget
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = accept_async(stream).await.expect("handshake");
        handler(ws).await;
    });
    ProbeTarget::new("127.0.0.1", port)
}

async fn send(ws: &mut WebSocketStream<TcpStream>, event: &str, payload: Value) {
    let frame = serde_json::to_string(&json!({ "event": event, "payload": payload }))
        .expect("fixture envelope");
    ws.send(Message::Text(frame)).await.expect("fixture send");
}

fn plan(vocabulary: ChatVocabulary, deadline: Duration) -> ChatPlan {
    ChatPlan {
        vocabulary,
        room_id: "default".into(),
        user_id: "test-user".into(),
        user_name: "Test User".into(),
        text: "Hello Server Bod, are you working?".into(),
        settle: Duration::from_millis(100),
        deadline,
    }
}

#[tokio::test]
async fn rooms_round_trip_skips_interleaved_events_and_answers() {
    let target = spawn_fixture(|mut ws: WebSocketStream<TcpStream>| async move {
        send(&mut ws, "CONNECTED", json!({"id": "sock-1"})).await;
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            let envelope: Value = serde_json::from_str(&text).expect("fixture got JSON");
            match envelope["event"].as_str() {
                Some("ROOM_JOINING") => {
                    send(&mut ws, "ROOM_JOINED", json!({"roomId": "default"})).await;
                }
                Some("SEND_MESSAGE") => {
                    // A broadcast the harness must skip, then the real answer.
                    send(&mut ws, "ROOM_JOINED", json!({"roomId": "default"})).await;
                    send(
                        &mut ws,
                        "MESSAGE",
                        json!({"text": "I am alive", "userId": "agent"}),
                    )
                    .await;
                }
                _ => {}
            }
        }
    })
    .await;

    let outcome = run_round_trip(
        &target,
        &plan(ChatVocabulary::rooms(), Duration::from_secs(5)),
    )
    .await;

    assert_eq!(
        outcome,
        RoundTripOutcome::Answered(json!({"text": "I am alive", "userId": "agent"}))
    );
    assert!(outcome.succeeded());
}

#[tokio::test]
async fn plain_round_trip_echoes_stimulus_payload() {
    let target = spawn_fixture(|mut ws: WebSocketStream<TcpStream>| async move {
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            let envelope: Value = serde_json::from_str(&text).expect("fixture got JSON");
            if envelope["event"] == "message" {
                send(&mut ws, "message", envelope["payload"].clone()).await;
            }
        }
    })
    .await;

    let outcome = run_round_trip(
        &target,
        &plan(ChatVocabulary::plain(), Duration::from_secs(5)),
    )
    .await;

    // The plain vocabulary carries no roomId in the stimulus.
    assert_eq!(
        outcome,
        RoundTripOutcome::Answered(json!({
            "text": "Hello Server Bod, are you working?",
            "userId": "test-user",
            "userName": "Test User",
        }))
    );
}

#[tokio::test]
async fn times_out_after_the_configured_deadline() {
    let target = spawn_fixture(|mut ws: WebSocketStream<TcpStream>| async move {
        // Read and never answer.
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let started = Instant::now();
    let outcome = run_round_trip(
        &target,
        &plan(ChatVocabulary::rooms(), Duration::from_millis(400)),
    )
    .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, RoundTripOutcome::TimedOut);
    assert!(!outcome.succeeded());
    assert!(elapsed >= Duration::from_millis(350), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "deadline overshot: {elapsed:?}");
}

#[tokio::test]
async fn remote_close_is_distinguishable_from_timeout() {
    let target = spawn_fixture(|mut ws: WebSocketStream<TcpStream>| async move {
        let _ = ws.close(None).await;
    })
    .await;

    let outcome = run_round_trip(
        &target,
        &plan(ChatVocabulary::plain(), Duration::from_secs(5)),
    )
    .await;

    assert_eq!(outcome, RoundTripOutcome::Disconnected);
    assert!(!outcome.succeeded());
}

#[tokio::test]
async fn connect_failure_reports_channel_error() {
    // Bind and drop to get a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let outcome = run_round_trip(
        &ProbeTarget::new("127.0.0.1", port),
        &plan(ChatVocabulary::rooms(), Duration::from_secs(5)),
    )
    .await;

    assert!(matches!(outcome, RoundTripOutcome::ChannelError(_)));
    assert!(!outcome.succeeded());
}
