use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use crate::types::{ProbeReport, ProbeResult, ProbeStage, ProbeTarget};

/// Default budget for the raw TCP connect stage.
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default budget for the application-level HTTP stage.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the two-stage liveness probe against `target`.
///
/// - Stage 1 bounds a raw `TcpStream::connect` with `port_timeout`.
/// - Stage 2 issues `GET /` with `http_timeout`; any status below 500 counts
///   as healthy. Skipped entirely when stage 1 fails.
///
/// Every failure mode (connect error, reset, timeout, 5xx) is folded into a
/// stage result; nothing is retried here. Callers that want retries re-invoke.
pub async fn probe(
    target: &ProbeTarget,
    port_timeout: Duration,
    http_timeout: Duration,
) -> ProbeReport {
    let mut results = Vec::with_capacity(2);

    let port = check_port(target, port_timeout).await;
    let port_ok = port.passed;
    results.push(port);
    if !port_ok {
        return ProbeReport {
            results,
            healthy: false,
        };
    }

    let app = check_http(target, http_timeout).await;
    let healthy = app.passed;
    results.push(app);

    ProbeReport { results, healthy }
}

/// Stage 1: is anything listening on the target port?
///
/// The stream is dropped (closed) on every path, including timeout, where the
/// pending connect future is dropped along with its socket.
async fn check_port(target: &ProbeTarget, timeout: Duration) -> ProbeResult {
    let addr = target.authority();
    let (passed, detail) = match time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            (true, format!("connected to {addr}"))
        }
        Ok(Err(e)) => (false, format!("Port not listening ({e})")),
        Err(_) => (
            false,
            format!("Port not listening (connect timed out after {timeout:?})"),
        ),
    };
    ProbeResult {
        stage: ProbeStage::Port,
        passed,
        detail,
    }
}

/// Stage 2: does the service answer HTTP on its root path?
async fn check_http(target: &ProbeTarget, timeout: Duration) -> ProbeResult {
    let url = target.http_root();
    let fail = |detail: String| ProbeResult {
        stage: ProbeStage::Application,
        passed: false,
        detail,
    };

    let client = match reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("bot-probe-rs/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(c) => c,
        Err(e) => return fail(format!("failed to build HTTP client: {e}")),
    };

    match client
        .get(&url)
        .header(reqwest::header::ACCEPT, "*/*")
        .send()
        .await
    {
        Ok(resp) => {
            let status = resp.status();
            // Any response short of a server error means the service is up.
            if status.as_u16() < 500 {
                ProbeResult {
                    stage: ProbeStage::Application,
                    passed: true,
                    detail: format!("GET / -> {status}"),
                }
            } else {
                fail(format!("server error: GET / -> {status}"))
            }
        }
        Err(e) if e.is_timeout() => fail(format!("HTTP request timed out after {timeout:?}")),
        Err(e) => fail(format!("HTTP request failed: {e}")),
    }
}
