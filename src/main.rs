use std::io::{self, Write};
use studygroupd::config::Config;
use studygroupd::ipc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs go to stderr; stdout carries the protocol.
fn setup_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn write_line(stdout: &mut io::Stdout, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            setup_logging("info");
            tracing::error!("invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };
    setup_logging(&config.log_level);

    let mut state = ipc::AppState::new(config);
    if let Err(e) = state.open_configured_store() {
        // Still serve; the host can pick a store with store.select.
        tracing::error!("could not open configured store: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                write_line(
                    &mut stdout,
                    &serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                );
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req).await;
        write_line(&mut stdout, &resp);
    }
    tracing::info!("stdin closed, shutting down");
}
