//! rwork CLI
//!
//! Serves workspace operations over stdio: one JSON request per input line,
//! one JSON reply per output line. Logs go to stderr.

use rwork::config::{debug_enabled, Config, Validate};
use rwork::dispatch::handle_line;
use rwork::Agent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() {
    let level = if debug_enabled() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!(warning = %warning, "config warning");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let agent = Agent::new(config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rwork ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read request");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(&agent, &line).await;
        let mut out = match serde_json::to_vec(&reply) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize reply");
                continue;
            }
        };
        out.push(b'\n');
        if let Err(e) = stdout.write_all(&out).await {
            tracing::error!(error = %e, "failed to write reply");
            break;
        }
        if let Err(e) = stdout.flush().await {
            tracing::error!(error = %e, "failed to flush reply");
            break;
        }
    }

    tracing::info!("stdin closed, exiting");
}
