//! labeld binary.
//!
//! Binds the REQ/REP endpoint given on the command line and serves one
//! session: configure once, process until the sentinel arrives.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use labeld_core::config::{Cli, ServerConfig};
use labeld_core::responder::Responder;
use labeld_core::session::Session;
use labeld_core::transport::Endpoint;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .parse_lossy(cli.log_filter.as_deref().unwrap_or("labeld=info,labeld_core=info")),
        )
        .with_target(true)
        .init();

    let config = ServerConfig::from_cli(&cli)?;
    let endpoint = Endpoint::parse(&config.listen)?;
    info!(%endpoint, framing = ?config.framing, "labeld starting up");

    let context = Arc::new(zmq::Context::new());
    let responder = Responder::new(
        endpoint,
        context,
        Duration::from_secs(config.recv_timeout_secs),
    );
    let mut handle = responder.run(Session::new(config.framing)).await?;

    // An interrupt drains the in-flight reply and unwinds the loop, same
    // as the sentinel.
    let shutdown = handle.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            shutdown.notify_one();
        }
    });

    handle.wait().await;
    info!("session closed");
    Ok(())
}
