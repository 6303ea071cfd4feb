//! select-echo: a single-threaded TCP echo server.
//!
//! Every connection is serviced from one thread by a level-triggered
//! select(2) loop:
//! - non-blocking listener and connection sockets
//! - per-connection write staging with a fixed capacity
//! - readiness-driven dispatch, one syscall's worth of work per report
//!
//! Bytes a client sends come back to that client unchanged and in order;
//! the payload is never interpreted.

mod config;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_clients = config.max_clients,
        write_buffer = config.write_buffer_size,
        read_buffer = config.read_buffer_size,
        "Starting select-echo server"
    );

    runtime::run(config)?;
    Ok(())
}
