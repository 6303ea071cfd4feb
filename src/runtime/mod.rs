//! Single-threaded echo runtime.
//!
//! Readiness-based I/O over `select(2)`: the loop waits until sockets are
//! ready, then performs non-blocking accept, read, and write calls, one
//! per readiness report.
//!
//! Building blocks:
//! - `WriteBuffer`: per-connection staging for unsent echo bytes
//! - `ClientTable`: fixed-capacity slot table, lowest index first
//! - `FdSet`/`select`: safe wrappers over the libc descriptor sets
//! - `Server`: the event loop composing all of the above

mod buffer;
mod clients;
mod event_loop;
mod listener;
mod selector;

pub use event_loop::Server;

use crate::config::Config;
use std::io;

/// Bind and run the echo server. Never returns in normal operation.
pub fn run(config: Config) -> io::Result<()> {
    let mut server = Server::bind(&config)?;
    server.run()
}
