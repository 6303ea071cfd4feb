//! The select(2) event loop.
//!
//! One thread drives every connection. Each iteration copies the master
//! interest sets into working copies, blocks on the selector, and then
//! dispatches: the listener first (one accept), then every occupied slot
//! in index order (one read, then one flush pass if the same descriptor
//! still owns the slot). Level-triggered readiness re-reports whatever a
//! handler left undone, so single-shot accepts and reads lose nothing.
//!
//! Per-connection failures release the affected slot and nothing else;
//! only a selector failure ends the loop.

use crate::config::Config;
use crate::runtime::buffer::FlushStatus;
use crate::runtime::clients::ClientTable;
use crate::runtime::listener::bind_listener;
use crate::runtime::selector::{self, FdSet};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::{debug, info, trace, warn};

/// Single-threaded echo server.
///
/// Owns the listener, the client table, the master interest sets, and a
/// read scratch buffer shared by every slot.
pub struct Server {
    listener: TcpListener,
    clients: ClientTable,
    /// Master read interest: the listener plus every occupied slot.
    read_interest: FdSet,
    /// Master write interest: slots whose buffer held bytes at last look.
    write_interest: FdSet,
    /// Highest descriptor ever registered. Never lowered, not even when
    /// the connection holding it goes away.
    max_fd: RawFd,
    /// Scratch for one receive; only this thread reads sockets.
    read_buf: Box<[u8]>,
}

impl Server {
    /// Bind the listener and prepare an empty client table.
    pub fn bind(config: &Config) -> io::Result<Server> {
        let listener = bind_listener(config.bind_addr()?)?;
        let listener_fd = listener.as_raw_fd();
        if listener_fd as usize >= selector::FD_SETSIZE {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("listener fd {listener_fd} outside select(2) range"),
            ));
        }

        let mut read_interest = FdSet::new();
        read_interest.insert(listener_fd);

        Ok(Server {
            listener,
            clients: ClientTable::new(config.max_clients, config.write_buffer_size),
            read_interest,
            write_interest: FdSet::new(),
            max_fd: listener_fd,
            read_buf: vec![0u8; config.read_buffer_size].into_boxed_slice(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Drive the loop forever. Returns only when the selector fails with
    /// something other than an interrupted wait.
    pub fn run(&mut self) -> io::Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, max_clients = self.clients.capacity(), "Listening");

        loop {
            // Working copies; select overwrites them with the ready subsets.
            let mut read_ready = self.read_interest;
            let mut write_ready = self.write_interest;

            match selector::select(self.max_fd + 1, &mut read_ready, &mut write_ready) {
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if read_ready.contains(self.listener.as_raw_fd()) {
                self.accept_ready();
            }

            for idx in 0..self.clients.capacity() {
                let fd = match self.clients.fd(idx) {
                    Some(fd) => fd,
                    None => continue,
                };

                if read_ready.contains(fd) {
                    self.client_readable(idx);
                }

                // The read handler may have released the slot; flush only
                // while the same descriptor still owns it.
                if self.clients.fd(idx) == Some(fd) && write_ready.contains(fd) {
                    self.client_writable(idx);
                }
            }
        }
    }

    /// One accept per listener readiness report. Anything still pending
    /// is reported again on the next iteration.
    fn accept_ready(&mut self) {
        let (stream, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            // Spurious readiness; nothing was pending after all.
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                return;
            }
        };

        if let Err(e) = stream.set_nonblocking(true) {
            warn!(peer = %peer, error = %e, "Failed to set connection non-blocking");
            return;
        }

        let fd = stream.as_raw_fd();
        if fd as usize >= selector::FD_SETSIZE {
            warn!(peer = %peer, fd, "Descriptor outside select(2) range, rejecting");
            return;
        }

        self.read_interest.insert(fd);
        if fd > self.max_fd {
            self.max_fd = fd;
        }

        match self.clients.install(stream) {
            Some(slot) => {
                info!(peer = %peer, fd, slot, active = self.clients.len(), "Client connected");
            }
            None => {
                // Table full: undo the registration; dropping the stream
                // inside the table already closed the descriptor.
                self.read_interest.remove(fd);
                warn!(peer = %peer, fd, "Client table full, rejecting connection");
            }
        }
    }

    /// One receive per readiness report. Received bytes are staged in the
    /// slot's write buffer and write interest is armed; end of stream,
    /// a read error, or a buffer overflow releases the slot.
    fn client_readable(&mut self, idx: usize) {
        let slot = match self.clients.get_mut(idx) {
            Some(slot) => slot,
            None => return,
        };
        let stream = match slot.stream.as_mut() {
            Some(stream) => stream,
            None => return,
        };
        let fd = stream.as_raw_fd();

        let n = match stream.read(&mut self.read_buf) {
            Ok(0) => {
                info!(fd, slot = idx, "Client disconnected");
                self.close_client(idx);
                return;
            }
            Ok(n) => n,
            // Spurious readiness; the next report will retry.
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                debug!(fd, error = %e, "Read failed");
                self.close_client(idx);
                return;
            }
        };

        debug!(fd, bytes = n, "Received data");

        if slot.write_buf.append(&self.read_buf[..n]).is_err() {
            warn!(fd, bytes = n, "Write buffer full, closing connection");
            self.close_client(idx);
            return;
        }

        self.write_interest.insert(fd);
    }

    /// Flush as much of the slot's staged bytes as the socket accepts.
    /// A full drain disarms write interest; an error releases the slot.
    fn client_writable(&mut self, idx: usize) {
        let slot = match self.clients.get_mut(idx) {
            Some(slot) => slot,
            None => return,
        };
        let (fd, status) = match slot.stream.as_mut() {
            Some(stream) => (stream.as_raw_fd(), slot.write_buf.flush(stream)),
            None => return,
        };

        match status {
            Ok(FlushStatus::Done) => {
                trace!(fd, "Write buffer drained");
                self.write_interest.remove(fd);
            }
            // Kernel pushed back; stay armed and let the next writable
            // report continue from the recorded offset.
            Ok(FlushStatus::Partial) => {}
            Err(e) => {
                debug!(fd, error = %e, "Write failed");
                self.close_client(idx);
            }
        }
    }

    /// Release a slot: clear both interest bits and drop the stream,
    /// which closes the descriptor. Releasing a free slot is a no-op, so
    /// a double close cannot touch a recycled descriptor.
    fn close_client(&mut self, idx: usize) {
        if let Some(slot) = self.clients.get(idx) {
            if !slot.write_buf.is_empty() {
                debug!(slot = idx, pending = slot.write_buf.pending(), "Dropping unsent bytes");
            }
        }

        let stream = match self.clients.release(idx) {
            Some(stream) => stream,
            None => return,
        };
        let fd = stream.as_raw_fd();
        self.read_interest.remove(fd);
        self.write_interest.remove(fd);
        debug!(fd, slot = idx, "Connection closed");
    }
}
