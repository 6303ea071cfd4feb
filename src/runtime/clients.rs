//! Fixed-length client slot table.
//!
//! Capacity is pinned at construction; behind `select(2)` a growable
//! container would have nothing to grow into. Slots are claimed by linear
//! scan from index 0, so the lowest vacated slot is always the next one
//! reused. A free slot holds `None`; dropping the stream is what closes
//! the descriptor.

use crate::runtime::buffer::WriteBuffer;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};

/// One client connection: the socket and its pending-echo staging buffer.
pub struct ClientSlot {
    /// `None` marks the slot free.
    pub stream: Option<TcpStream>,
    pub write_buf: WriteBuffer,
}

impl ClientSlot {
    fn new(write_capacity: usize) -> Self {
        Self {
            stream: None,
            write_buf: WriteBuffer::with_capacity(write_capacity),
        }
    }

    /// Descriptor of the occupying connection, if any.
    pub fn fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }
}

/// Fixed-capacity table of client slots.
pub struct ClientTable {
    slots: Vec<ClientSlot>,
}

impl ClientTable {
    /// A table of `capacity` free slots, each owning a `write_capacity`
    /// byte staging buffer.
    pub fn new(capacity: usize, write_capacity: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| ClientSlot::new(write_capacity))
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.stream.is_some()).count()
    }

    /// Check if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install a connection in the lowest-index free slot.
    ///
    /// Returns `None` when every slot is occupied; the stream is dropped,
    /// closing the descriptor.
    pub fn install(&mut self, stream: TcpStream) -> Option<usize> {
        let idx = self.slots.iter().position(|s| s.stream.is_none())?;
        let slot = &mut self.slots[idx];
        slot.write_buf.clear();
        slot.stream = Some(stream);
        Some(idx)
    }

    pub fn get(&self, idx: usize) -> Option<&ClientSlot> {
        self.slots.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ClientSlot> {
        self.slots.get_mut(idx)
    }

    /// Descriptor occupying slot `idx`, if any.
    pub fn fd(&self, idx: usize) -> Option<RawFd> {
        self.slots.get(idx)?.fd()
    }

    /// Free slot `idx`, handing the stream back to the caller. The slot's
    /// buffer is reset. Releasing a free slot is a no-op returning `None`.
    pub fn release(&mut self, idx: usize) -> Option<TcpStream> {
        let slot = self.slots.get_mut(idx)?;
        let stream = slot.stream.take()?;
        slot.write_buf.clear();
        Some(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let a = TcpStream::connect(addr).unwrap();
        let (b, _) = listener.accept().unwrap();
        (a, b)
    }

    #[test]
    fn test_install_picks_lowest_free_slot() {
        let mut table = ClientTable::new(3, 64);
        assert_eq!(table.len(), 0);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 3);

        let (a, _pa) = tcp_pair();
        let (b, _pb) = tcp_pair();
        let a_fd = a.as_raw_fd();

        assert_eq!(table.install(a), Some(0));
        assert_eq!(table.install(b), Some(1));
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
        assert_eq!(table.fd(0), Some(a_fd));
        assert_eq!(table.fd(2), None);
    }

    #[test]
    fn test_exhausted_table_drops_the_stream() {
        let mut table = ClientTable::new(1, 64);

        let (a, _pa) = tcp_pair();
        assert_eq!(table.install(a), Some(0));

        let (b, mut peer_b) = tcp_pair();
        assert_eq!(table.install(b), None);

        // The rejected stream was dropped, so its peer sees end of stream.
        peer_b
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(peer_b.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_release_makes_slot_reusable() {
        let mut table = ClientTable::new(3, 64);
        let (a, _pa) = tcp_pair();
        let (b, _pb) = tcp_pair();
        let (c, _pc) = tcp_pair();
        table.install(a);
        table.install(b);
        table.install(c);

        assert!(table.release(1).is_some());
        assert_eq!(table.len(), 2);
        assert_eq!(table.fd(1), None);

        // The vacated middle slot is the next one claimed.
        let (d, _pd) = tcp_pair();
        let d_fd = d.as_raw_fd();
        assert_eq!(table.install(d), Some(1));
        assert_eq!(table.fd(1), Some(d_fd));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut table = ClientTable::new(2, 64);
        let (a, _pa) = tcp_pair();
        table.install(a);

        assert!(table.release(0).is_some());
        assert!(table.release(0).is_none());
        assert!(table.release(7).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_install_resets_the_slot_buffer() {
        let mut table = ClientTable::new(1, 64);
        let (a, _pa) = tcp_pair();
        table.install(a);
        table
            .get_mut(0)
            .unwrap()
            .write_buf
            .append(b"leftover")
            .unwrap();
        table.release(0);

        let (b, _pb) = tcp_pair();
        table.install(b);
        assert!(table.get(0).unwrap().write_buf.is_empty());
    }
}
