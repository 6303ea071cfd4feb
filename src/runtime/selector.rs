//! Readiness multiplexing over `select(2)`.
//!
//! The event loop keeps two persistent interest sets (read and write) and
//! hands the kernel working copies on every wait; `select` overwrites the
//! copies in place with the subset that is actually ready. Readiness is
//! level triggered: a descriptor stays reported for as long as its
//! condition holds, so a handler that does one syscall's worth of work
//! per report never loses progress.
//!
//! All `FD_*` accesses are unsafe at the libc boundary and undefined for
//! descriptors outside `0..FD_SETSIZE`; `FdSet` refuses those.

use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::ptr;

/// Capacity of a descriptor set. Descriptors must be in `0..FD_SETSIZE`
/// to be registered with the selector.
pub const FD_SETSIZE: usize = libc::FD_SETSIZE as usize;

/// A descriptor bitmap for `select(2)`.
///
/// Plain `Copy` data: master sets persist across iterations while the
/// per-wait working sets are bit-level duplicates of them.
#[derive(Clone, Copy)]
pub struct FdSet {
    raw: libc::fd_set,
}

impl FdSet {
    /// An empty set.
    pub fn new() -> Self {
        let mut raw = MaybeUninit::<libc::fd_set>::uninit();
        // FD_ZERO writes the whole structure, making assume_init sound.
        unsafe {
            libc::FD_ZERO(raw.as_mut_ptr());
            Self {
                raw: raw.assume_init(),
            }
        }
    }

    fn in_range(fd: RawFd) -> bool {
        fd >= 0 && (fd as usize) < FD_SETSIZE
    }

    /// Add `fd` to the set.
    ///
    /// Panics if `fd` is outside `0..FD_SETSIZE`. Callers reject such
    /// descriptors before registering interest in them.
    pub fn insert(&mut self, fd: RawFd) {
        assert!(Self::in_range(fd), "fd {fd} out of select(2) range");
        unsafe { libc::FD_SET(fd, &mut self.raw) };
    }

    /// Remove `fd` from the set.
    pub fn remove(&mut self, fd: RawFd) {
        assert!(Self::in_range(fd), "fd {fd} out of select(2) range");
        unsafe { libc::FD_CLR(fd, &mut self.raw) };
    }

    /// `true` if `fd` is in the set. A descriptor outside the valid range
    /// is never in any set.
    pub fn contains(&self, fd: RawFd) -> bool {
        Self::in_range(fd) && unsafe { libc::FD_ISSET(fd, &self.raw) }
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until a descriptor in `read` or `write` becomes ready.
///
/// `nfds` must exceed the highest descriptor in either set. Both sets are
/// overwritten with their ready subsets. Returns the number of ready
/// descriptors; an `Interrupted` error means a signal cut the wait short
/// and it should simply be repeated.
pub fn select(nfds: RawFd, read: &mut FdSet, write: &mut FdSet) -> io::Result<usize> {
    let rc = unsafe {
        libc::select(
            nfds,
            &mut read.raw,
            &mut write.raw,
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}
