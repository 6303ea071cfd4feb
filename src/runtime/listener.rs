//! Listening socket setup.
//!
//! Built through `socket2` so the setup sequence is explicit and ordered:
//! create the IPv4 stream socket, switch it to non-blocking, enable
//! address reuse, bind, listen. Each error carries the name of the step
//! that failed.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, SocketAddrV4, TcpListener};

/// Create the bound, listening, non-blocking listener socket.
pub fn bind_listener(addr: SocketAddrV4) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| step_error("create listener socket", e))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| step_error("set listener non-blocking", e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| step_error("enable SO_REUSEADDR", e))?;

    let addr = SocketAddr::V4(addr);
    socket
        .bind(&addr.into())
        .map_err(|e| step_error(&format!("bind {addr}"), e))?;
    socket
        .listen(libc::SOMAXCONN)
        .map_err(|e| step_error("listen", e))?;

    Ok(socket.into())
}

fn step_error(step: &str, e: io::Error) -> io::Error {
    io::Error::new(e.kind(), format!("{step}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_listener_is_nonblocking() {
        let listener = bind_listener(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);

        // No connection is pending, so a non-blocking accept cannot block.
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_bind_error_names_the_step() {
        let first = bind_listener(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = first.local_addr().unwrap().port();

        let err = bind_listener(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).unwrap_err();
        assert!(err.to_string().contains("bind"));
    }
}
