//! Socket collaborator: the only place the gateway touches the network.
//!
//! The gateway is generic over [`Transport`], so a board-specific network
//! stack can stand in for [`TcpTransport`], which is built on `socket2`.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::{
    io::{self, Read},
    net::{Shutdown, SocketAddr, ToSocketAddrs},
};

/// Factory for listening sockets.
pub trait Transport {
    type Listener: Listener;

    /// Binds `host:port` and starts listening.
    fn listen(
        &self,
        host: &str,
        port: u16,
        backlog: i32,
        nonblocking: bool,
    ) -> io::Result<Self::Listener>;
}

/// A bound, listening socket.
pub trait Listener {
    type Conn: Connection;

    /// Waits for the next client. In non-blocking mode, fails with
    /// [`io::ErrorKind::WouldBlock`] when nobody is waiting.
    fn accept(&mut self) -> io::Result<(Self::Conn, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// One accepted client connection.
pub trait Connection {
    /// Reads once into `buf`, returning the number of bytes received.
    fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Sends a prefix of `buf`, returning how many bytes were accepted.
    ///
    /// May fail with [`io::ErrorKind::WouldBlock`] (retry later) or
    /// [`io::ErrorKind::ConnectionReset`] (peer is gone).
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()>;
}

/// TCP over the host's socket API.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Listener = TcpListener;

    fn listen(
        &self,
        host: &str,
        port: u16,
        backlog: i32,
        nonblocking: bool,
    ) -> io::Result<TcpListener> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no address")
        })?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(backlog)?;
        socket.set_nonblocking(nonblocking)?;

        Ok(TcpListener { socket })
    }
}

#[derive(Debug)]
pub struct TcpListener {
    socket: Socket,
}

impl Listener for TcpListener {
    type Conn = TcpConnection;

    fn accept(&mut self) -> io::Result<(TcpConnection, SocketAddr)> {
        let (socket, addr) = self.socket.accept()?;
        // Accepted sockets may inherit non-blocking mode; requests are read blocking.
        socket.set_nonblocking(false)?;

        let remote = addr.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "peer is not an IP socket")
        })?;

        Ok((TcpConnection { socket }, remote))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "listener is not an IP socket")
        })
    }
}

/// Closed on [`Connection::close`] and again, if needed, on drop.
#[derive(Debug)]
pub struct TcpConnection {
    socket: Socket,
}

impl Connection for TcpConnection {
    #[inline]
    fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }

    #[inline]
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.socket.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }
}
