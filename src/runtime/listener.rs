//! Listening socket with a cancellable accept.
//!
//! Setup is split so background detach can happen between bind and listen:
//! `BoundSocket::bind` resolves, creates and binds; `BoundSocket::listen`
//! starts listening and wires the socket into a mio poll together with the
//! shutdown waker.
//!
//! The listener itself is non-blocking. `accept` tries to accept, and on
//! `WouldBlock` parks in `poll` until either a connection arrives or the
//! shutdown waker fires. Accepted streams are switched back to blocking mode
//! before being handed to a session.

use crate::error::ServerError;
use crate::runtime::shutdown::ShutdownHandle;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use tracing::{debug, trace};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Resolve a `host:port` string to the first address it names.
pub fn resolve(listen: &str) -> Result<SocketAddr, ServerError> {
    let mut addrs = listen
        .to_socket_addrs()
        .map_err(|e| ServerError::AddressResolution {
            addr: listen.to_string(),
            reason: e.to_string(),
        })?;

    addrs.next().ok_or_else(|| ServerError::AddressResolution {
        addr: listen.to_string(),
        reason: "no addresses found".to_string(),
    })
}

/// A bound but not yet listening socket.
pub struct BoundSocket {
    socket: Socket,
}

impl BoundSocket {
    /// Resolve `listen`, create a TCP socket with address reuse, and bind.
    pub fn bind(listen: &str) -> Result<Self, ServerError> {
        let addr = resolve(listen)?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(ServerError::SocketCreate)?;
        socket
            .set_reuse_address(true)
            .map_err(ServerError::SocketCreate)?;
        socket.bind(&addr.into()).map_err(ServerError::Bind)?;

        debug!(addr = %addr, "Socket bound");
        Ok(Self { socket })
    }

    /// Start listening and prepare the cancellable accept.
    pub fn listen(self, backlog: i32) -> Result<Listener, ServerError> {
        self.socket.listen(backlog).map_err(ServerError::Listen)?;
        self.socket
            .set_nonblocking(true)
            .map_err(ServerError::Listen)?;

        let socket: TcpListener = self.socket.into();
        let local_addr = socket.local_addr().map_err(ServerError::Listen)?;

        let poll = Poll::new().map_err(ServerError::Listen)?;
        poll.registry()
            .register(
                &mut SourceFd(&socket.as_raw_fd()),
                LISTENER_TOKEN,
                Interest::READABLE,
            )
            .map_err(ServerError::Listen)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::Listen)?;

        Ok(Listener {
            socket,
            local_addr,
            poll,
            events: Events::with_capacity(8),
            shutdown: ShutdownHandle::new(Arc::new(waker)),
        })
    }
}

/// Outcome of one accept attempt.
#[derive(Debug)]
pub enum Accepted {
    /// A client connected. The stream is in blocking mode.
    Connection(TcpStream, SocketAddr),
    /// Shutdown was requested; no further connections will be accepted.
    Shutdown,
}

/// Listening socket plus the poll used to wait on it.
pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    poll: Poll,
    events: Events,
    shutdown: ShutdownHandle,
}

impl Listener {
    /// Handle that cancels a blocked or future `accept`.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until a client connects or shutdown is requested.
    ///
    /// A pending shutdown takes priority over connections waiting in the
    /// backlog.
    pub fn accept(&mut self) -> Result<Accepted, ServerError> {
        loop {
            if self.shutdown.is_requested() {
                return Ok(Accepted::Shutdown);
            }

            match self.socket.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false).map_err(ServerError::Accept)?;
                    return Ok(Accepted::Connection(stream, peer));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ServerError::Accept(e)),
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ServerError::Accept(e)),
            }

            for event in self.events.iter() {
                match event.token() {
                    WAKER_TOKEN => trace!("accept woken for shutdown"),
                    LISTENER_TOKEN => trace!("listener readable"),
                    _ => {}
                }
            }
        }
    }
}
