//! The racing UDP transport.
//!
//! A [`Transport`] owns a single UDP socket. Each query is sent to every
//! configured resolver and whichever answer arrives first wins. Nothing
//! here ever blocks: sending either works right away or fails, and
//! receiving returns `None` as soon as the socket has no more datagrams.
//!
//! The socket is bound when the transport is created but only handed to
//! the Tokio runtime on first use via [`Transport::register`]. This
//! happens on the driver, so transports can be created outside of any
//! runtime. Waiting for responses is done by the driver through
//! [`UdpSocket::readable`] on the registered socket.

use super::error::Error;
use crate::base::message::{compose_query, Response};
use crate::base::name::Dname;
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Arc;
use std::vec::Vec;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

//------------ Module Configuration ------------------------------------------

/// How many times do we try a new random port if we get ‘address in use.’
const RETRY_RANDOM_PORT: usize = 10;

/// The range of local ports to pick a random port from.
const PORT_RANGE: Range<u16> = 0x0FFF..0xFFFF;

//------------ Socket --------------------------------------------------------

/// The socket of a transport.
#[derive(Debug)]
enum Socket {
    /// Bound but not yet known to the runtime.
    Bound(std::net::UdpSocket),

    /// Registered with the runtime.
    Registered(Arc<UdpSocket>),
}

//------------ Transport -----------------------------------------------------

/// A UDP socket racing queries to a set of resolvers.
#[derive(Debug)]
pub struct Transport {
    /// The socket in non-blocking mode.
    sock: Socket,

    /// The addresses of the resolvers to send each query to.
    resolvers: Vec<SocketAddr>,

    /// The buffer for receiving datagrams.
    recv_buf: Vec<u8>,

    /// The size of a received datagram we are prepared to accept.
    recv_size: usize,
}

impl Transport {
    /// Creates a new transport for the given resolvers.
    ///
    /// The resolvers must all be of the same address family. The socket is
    /// bound to the unspecified address of that family and a random port.
    /// `recv_size` is the size of the receive buffer. Longer datagrams
    /// are cut short and will most likely fail to parse.
    pub fn new(
        resolvers: Vec<SocketAddr>,
        recv_size: usize,
    ) -> Result<Self, Error> {
        let v4 = match resolvers.first() {
            Some(addr) => addr.is_ipv4(),
            None => return Err(Error::NoResolvers),
        };
        if resolvers.iter().any(|addr| addr.is_ipv4() != v4) {
            return Err(Error::MixedAddressFamilies);
        }
        let sock =
            Self::udp_bind(v4).map_err(|e| Error::UdpBind(Arc::new(e)))?;
        sock.set_nonblocking(true)
            .map_err(|e| Error::UdpConfigError(Arc::new(e)))?;
        Ok(Transport {
            sock: Socket::Bound(sock),
            resolvers,
            recv_buf: Vec::with_capacity(recv_size),
            recv_size,
        })
    }

    /// Bind to a local UDP port.
    ///
    /// Picks a random port. If that is taken, tries another one a few
    /// times before leaving the choice to the operating system.
    fn udp_bind(v4: bool) -> Result<std::net::UdpSocket, io::Error> {
        let mut rng = rand::thread_rng();
        let mut i = 0;
        loop {
            let port = if i == RETRY_RANDOM_PORT {
                0
            } else {
                rng.gen_range(PORT_RANGE)
            };
            let local: SocketAddr = if v4 {
                ([0u8; 4], port).into()
            } else {
                ([0u16; 8], port).into()
            };
            match std::net::UdpSocket::bind(local) {
                Ok(sock) => return Ok(sock),
                Err(err) => {
                    if i == RETRY_RANDOM_PORT
                        || err.kind() != io::ErrorKind::AddrInUse
                    {
                        return Err(err);
                    } else {
                        i += 1
                    }
                }
            }
        }
    }

    /// Hands the socket to the Tokio runtime if that hasn’t happened yet.
    ///
    /// Returns the registered socket.
    ///
    /// This needs to be called from within the context of a Tokio runtime
    /// with I/O enabled. It fails if there is no such runtime.
    pub fn register(&mut self) -> Result<Arc<UdpSocket>, Error> {
        let sock = match self.sock {
            Socket::Registered(ref sock) => return Ok(sock.clone()),
            Socket::Bound(ref sock) => sock
                .try_clone()
                .and_then(UdpSocket::from_std)
                .map_err(|e| Error::UdpConfigError(Arc::new(e)))?,
        };
        let sock = Arc::new(sock);
        self.sock = Socket::Registered(sock.clone());
        Ok(sock)
    }

    /// Returns the registered socket.
    ///
    /// Returns `None` if [`register`][Self::register] hasn’t succeeded yet.
    pub fn socket(&self) -> Option<&Arc<UdpSocket>> {
        match self.sock {
            Socket::Registered(ref sock) => Some(sock),
            Socket::Bound(_) => None,
        }
    }

    /// Returns the local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        match self.sock {
            Socket::Bound(ref sock) => sock.local_addr(),
            Socket::Registered(ref sock) => sock.local_addr(),
        }
    }

    /// Returns the resolvers queries are sent to.
    pub fn resolvers(&self) -> &[SocketAddr] {
        &self.resolvers
    }

    /// Sends an A query for `qname` with the given ID to all resolvers.
    ///
    /// The query is composed once and the same datagram goes to each
    /// resolver in turn. Returns the number of resolvers the query was
    /// sent to. If it couldn’t be sent to any of them, the error of the
    /// last attempt is returned.
    ///
    /// Registers the socket if necessary.
    pub fn send(&mut self, id: u16, qname: &Dname) -> Result<usize, Error> {
        let sock = self.register()?;
        let dgram = compose_query(id, qname);
        let mut sent = 0;
        let mut last_err = None;
        for addr in &self.resolvers {
            match sock.try_send_to(&dgram, *addr) {
                Ok(len) if len == dgram.len() => sent += 1,
                Ok(_) => {
                    debug!("partial send of query {} to {}", id, addr);
                    last_err = Some(Error::UdpShortSend);
                }
                Err(err) => {
                    debug!("sending query {} to {} failed: {}", id, addr, err);
                    last_err = Some(Error::UdpSend(Arc::new(err)));
                }
            }
        }
        match last_err {
            Some(err) if sent == 0 => Err(err),
            _ => Ok(sent),
        }
    }

    /// Tries to receive and parse one response.
    ///
    /// Returns `None` if there is nothing to receive right now or if the
    /// socket hasn’t been registered yet. Datagrams from addresses other
    /// than the resolvers are dropped silently. A datagram that can’t be
    /// parsed results in an [`Error::MessageParseError`], a failing socket
    /// in an [`Error::UdpReceive`]. Either way, the next call carries on
    /// with the next datagram.
    pub fn receive_one(&mut self) -> Option<Result<Response, Error>> {
        let sock = match self.sock {
            Socket::Registered(ref sock) => sock,
            Socket::Bound(_) => return None,
        };
        loop {
            self.recv_buf.clear();
            self.recv_buf.reserve(self.recv_size);
            let (len, from) = match sock.try_recv_buf_from(&mut self.recv_buf)
            {
                Ok(res) => res,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return None
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {
                    continue
                }
                Err(err) => {
                    return Some(Err(Error::UdpReceive(Arc::new(err))))
                }
            };
            if !self.resolvers.contains(&from) {
                trace!("dropping datagram from unknown source {}", from);
                continue;
            }
            return Some(
                Response::parse(&self.recv_buf[..len]).map_err(Into::into),
            );
        }
    }
}

//============ Testing =======================================================
