//! A client racing A queries to a set of resolvers.
//!
//! A [`Client`] sends every query to all of its resolvers at once and
//! takes whichever usable response arrives first. Starting a lookup via
//! [`Client::resolve`] never blocks and never waits for the network. It
//! returns a [`Lookup`] which is a future resolving into the result.
//!
//! All clients using the same [`Scheduler`] are served by one driver task
//! that does the actual socket work. A client created via [`Client::new`]
//! uses the [global scheduler][Scheduler::global]:
//!
//! ```no_run
//! # use racedns::net::client::racing::Client;
//! # use std::net::Ipv4Addr;
//! # async fn _test() {
//! let client = Client::new([
//!     Ipv4Addr::new(9, 9, 9, 9),
//!     Ipv4Addr::new(1, 1, 1, 1),
//! ]).unwrap();
//! match client.resolve("example.com").unwrap().await {
//!     Ok(Some(addr)) => println!("example.com has address {}", addr),
//!     Ok(None) => println!("example.com has no address"),
//!     Err(err) => println!("lookup failed: {}", err),
//! }
//! # }
//! ```
//!
//! A lookup ends in one of three ways. It resolves to an address if a
//! resolver answered with one. It resolves to `None` if a resolver
//! answered but the first answer record is not an IPv4 address. Or it
//! fails with an [`Error`] if the query couldn’t be sent, no response
//! arrived within the [response timeout][Config::set_response_timeout],
//! or the client was closed in the meantime.
//!
//! Responses that can’t be parsed are dropped and the lookup keeps
//! waiting for a better one. UDP gives no guarantees, so without a
//! response timeout a lookup whose queries or responses were all lost
//! never ends.

use super::error::Error;
use super::pending::{Match, Pending, Request};
use super::scheduler::Scheduler;
use super::udp::Transport;
use crate::base::name::Dname;
use crate::utils::config::DefMinMax;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use std::vec::Vec;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

//------------ Configuration Constants ----------------------------------------

/// The smallest response timeout.
///
/// There is no default timeout, so unlike the other values this only
/// comes with limits.
const MIN_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1);

/// The largest response timeout.
const MAX_RESPONSE_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration limits for the size of the receive buffer.
const RECV_SIZE: DefMinMax<usize> = DefMinMax::new(0xFFFF, 512, 0xFFFF);

/// The number of receive errors after which a pass gives up on a socket.
const MAX_RECV_ERRORS: usize = 16;

/// The port resolvers listen on.
pub const DEFAULT_PORT: u16 = 53;

//------------ LookupResult ---------------------------------------------------

/// The result of a lookup.
///
/// The lookup either resolved to an address, to no address, or failed.
pub type LookupResult = Result<Option<Ipv4Addr>, Error>;

//------------ Config ---------------------------------------------------------

/// Configuration for a racing client.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long to wait for a response.
    ///
    /// If this is `None`, wait forever.
    response_timeout: Option<Duration>,

    /// Size of the receive buffer.
    recv_size: usize,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the response timeout.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }

    /// Sets the response timeout.
    ///
    /// Once the query of a lookup has been sent, the lookup fails with
    /// [`Error::Timeout`] if no usable response arrives within this time.
    /// By default, there is no timeout. Passing `Some(_)` with a value
    /// that is too small or too large caps it to between one millisecond
    /// and ten minutes.
    pub fn set_response_timeout(&mut self, value: Option<Duration>) {
        self.response_timeout =
            value.map(|value| {
                value.clamp(MIN_RESPONSE_TIMEOUT, MAX_RESPONSE_TIMEOUT)
            })
    }

    /// Returns the size of the receive buffer.
    pub fn recv_size(&self) -> usize {
        self.recv_size
    }

    /// Sets the size of the receive buffer.
    ///
    /// Responses longer than this are cut short and will be dropped as
    /// malformed. The value will be capped to between 512 and 65535.
    pub fn set_recv_size(&mut self, value: usize) {
        self.recv_size = RECV_SIZE.limit(value)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            response_timeout: None,
            recv_size: RECV_SIZE.default(),
        }
    }
}

//------------ Stats ----------------------------------------------------------

/// Counters for what happened on a client.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    queries_sent: u64,
    send_failures: u64,
    responses_received: u64,
    answered: u64,
    unmatched: u64,
    malformed: u64,
}

impl Stats {
    /// Returns the number of queries sent to at least one resolver.
    pub fn queries_sent(&self) -> u64 {
        self.queries_sent
    }

    /// Returns the number of queries that couldn’t be sent at all.
    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    /// Returns the number of responses that could be parsed.
    pub fn responses_received(&self) -> u64 {
        self.responses_received
    }

    /// Returns the number of responses that ended a lookup.
    pub fn answered(&self) -> u64 {
        self.answered
    }

    /// Returns the number of responses no lookup was waiting for.
    ///
    /// When racing, this includes all the responses that lost.
    pub fn unmatched(&self) -> u64 {
        self.unmatched
    }

    /// Returns the number of datagrams dropped because they were garbage.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

//------------ Client ---------------------------------------------------------

/// A client racing queries to a set of resolvers.
///
/// Dropping the client closes it.
pub struct Client {
    inner: Arc<InnerClient>,
}

impl Client {
    /// Creates a new client for the given resolvers.
    ///
    /// The resolvers are contacted on port 53. The client uses the default
    /// configuration and the global scheduler, starting the latter if
    /// necessary.
    pub fn new<I>(resolvers: I) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: Into<Ipv4Addr>,
    {
        let resolvers: Vec<SocketAddr> = resolvers
            .into_iter()
            .map(|addr| {
                let addr: Ipv4Addr = addr.into();
                SocketAddr::new(addr.into(), DEFAULT_PORT)
            })
            .collect();
        if resolvers.is_empty() {
            return Err(Error::NoResolvers);
        }
        Self::with_config(&Scheduler::global()?, resolvers, Default::default())
    }

    /// Creates a new client with the given scheduler and configuration.
    ///
    /// The resolver addresses must be non-empty and must all be of the
    /// same address family. The client starts out registered with the
    /// scheduler.
    pub fn with_config(
        scheduler: &Scheduler,
        resolvers: impl IntoIterator<Item = SocketAddr>,
        config: Config,
    ) -> Result<Self, Error> {
        let transport =
            Transport::new(resolvers.into_iter().collect(), config.recv_size)?;
        debug!(
            "new client on {:?} for {:?}",
            transport.local_addr().ok(),
            transport.resolvers()
        );
        let inner = Arc::new(InnerClient {
            transport: Mutex::new(Some(transport)),
            pending: Mutex::new(Pending::new()),
            config,
            scheduler: scheduler.clone(),
            closed: AtomicBool::new(false),
            stats: Mutex::new(Stats::default()),
        });
        scheduler.register(Arc::downgrade(&inner));
        Ok(Client { inner })
    }

    /// Starts a lookup of the IPv4 address of `host`.
    ///
    /// This returns right away. The query is sent by the driver during its
    /// next pass. A single trailing dot is allowed and `host` must
    /// otherwise be a valid domain name made of ASCII characters.
    ///
    /// Fails with [`Error::ClientClosed`] after the client has been closed.
    pub fn resolve(&self, host: &str) -> Result<Lookup, Error> {
        let qname = Dname::from_str(host)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock();
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(Error::ClientClosed);
            }
            let id = pending.insert(Request::new(qname, tx))?;
            trace!("lookup {} for {}", id, host);
        }
        self.inner.scheduler.wake();
        Ok(Lookup { rx })
    }

    /// Closes the client.
    ///
    /// The client is removed from the scheduler and its socket is closed.
    /// Once this returns, the driver won’t touch the client anymore. All
    /// lookups still outstanding fail with [`Error::ClientClosed`] as will
    /// any later call to [`resolve`][Self::resolve].
    ///
    /// Closing a closed client does nothing.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner
            .scheduler
            .unregister(&Arc::downgrade(&self.inner));
        // Lets the driver drop the socket if it is waiting on it.
        self.inner.scheduler.wake();
        let transport = self.inner.transport.lock().take();
        let mut pending = self.inner.pending.lock();
        debug!(
            "closing client on {:?} with {} outstanding lookups",
            transport.as_ref().and_then(|t| t.local_addr().ok()),
            pending.len()
        );
        pending.close();
    }

    /// Returns whether the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Returns the local address of the client’s socket.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        match self.inner.transport.lock().as_ref() {
            Some(transport) => transport
                .local_addr()
                .map_err(|e| Error::UdpConfigError(Arc::new(e))),
            None => Err(Error::ClientClosed),
        }
    }

    /// Returns the number of outstanding lookups.
    pub fn outstanding(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the current counters.
    pub fn stats(&self) -> Stats {
        *self.inner.stats.lock()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.inner.closed)
            .field("stats", &self.inner.stats)
            .finish()
    }
}

//------------ InnerClient ----------------------------------------------------

/// The part of a client shared with the driver.
///
/// The driver calls the methods below during each pass. Whenever both
/// locks are needed, `transport` is locked before `pending`.
#[derive(Debug)]
pub(super) struct InnerClient {
    /// The transport. `None` once the client has been closed.
    transport: Mutex<Option<Transport>>,

    /// The outstanding lookups.
    pending: Mutex<Pending>,

    config: Config,

    /// The scheduler the client is registered with.
    scheduler: Scheduler,

    closed: AtomicBool,

    stats: Mutex<Stats>,
}

impl InnerClient {
    /// Sends the queries of all lookups waiting to be sent.
    ///
    /// The lookups are moved to waiting for a response before anything is
    /// sent. A lookup whose query can’t be sent to any resolver fails.
    pub(super) fn flush_sends(&self) {
        let mut transport = self.transport.lock();
        let transport = match transport.as_mut() {
            Some(transport) => transport,
            None => return,
        };
        let mut pending = self.pending.lock();
        if !pending.has_unsent() {
            return;
        }
        let deadline = self
            .config
            .response_timeout
            .map(|timeout| Instant::now() + timeout);
        for (id, qname) in pending.start_sending(deadline) {
            match transport.send(id, &qname) {
                Ok(_) => {
                    trace!("sent query {} for {}", id, qname);
                    self.stats.lock().queries_sent += 1;
                }
                Err(err) => {
                    warn!(
                        "sending query {} for {} failed: {}",
                        id, qname, err
                    );
                    self.stats.lock().send_failures += 1;
                    pending.fail(id, err);
                }
            }
        }
    }

    /// Processes all responses that have arrived.
    ///
    /// Socket errors other than the ones caused by ICMP messages are
    /// logged and skipped. After [`MAX_RECV_ERRORS`] of them, the rest is
    /// left for the next pass.
    pub(super) fn drain_receives(&self) {
        let mut transport = self.transport.lock();
        let transport = match transport.as_mut() {
            Some(transport) => transport,
            None => return,
        };
        let mut errors = 0;
        while let Some(res) = transport.receive_one() {
            let response = match res {
                Ok(response) => response,
                Err(Error::MessageParseError(err)) => {
                    debug!("dropping malformed response: {}", err);
                    self.stats.lock().malformed += 1;
                    continue;
                }
                Err(err) => {
                    if let Error::UdpReceive(ref io_err) = err {
                        if io_err.kind() == io::ErrorKind::ConnectionRefused {
                            // ICMP port unreachable from some resolver.
                            trace!("receive: {}", err);
                            continue;
                        }
                    }
                    warn!("receive failed: {}", err);
                    errors += 1;
                    if errors >= MAX_RECV_ERRORS {
                        break;
                    }
                    continue;
                }
            };
            let res = self.pending.lock().complete(&response);
            let mut stats = self.stats.lock();
            stats.responses_received += 1;
            match res {
                Match::Answered => {
                    trace!("response {} answered", response.id());
                    stats.answered += 1;
                }
                Match::Unknown => {
                    trace!("dropping response {}", response.id());
                    stats.unmatched += 1;
                }
                Match::WrongQuestion => {
                    debug!(
                        "dropping response {} for wrong question",
                        response.id()
                    );
                    stats.unmatched += 1;
                }
            }
        }
    }

    /// Fails lookups that have waited for too long.
    pub(super) fn expire(&self) {
        let expired = self.pending.lock().expire(Instant::now());
        if expired > 0 {
            debug!("{} lookups timed out", expired);
        }
    }

    /// Returns what the driver needs to wait for on behalf of the client.
    ///
    /// If any lookup is waiting for a response, returns the socket to wait
    /// on and the earliest response deadline. Returns `None` if there is
    /// nothing to wait for.
    pub(super) fn watch(&self) -> Option<(Arc<UdpSocket>, Option<Instant>)> {
        let transport = self.transport.lock();
        let sock = transport.as_ref()?.socket()?.clone();
        let pending = self.pending.lock();
        if !pending.awaiting_response() {
            return None;
        }
        Some((sock, pending.next_deadline()))
    }
}

//------------ Lookup ---------------------------------------------------------

/// An outstanding lookup.
///
/// This is a future resolving into the [`LookupResult`]. Dropping it
/// cancels the lookup. If the query has already been sent, any response
/// for it will be ignored.
#[derive(Debug)]
pub struct Lookup {
    rx: oneshot::Receiver<LookupResult>,
}

impl Lookup {
    /// Waits for the result, blocking the current thread.
    ///
    /// # Panics
    ///
    /// This function panics if called within an asynchronous execution
    /// context.
    pub fn wait(self) -> LookupResult {
        self.rx.blocking_recv().unwrap_or(Err(Error::ClientClosed))
    }
}

impl Future for Lookup {
    type Output = LookupResult;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ClientClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

//============ Testing =======================================================
