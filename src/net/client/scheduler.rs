//! Driving all clients from a single task.
//!
//! Clients do not do any I/O themselves. Instead, they register with a
//! [`Scheduler`] and a single [`Driver`] task performs the socket work for
//! all of them. Each pass of the driver goes through all registered
//! clients, sends the queries of new lookups, receives every response
//! that has arrived, and expires lookups that have waited for too long.
//! All socket operations are non-blocking, so one slow resolver never holds
//! up anything else.
//!
//! After a pass, the driver waits. If no lookup is waiting for a response,
//! only starting a new lookup wakes it up again. Otherwise it also wakes
//! up when a socket becomes readable, when the earliest response timeout
//! passes, and after the [poll interval][Config::poll_interval] to clean
//! up lookups that have been dropped.
//!
//! A scheduler and its driver are created together via [`Scheduler::new`].
//! The driver’s [`run`][Driver::run] method needs to be spawned as a task
//! on a Tokio runtime with I/O and time enabled:
//!
//! ```no_run
//! # use racedns::net::client::scheduler::Scheduler;
//! # async fn _test() {
//! let (scheduler, driver) = Scheduler::new();
//! tokio::spawn(driver.run());
//! # drop(scheduler);
//! # }
//! ```
//!
//! The driver ends once the scheduler and all clients using it are gone.
//!
//! Alternatively, [`Scheduler::global`] returns a scheduler for the whole
//! process whose driver runs on a thread of its own.

use super::error::Error;
use super::racing::InnerClient;
use crate::utils::config::DefMinMax;
use futures_util::future::select_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use std::vec::Vec;
use tokio::net::UdpSocket;
use tokio::runtime;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until};
use tracing::{debug, trace, warn};

//------------ Configuration Constants ----------------------------------------

/// Configuration limits for the poll interval.
const POLL_INTERVAL: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_millis(50),
    Duration::from_millis(1),
    Duration::from_secs(10),
);

/// The name of the thread running the global driver.
const GLOBAL_THREAD_NAME: &str = "racedns-driver";

//------------ Config ---------------------------------------------------------

/// Configuration for a scheduler.
#[derive(Clone, Debug)]
pub struct Config {
    /// The maximum time between two passes while waiting for responses.
    poll_interval: Duration,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the poll interval.
    ///
    /// While lookups are waiting for a response, the driver runs a pass at
    /// least this often even if nothing arrives. This is how lookups that
    /// have been dropped are cleaned up.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sets the poll interval.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_poll_interval(&mut self, value: Duration) {
        self.poll_interval = POLL_INTERVAL.limit(value)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL.default(),
        }
    }
}

//------------ Scheduler ------------------------------------------------------

/// A handle to the registry of clients served by a driver.
///
/// Scheduler values can be cloned cheaply. The driver keeps running for as
/// long as any clone or any client registered with it exists.
#[derive(Clone, Debug)]
pub struct Scheduler {
    /// The registry shared with the driver.
    registry: Arc<Registry>,

    /// Wakes up the driver.
    ///
    /// Once all senders are gone, the driver knows it can end.
    wake_tx: mpsc::Sender<()>,
}

impl Scheduler {
    /// Creates a new scheduler with default configuration.
    pub fn new() -> (Self, Driver) {
        Self::with_config(Config::default())
    }

    /// Creates a new scheduler with the given configuration.
    pub fn with_config(config: Config) -> (Self, Driver) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let registry = Arc::new(Registry::default());
        (
            Scheduler {
                registry: registry.clone(),
                wake_tx,
            },
            Driver {
                registry,
                wake_rx,
                config,
            },
        )
    }

    /// Returns the scheduler for the whole process.
    ///
    /// The first call creates the scheduler and starts its driver on a
    /// dedicated thread with a single-threaded Tokio runtime. The driver
    /// runs until the process ends.
    ///
    /// Clients using this scheduler can be used from anywhere, including
    /// threads without a Tokio runtime.
    pub fn global() -> Result<Self, Error> {
        static GLOBAL: Mutex<Option<Scheduler>> =
            parking_lot::const_mutex(None);

        let mut global = GLOBAL.lock();
        if let Some(scheduler) = global.as_ref() {
            return Ok(scheduler.clone());
        }
        let (scheduler, driver) = Self::new();
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::SchedulerStart(Arc::new(e)))?;
        thread::Builder::new()
            .name(GLOBAL_THREAD_NAME.into())
            .spawn(move || runtime.block_on(driver.run()))
            .map_err(|e| {
                warn!("failed to start global driver: {}", e);
                Error::SchedulerStart(Arc::new(e))
            })?;
        *global = Some(scheduler.clone());
        Ok(scheduler)
    }

    /// Returns the number of registered clients.
    pub fn client_count(&self) -> usize {
        self.registry.clients.lock().len()
    }

    /// Returns the number of passes the driver has run so far.
    pub fn pass_count(&self) -> u64 {
        self.registry.passes.load(Ordering::Relaxed)
    }

    /// Adds a client and wakes up the driver.
    pub(super) fn register(&self, client: Weak<InnerClient>) {
        self.registry.clients.lock().push(client);
        self.wake();
    }

    /// Removes a client.
    ///
    /// Once this returns, the driver will not touch the client anymore: a
    /// pass in progress holds the lock for its whole duration.
    pub(super) fn unregister(&self, client: &Weak<InnerClient>) {
        self.registry
            .clients
            .lock()
            .retain(|item| !item.ptr_eq(client) && item.strong_count() > 0);
    }

    /// Asks the driver for a pass as soon as possible.
    pub(super) fn wake(&self) {
        // A full channel means a wake-up is already pending.
        let _ = self.wake_tx.try_send(());
    }
}

//------------ Registry -------------------------------------------------------

/// The set of clients served by a driver.
#[derive(Debug, Default)]
struct Registry {
    /// The clients.
    ///
    /// The driver holds the lock during a whole pass.
    clients: Mutex<Vec<Weak<InnerClient>>>,

    /// The number of passes so far.
    passes: AtomicU64,
}

//------------ Driver ---------------------------------------------------------

//------------ Watched --------------------------------------------------------

/// A socket waiting for responses and the earliest response deadline.
type Watched = (Arc<UdpSocket>, Option<Instant>);

/// The task performing all socket I/O for the clients of a scheduler.
#[derive(Debug)]
pub struct Driver {
    /// The registry shared with the schedulers.
    registry: Arc<Registry>,

    /// Receives wake-ups.
    wake_rx: mpsc::Receiver<()>,

    /// User configuration.
    config: Config,
}

impl Driver {
    /// Runs the driver.
    ///
    /// The returned future resolves once the scheduler and all clients
    /// registered with it have been dropped.
    pub async fn run(mut self) {
        debug!("driver started");
        let mut open = true;
        loop {
            if self.is_idle() {
                if !open {
                    break;
                }
                // Nothing to do until something registers.
                if self.wake_rx.recv().await.is_none() {
                    open = false;
                }
                continue;
            }
            let watched = self.pass();
            if watched.is_empty() {
                // Only a new lookup can give us something to do.
                if !open {
                    sleep(self.config.poll_interval).await;
                } else if self.wake_rx.recv().await.is_none() {
                    open = false;
                }
                continue;
            }
            let until = watched
                .iter()
                .filter_map(|(_, deadline)| *deadline)
                .fold(Instant::now() + self.config.poll_interval, Ord::min);
            let readable = select_all(
                watched.iter().map(|(sock, _)| Box::pin(sock.readable())),
            );
            tokio::select! {
                res = self.wake_rx.recv(), if open => {
                    if res.is_none() {
                        open = false;
                    }
                }
                _ = readable => { }
                _ = sleep_until(until.into()) => { }
            }
        }
        debug!("driver finished");
    }

    /// Returns whether there are no live clients.
    fn is_idle(&self) -> bool {
        let mut clients = self.registry.clients.lock();
        clients.retain(|client| client.strong_count() > 0);
        clients.is_empty()
    }

    /// Performs a single pass over all clients.
    ///
    /// Returns the sockets still waiting for responses.
    fn pass(&self) -> Vec<Watched> {
        let clients = self.registry.clients.lock();
        self.registry.passes.fetch_add(1, Ordering::Relaxed);
        trace!("pass over {} clients", clients.len());
        let mut watched = Vec::new();
        for client in clients.iter() {
            if let Some(client) = client.upgrade() {
                client.flush_sends();
                client.drain_receives();
                client.expire();
                watched.extend(client.watch());
            }
        }
        watched
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::client::racing::{self, Client};

    #[test]
    fn poll_interval() {
        let mut config = Config::new();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        config.set_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        config.set_poll_interval(Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn driver_ends_without_scheduler() {
        let (scheduler, driver) = Scheduler::new();
        let handle = tokio::spawn(driver.run());
        assert_eq!(scheduler.client_count(), 0);
        drop(scheduler);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn driver_waits_when_idle() {
        let resolver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let (scheduler, driver) = Scheduler::new();
        tokio::spawn(driver.run());
        let client = Client::with_config(
            &scheduler,
            Some(resolver.local_addr().unwrap()),
            racing::Config::new(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.pass_count() <= 2);

        // An unanswered lookup only adds a pass per poll interval.
        let _lookup = client.resolve("example.com").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let passes = scheduler.pass_count();
        assert!((3..=12).contains(&passes), "{} passes", passes);
    }

    #[test]
    fn global_is_shared() {
        let first = Scheduler::global().unwrap();
        let second = Scheduler::global().unwrap();
        assert!(Arc::ptr_eq(&first.registry, &second.registry));
    }
}
