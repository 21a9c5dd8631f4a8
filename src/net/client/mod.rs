//! Racing A queries to recursive resolvers.
//!
//! This module provides a client that sends each query to all of a set of
//! resolvers over UDP and accepts the first usable response. It consists
//! of several parts:
//!
//! * [racing] contains the [`Client`][racing::Client] itself and the
//!   [`Lookup`][racing::Lookup] future returned for each lookup,
//! * [scheduler] contains the [`Scheduler`][scheduler::Scheduler] that
//!   clients register with and the [`Driver`][scheduler::Driver] task
//!   doing all the socket I/O,
//! * [udp] contains the non-blocking UDP transport,
//! * [pending] keeps track of outstanding lookups by message ID, and
//! * [error] contains the error type shared by all of them.
//!
//! # Using a client
//!
//! A client needs a scheduler whose driver runs as a task on a Tokio
//! runtime. The simplest way is to use the global scheduler whose driver
//! runs on a thread of its own. [`Client::new`][racing::Client::new] does
//! that and contacts the resolvers on port 53.
//!
//! If you’d rather run the driver on your own runtime, or need a different
//! port or configuration, create a scheduler and use
//! [`Client::with_config`][racing::Client::with_config]:
//!
//! ```no_run
//! # use racedns::net::client::racing::{Client, Config};
//! # use racedns::net::client::scheduler::Scheduler;
//! # use std::net::SocketAddr;
//! # use std::time::Duration;
//! # async fn _test() {
//! let (scheduler, driver) = Scheduler::new();
//! tokio::spawn(driver.run());
//!
//! let mut config = Config::new();
//! config.set_response_timeout(Some(Duration::from_secs(2)));
//! let client = Client::with_config(
//!     &scheduler,
//!     [
//!         SocketAddr::from(([192, 0, 2, 1], 53)),
//!         SocketAddr::from(([192, 0, 2, 2], 53)),
//!     ],
//!     config,
//! ).unwrap();
//!
//! let addr = client.resolve("example.com").unwrap().await;
//! println!("Got {:?}", addr);
//! # }
//! ```

pub mod error;
pub mod pending;
pub mod racing;
pub mod scheduler;
pub mod udp;
