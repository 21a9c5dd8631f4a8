//! An asynchronous DNS client racing queries over UDP.
//!
//! This crate looks up the IPv4 addresses of host names by sending the
//! very same query to a number of recursive resolvers at once and taking
//! whichever usable answer arrives first. Starting a lookup never blocks
//! the calling thread. Instead, the socket work for any number of clients
//! and lookups is performed by a single background driver.
//!
//! # Modules
//!
//! * [base] contains the types for the small subset of DNS data needed
//!   here: message headers, domain names, and encoding A queries and
//!   decoding their responses,
//! * [net] contains the racing client, its UDP transport, and the driver
//!   serving all clients, and
//! * [utils] contains helpers for configuration values.
//!
//! # Example
//!
//! ```no_run
//! use racedns::net::client::racing::Client;
//! use std::net::Ipv4Addr;
//!
//! let client = Client::new([Ipv4Addr::new(9, 9, 9, 9)]).unwrap();
//! let lookup = client.resolve("example.com").unwrap();
//! println!("{:?}", lookup.wait());
//! ```

#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod base;
pub mod net;
pub mod utils;
