//! Sending and receiving DNS messages.
//!
//! Currently, the module only provides the [`client`] sub-module for
//! racing queries to resolvers.

pub mod client;
