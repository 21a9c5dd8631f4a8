//! Basics.
//!
//! This module provides the types for working with the small subset of DNS
//! data the racing client needs: the message header, domain names, and
//! queries and responses for IPv4 address records.
//!
//!
//! ## Parsing and Composing Messages
//!
//! We use the term *parsing* for extracting data from a wire-format
//! representation and *composing* for producing such a representation.
//!
//! Both parsing and composing happen on buffers holding a complete DNS
//! message. This is necessary because domain names in a message may be
//! compressed by referencing other parts of the message. Parsing is done
//! with the [`Parser`][octseq::parse::Parser] type from the
//! [octseq](https://github.com/NLnetLabs/octseq) crate, composing appends
//! to anything that implements [`BufMut`][bytes::BufMut].
//!
//!
//! # Types for DNS Data
//!
//! These are arranged in submodules:
//!
//! * [header] for the header of DNS messages,
//! * [name] for domain names,
//! * [message] for A queries and their responses, and
//! * [wire] for the errors that can happen while parsing.

pub use self::header::{Header, HeaderCounts};
pub use self::message::{compose_query, Query, Response};
pub use self::name::{Dname, NameError};
pub use self::wire::{FormError, ParseError};

pub mod header;
pub mod message;
pub mod name;
pub mod wire;
