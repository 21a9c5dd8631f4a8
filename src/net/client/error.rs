//! Error type for the racing client.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::base::name::NameError;
use crate::base::wire::ParseError;
use std::error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Error type for the racing client.
///
/// Errors fall into four groups. Invalid arguments are reported right
/// away when creating a client or starting a lookup. Transport errors
/// fail the one lookup they happened for. Parse errors only ever show up
/// in the logs because a malformed datagram is simply dropped. Finally,
/// there are errors that end a lookup because of the client’s lifecycle.
#[derive(Clone, Debug)]
pub enum Error {
    /// No resolver addresses were given.
    NoResolvers,

    /// The resolver addresses are of both IPv4 and IPv6.
    MixedAddressFamilies,

    /// The host name to look up is not a valid domain name.
    InvalidName(NameError),

    /// Binding a UDP socket gave an error.
    UdpBind(Arc<std::io::Error>),

    /// UDP configuration error.
    UdpConfigError(Arc<std::io::Error>),

    /// Sending over a UDP socket gave an error.
    UdpSend(Arc<std::io::Error>),

    /// Sending over a UDP socket gave a partial result.
    UdpShortSend,

    /// Receiving from a UDP socket gave an error.
    UdpReceive(Arc<std::io::Error>),

    /// A received datagram could not be parsed.
    MessageParseError(ParseError),

    /// The client was closed before a response arrived.
    ClientClosed,

    /// No response arrived within the configured response timeout.
    Timeout,

    /// All 65536 message IDs are taken by outstanding lookups.
    IdSpaceExhausted,

    /// The background driver could not be started.
    SchedulerStart(Arc<std::io::Error>),
}

impl From<NameError> for Error {
    fn from(err: NameError) -> Self {
        Error::InvalidName(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::MessageParseError(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::NoResolvers => write!(f, "no resolvers given"),
            Error::MixedAddressFamilies => {
                write!(f, "resolvers of mixed address families")
            }
            Error::InvalidName(err) => write!(f, "invalid host name: {}", err),
            Error::UdpBind(_) => write!(f, "error binding UDP socket"),
            Error::UdpConfigError(_) => {
                write!(f, "error configuring UDP socket")
            }
            Error::UdpSend(_) => write!(f, "error sending to UDP socket"),
            Error::UdpShortSend => write!(f, "partial sent to UDP socket"),
            Error::UdpReceive(_) => {
                write!(f, "error receiving from UDP socket")
            }
            Error::MessageParseError(err) => {
                write!(f, "malformed response: {}", err)
            }
            Error::ClientClosed => write!(f, "client closed"),
            Error::Timeout => write!(f, "timeout waiting for response"),
            Error::IdSpaceExhausted => {
                write!(f, "no free message ID for another lookup")
            }
            Error::SchedulerStart(_) => {
                write!(f, "error starting the background driver")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::NoResolvers => None,
            Error::MixedAddressFamilies => None,
            Error::InvalidName(e) => Some(e),
            Error::UdpBind(e) => Some(e),
            Error::UdpConfigError(e) => Some(e),
            Error::UdpSend(e) => Some(e),
            Error::UdpShortSend => None,
            Error::UdpReceive(e) => Some(e),
            Error::MessageParseError(e) => Some(e),
            Error::ClientClosed => None,
            Error::Timeout => None,
            Error::IdSpaceExhausted => None,
            Error::SchedulerStart(e) => Some(e),
        }
    }
}
