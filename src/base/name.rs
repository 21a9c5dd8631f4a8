//! Domain names.
//!
//! This module provides [`Dname`], an owned, uncompressed domain name in
//! wire format. Names are created either from their textual representation
//! via [`FromStr`] or parsed out of a DNS message, in which case name
//! compression as described in section 4.1.4 of [RFC 1035] is resolved.
//!
//! Only the subset of the textual format needed for host names is
//! supported: labels are separated by dots, there are no escape sequences,
//! and all characters have to be ASCII. A single trailing dot is accepted
//! and ignored, so `"example.com"` and `"example.com."` are the same name.
//!
//! [RFC 1035]: https://tools.ietf.org/html/rfc1035

use super::wire::{FormError, ParseError};
use bytes::BufMut;
use core::fmt;
use core::str::FromStr;
use octseq::parse::Parser;

//------------ Module Configuration ------------------------------------------

/// The maximum length of a label in octets.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of a domain name in wire format in octets.
pub const MAX_NAME_LEN: usize = 255;

//------------ Dname ---------------------------------------------------------

/// An uncompressed domain name.
///
/// The name is kept in wire format, i.e., as a sequence of labels each
/// preceded by its length and terminated by the empty root label. The
/// wire format is guaranteed to be valid: no label is longer than 63
/// octets and the whole name is at most 255 octets long.
///
/// Comparison of names is ASCII case-insensitive.
#[derive(Clone)]
pub struct Dname {
    /// The name in wire format.
    octets: Vec<u8>,
}

impl Dname {
    /// Returns the root name.
    pub fn root() -> Self {
        Dname { octets: vec![0] }
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.octets.len() == 1
    }

    /// Returns the wire format of the name.
    pub fn as_slice(&self) -> &[u8] {
        &self.octets
    }

    /// Returns the length of the name in wire format.
    pub fn compose_len(&self) -> usize {
        self.octets.len()
    }

    /// Returns an iterator over the labels of the name.
    ///
    /// The final empty root label is not included.
    pub fn iter_labels(&self) -> LabelIter {
        LabelIter {
            octets: &self.octets,
        }
    }

    /// Appends the wire format of the name to `target`.
    ///
    /// The name is always appended uncompressed.
    pub fn compose<B: BufMut>(&self, target: &mut B) {
        target.put_slice(&self.octets)
    }
}

/// # Parsing
///
impl Dname {
    /// Parses a possibly compressed name from a message.
    ///
    /// The parser must have been created for the complete `message` so
    /// that compression pointers can be followed. Afterwards, it is
    /// positioned right after the name as it appeared in the message, i.e.,
    /// after the first compression pointer if there was one.
    ///
    /// Every compression pointer has to point to a position before the
    /// start of the label sequence it is part of. This makes loops
    /// impossible.
    pub fn parse(
        message: &[u8],
        parser: &mut Parser<'_, [u8]>,
    ) -> Result<Self, ParseError> {
        let mut builder = Builder::default();
        let mut start = parser.pos();
        let mut ptr = match read_labels(parser, &mut builder)? {
            Some(ptr) => ptr,
            None => return Ok(builder.finish()),
        };
        loop {
            if ptr >= start {
                return Err(ParseError::form_error(
                    "compression pointer not pointing backwards",
                ));
            }
            let mut target = Parser::from_ref(message);
            target.advance(ptr)?;
            start = ptr;
            ptr = match read_labels(&mut target, &mut builder)? {
                Some(ptr) => ptr,
                None => return Ok(builder.finish()),
            };
        }
    }

    /// Skips over a possibly compressed name.
    ///
    /// Compression pointers are not followed: the name ends at the first
    /// pointer or at the root label, whichever comes first.
    pub fn skip(parser: &mut Parser<'_, [u8]>) -> Result<(), ParseError> {
        loop {
            let len = parser.parse_u8()?;
            match LabelType::from_octet(len)? {
                LabelType::Normal(0) => return Ok(()),
                LabelType::Normal(len) => parser.advance(len)?,
                LabelType::Pointer => {
                    parser.advance(1)?;
                    return Ok(());
                }
            }
        }
    }
}

/// Reads labels into `builder` until the root label or a pointer.
///
/// Returns the absolute message position the pointer points to if the
/// labels ended in one.
fn read_labels(
    parser: &mut Parser<'_, [u8]>,
    builder: &mut Builder,
) -> Result<Option<usize>, ParseError> {
    loop {
        let len = parser.parse_u8()?;
        match LabelType::from_octet(len)? {
            LabelType::Normal(0) => return Ok(None),
            LabelType::Normal(len) => {
                builder.push(parser.peek(len)?).map_err(|_| {
                    ParseError::form_error("long domain name")
                })?;
                parser.advance(len)?;
            }
            LabelType::Pointer => {
                let low = parser.parse_u8()?;
                return Ok(Some(
                    usize::from(len & 0x3F) << 8 | usize::from(low),
                ));
            }
        }
    }
}

//--- FromStr

impl FromStr for Dname {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        let mut builder = Builder::default();
        for label in s.split('.') {
            if label.is_empty() {
                return Err(NameError::EmptyLabel);
            }
            if !label.is_ascii() {
                return Err(NameError::NonAscii);
            }
            builder.push(label.as_bytes())?;
        }
        Ok(builder.finish())
    }
}

//--- PartialEq and Eq

impl PartialEq for Dname {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Dname {}

//--- Display and Debug

impl fmt::Display for Dname {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for (idx, label) in self.iter_labels().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            for &ch in label {
                if ch.is_ascii_graphic() && ch != b'.' && ch != b'\\' {
                    write!(f, "{}", ch as char)?;
                } else {
                    write!(f, "\\{:03}", ch)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Dname {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dname({})", self)
    }
}

//------------ LabelIter -----------------------------------------------------

/// An iterator over the labels of a [`Dname`].
pub struct LabelIter<'a> {
    /// The remaining wire format, starting at a length octet.
    octets: &'a [u8],
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.octets.split_first()?;
        if len == 0 {
            return None;
        }
        let (label, rest) = rest.split_at(usize::from(len));
        self.octets = rest;
        Some(label)
    }
}

//------------ LabelType -----------------------------------------------------

/// The type of a label as given by the top two bits of its first octet.
enum LabelType {
    /// A normal label of the given length.
    Normal(usize),

    /// A compression pointer.
    Pointer,
}

impl LabelType {
    fn from_octet(octet: u8) -> Result<Self, FormError> {
        match octet & 0xC0 {
            0x00 => Ok(LabelType::Normal(usize::from(octet))),
            0xC0 => Ok(LabelType::Pointer),
            _ => Err(FormError::new("unknown label type")),
        }
    }
}

//------------ Builder -------------------------------------------------------

/// Assembles a name label by label.
#[derive(Default)]
struct Builder {
    octets: Vec<u8>,
}

impl Builder {
    /// Appends a label.
    fn push(&mut self, label: &[u8]) -> Result<(), NameError> {
        if label.len() > MAX_LABEL_LEN {
            return Err(NameError::LongLabel);
        }
        // Leave room for the length octet and the final root label.
        if self.octets.len() + label.len() + 2 > MAX_NAME_LEN {
            return Err(NameError::LongName);
        }
        self.octets.push(label.len() as u8);
        self.octets.extend_from_slice(label);
        Ok(())
    }

    fn finish(mut self) -> Dname {
        self.octets.push(0);
        Dname {
            octets: self.octets,
        }
    }
}

//============ Error Types ===================================================

//------------ NameError -----------------------------------------------------

/// A host name could not be turned into a domain name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameError {
    /// The name was empty.
    Empty,

    /// The name contained an empty label, e.g., `"a..b"`.
    EmptyLabel,

    /// A label was longer than 63 octets.
    LongLabel,

    /// The name was longer than 255 octets in wire format.
    LongName,

    /// The name contained a character that isn't ASCII.
    NonAscii,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            NameError::Empty => "empty domain name",
            NameError::EmptyLabel => "empty label in domain name",
            NameError::LongLabel => "label exceeds 63 octets",
            NameError::LongName => "domain name exceeds 255 octets",
            NameError::NonAscii => "non-ASCII character in domain name",
        })
    }
}

impl std::error::Error for NameError {}

//============ Testing =======================================================
