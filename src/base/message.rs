//! Composing A queries and parsing their responses.
//!
//! This is the small subset of DNS messages the racing client needs. A
//! query always carries exactly one question for the A record of a host
//! name in class IN, with only the RD flag set:
//!
//! ```text
//! ID | 0x0100 | QDCOUNT=1 | ANCOUNT=0 | NSCOUNT=0 | ARCOUNT=0
//! QNAME | QTYPE=1 | QCLASS=1
//! ```
//!
//! A response is only ever looked at as far as the first answer record.
//! If anything about it doesn’t fit an IPv4 address answer to a single
//! question, the response is still a valid outcome but carries no address.
//! Only data that cannot be parsed at all, e.g. because it ends early,
//! results in an error.

use super::header::{Header, HeaderCounts};
use super::name::Dname;
use super::wire::ParseError;
use bytes::{BufMut, Bytes, BytesMut};
use octseq::parse::Parser;
use std::net::Ipv4Addr;

//------------ Constants -----------------------------------------------------

/// The record type of an IPv4 host address.
pub const RTYPE_A: u16 = 1;

/// The Internet class.
pub const CLASS_IN: u16 = 1;

/// The size of the header section in octets.
pub const HEADER_LEN: usize = 12;

//------------ compose_query -------------------------------------------------

/// Creates the wire format of an A query for `qname` with message ID `id`.
///
/// Since [`Dname`] can only hold valid names, this cannot fail. Turning
/// a host name into a `Dname` is where invalid names are rejected.
pub fn compose_query(id: u16, qname: &Dname) -> Bytes {
    let mut target = BytesMut::with_capacity(
        HEADER_LEN + qname.compose_len() + 4,
    );
    Header::query(id).compose(&mut target);
    let mut counts = HeaderCounts::new();
    counts.set_qdcount(1);
    counts.compose(&mut target);
    qname.compose(&mut target);
    target.put_u16(RTYPE_A);
    target.put_u16(CLASS_IN);
    target.freeze()
}

//------------ Query ---------------------------------------------------------

/// A parsed query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    header: Header,
    qname: Dname,
    qtype: u16,
    qclass: u16,
}

impl Query {
    /// Parses a query with a single question.
    ///
    /// This is the reverse of [`compose_query`] and mostly useful for
    /// the server side of things.
    pub fn parse(message: &[u8]) -> Result<Self, ParseError> {
        let mut parser = Parser::from_ref(message);
        let header = Header::parse(&mut parser)?;
        let counts = HeaderCounts::parse(&mut parser)?;
        if header.qr() {
            return Err(ParseError::form_error("message is a response"));
        }
        if counts.qdcount() != 1 {
            return Err(ParseError::form_error("expected a single question"));
        }
        let qname = Dname::parse(message, &mut parser)?;
        let qtype = parser.parse_u16_be()?;
        let qclass = parser.parse_u16_be()?;
        Ok(Query {
            header,
            qname,
            qtype,
            qclass,
        })
    }

    /// Returns the message header.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns the message ID.
    pub fn id(&self) -> u16 {
        self.header.id()
    }

    /// Returns the name asked for.
    pub fn qname(&self) -> &Dname {
        &self.qname
    }

    /// Returns the record type asked for.
    pub fn qtype(&self) -> u16 {
        self.qtype
    }

    /// Returns the class asked for.
    pub fn qclass(&self) -> u16 {
        self.qclass
    }
}

//------------ Response ------------------------------------------------------

/// The outcome of parsing a response.
///
/// A response always has the message ID so that it can be matched with
/// its query. If the response was a proper answer to a single question,
/// the question name is available, too. The address is only present if
/// the first answer record is an IPv4 address in class IN.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    id: u16,
    qname: Option<Dname>,
    addr: Option<Ipv4Addr>,
}

impl Response {
    /// Parses a response message.
    ///
    /// The steps are:
    ///
    /// 1. Parse the header. If the QR bit isn’t set or there isn’t exactly
    ///    one question, the message has no answer.
    /// 2. Without any answer records, the message has no answer. The
    ///    question name is kept if the question can be parsed.
    /// 3. Parse the question, keeping the name but ignoring type and class.
    /// 4. Skip the owner name of the first answer record, which is
    ///    normally a compression pointer to the question.
    /// 5. Check that the record is of type A and class IN and that its data
    ///    is four octets long. If so, that is the address. Otherwise the
    ///    message has no answer.
    ///
    /// Any attempt to read beyond the end of the message or a name that
    /// can’t be parsed leads to an error.
    pub fn parse(message: &[u8]) -> Result<Self, ParseError> {
        let mut parser = Parser::from_ref(message);
        let header = Header::parse(&mut parser)?;
        let counts = HeaderCounts::parse(&mut parser)?;
        if !header.qr() || counts.qdcount() != 1 {
            return Ok(Response::no_answer(header.id(), None));
        }

        if counts.ancount() == 0 {
            // The question is only needed for checking, so a broken one
            // still leaves a perfectly fine negative answer.
            let qname = Self::parse_question(message, &mut parser).ok();
            return Ok(Response::no_answer(header.id(), qname));
        }
        let qname = Self::parse_question(message, &mut parser)?;

        Dname::skip(&mut parser)?;
        let rtype = parser.parse_u16_be()?;
        let class = parser.parse_u16_be()?;
        if rtype != RTYPE_A || class != CLASS_IN {
            return Ok(Response::no_answer(header.id(), Some(qname)));
        }
        let _ttl = parser.parse_u32_be()?;
        let rdlen = parser.parse_u16_be()?;
        if rdlen != 4 {
            return Ok(Response::no_answer(header.id(), Some(qname)));
        }
        let mut addr = [0u8; 4];
        parser.parse_buf(&mut addr)?;
        Ok(Response {
            id: header.id(),
            qname: Some(qname),
            addr: Some(addr.into()),
        })
    }

    /// Parses the question section, returning the name.
    fn parse_question(
        message: &[u8],
        parser: &mut Parser<'_, [u8]>,
    ) -> Result<Dname, ParseError> {
        let qname = Dname::parse(message, parser)?;
        parser.advance(4)?; // QTYPE and QCLASS
        Ok(qname)
    }

    fn no_answer(id: u16, qname: Option<Dname>) -> Self {
        Response {
            id,
            qname,
            addr: None,
        }
    }

    /// Returns the message ID.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Returns the question name if the response had a single question.
    pub fn qname(&self) -> Option<&Dname> {
        self.qname.as_ref()
    }

    /// Returns the address from the first answer if there was one.
    pub fn addr(&self) -> Option<Ipv4Addr> {
        self.addr
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use core::str::FromStr;
    use rstest::rstest;

    /// The question section for example.com.
    const QUESTION: &[u8] = b"\x07example\x03com\x00\x00\x01\x00\x01";

    /// Assembles a response to the example.com question.
    fn response(
        flags: u16,
        qdcount: u16,
        ancount: u16,
        owner: &[u8],
        rtype: u16,
        class: u16,
        rdata: &[u8],
    ) -> Vec<u8> {
        let mut res = Vec::new();
        res.put_u16(0x1234);
        res.put_u16(flags);
        res.put_u16(qdcount);
        res.put_u16(ancount);
        res.put_u16(0);
        res.put_u16(0);
        res.put_slice(QUESTION);
        res.put_slice(owner);
        res.put_u16(rtype);
        res.put_u16(class);
        res.put_u32(3600);
        res.put_u16(rdata.len() as u16);
        res.put_slice(rdata);
        res
    }

    fn example_com() -> Dname {
        Dname::from_str("example.com").unwrap()
    }

    #[test]
    fn compose_example_query() {
        assert_eq!(
            &compose_query(0x1234, &example_com())[..],
            b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\
              \x07example\x03com\x00\x00\x01\x00\x01"
        );
    }

    #[rstest]
    #[case("example.com", 0)]
    #[case("a.b.c.d.e", 0xffff)]
    #[case("localhost", 0x8000)]
    #[case("WWW.Rust-Lang.ORG.", 4711)]
    fn query_round_trip(#[case] name: &str, #[case] id: u16) {
        let qname = Dname::from_str(name).unwrap();
        let query = Query::parse(&compose_query(id, &qname)).unwrap();
        assert_eq!(query.id(), id);
        assert_eq!(query.qname(), &qname);
        assert_eq!(query.qname().to_string(), name.trim_end_matches('.'));
        assert_eq!(query.qtype(), RTYPE_A);
        assert_eq!(query.qclass(), CLASS_IN);
        assert!(query.header().rd());
        assert!(!query.header().qr());
    }

    #[test]
    fn response_is_not_a_query() {
        let msg = response(0x8180, 1, 1, b"\xc0\x0c", 1, 1, &[1, 2, 3, 4]);
        assert!(matches!(Query::parse(&msg), Err(ParseError::Form(_))));
    }

    #[test]
    fn parse_answer() {
        let msg = response(0x8180, 1, 1, b"\xc0\x0c", 1, 1, &[93, 184, 216, 34]);
        let resp = Response::parse(&msg).unwrap();
        assert_eq!(resp.id(), 0x1234);
        assert_eq!(resp.qname(), Some(&example_com()));
        assert_eq!(resp.addr(), Some(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn compressed_and_plain_owner_agree() {
        let compressed =
            response(0x8180, 1, 1, b"\xc0\x0c", 1, 1, &[93, 184, 216, 34]);
        let plain = response(
            0x8180,
            1,
            1,
            b"\x07example\x03com\x00",
            1,
            1,
            &[93, 184, 216, 34],
        );
        assert_eq!(
            Response::parse(&compressed).unwrap(),
            Response::parse(&plain).unwrap()
        );
    }

    #[rstest]
    #[case::query_reflected(response(0x0100, 1, 1, b"\xc0\x0c", 1, 1, &[1, 2, 3, 4]), false)]
    #[case::two_questions(response(0x8180, 2, 1, b"\xc0\x0c", 1, 1, &[1, 2, 3, 4]), false)]
    #[case::no_answers(response(0x8180, 1, 0, b"\xc0\x0c", 1, 1, &[1, 2, 3, 4]), true)]
    #[case::aaaa(response(0x8180, 1, 1, b"\xc0\x0c", 28, 1, &[0; 16]), true)]
    #[case::class_ch(response(0x8180, 1, 1, b"\xc0\x0c", 1, 3, &[1, 2, 3, 4]), true)]
    #[case::long_rdata(response(0x8180, 1, 1, b"\xc0\x0c", 1, 1, &[0; 16]), true)]
    #[case::short_rdata(response(0x8180, 1, 1, b"\xc0\x0c", 1, 1, &[1, 2]), true)]
    #[case::header_only(
        b"\x12\x34\x81\x82\x00\x01\x00\x00\x00\x00\x00\x00".to_vec(),
        false
    )]
    #[case::broken_question(
        b"\x12\x34\x81\x82\x00\x01\x00\x00\x00\x00\x00\x00\x07exam"
            .to_vec(),
        false
    )]
    fn no_answer(#[case] msg: Vec<u8>, #[case] has_qname: bool) {
        let resp = Response::parse(&msg).unwrap();
        assert_eq!(resp.id(), 0x1234);
        assert_eq!(resp.addr(), None);
        assert_eq!(resp.qname().is_some(), has_qname);
    }

    #[test]
    fn nxdomain_without_answer() {
        let mut msg = Vec::new();
        msg.put_slice(b"\xab\xcd\x81\x83\x00\x01\x00\x00\x00\x00\x00\x00");
        msg.put_slice(QUESTION);
        let resp = Response::parse(&msg).unwrap();
        assert_eq!(resp.id(), 0xabcd);
        assert_eq!(resp.addr(), None);
    }

    #[test]
    fn truncated_response() {
        let msg = response(0x8180, 1, 1, b"\xc0\x0c", 1, 1, &[93, 184, 216, 34]);
        for len in 0..msg.len() {
            assert_eq!(
                Response::parse(&msg[..len]),
                Err(ParseError::ShortInput),
                "prefix of length {}",
                len
            );
        }
    }

    #[test]
    fn bad_owner_name() {
        let msg = response(0x8180, 1, 1, b"\x80\x0c", 1, 1, &[1, 2, 3, 4]);
        assert!(matches!(Response::parse(&msg), Err(ParseError::Form(_))));
    }
}
