//! Lookups waiting to be sent or answered.
//!
//! Every client keeps its outstanding lookups in a [`Pending`] value. A
//! lookup starts out waiting to be sent, is moved to waiting for a
//! response by the driver right before its query is sent, and leaves when
//! it is answered, fails, times out, is cancelled, or the client closes.
//! Both sets are keyed by message ID and an ID is never used twice at the
//! same time.

use super::error::Error;
use super::racing::LookupResult;
use crate::base::message::Response;
use crate::base::name::Dname;
use std::collections::HashMap;
use std::time::Instant;
use std::vec::Vec;
use tokio::sync::oneshot;

/// The number of available message IDs.
const ID_SPACE: usize = 1 << 16;

//------------ Request -------------------------------------------------------

/// A single lookup.
#[derive(Debug)]
pub struct Request {
    /// The name to look up.
    qname: Dname,

    /// Where the result goes.
    tx: oneshot::Sender<LookupResult>,
}

impl Request {
    /// Creates a new request.
    pub fn new(qname: Dname, tx: oneshot::Sender<LookupResult>) -> Self {
        Request { qname, tx }
    }

    /// Returns whether the caller has given up on the result.
    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Delivers the result.
    ///
    /// Consuming the request guarantees that a result is delivered once
    /// only.
    fn complete(self, result: LookupResult) {
        // If the receiver is gone, nobody cares anymore.
        let _ = self.tx.send(result);
    }
}

//------------ InFlight ------------------------------------------------------

/// A request whose query has been handed to the transport.
#[derive(Debug)]
struct InFlight {
    request: Request,

    /// When to give up waiting for a response.
    deadline: Option<Instant>,
}

//------------ Match ---------------------------------------------------------

/// What happened to a response offered to [`Pending::complete`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Match {
    /// The response answered a request.
    Answered,

    /// No request is waiting for a response with this ID.
    ///
    /// This is what happens to the slower replies when racing.
    Unknown,

    /// A request has the ID but asked for a different name.
    WrongQuestion,
}

//------------ Pending -------------------------------------------------------

/// The requests of a client.
///
/// The type itself does no locking. The client keeps it behind a mutex and
/// each method is a single, short critical section.
#[derive(Debug, Default)]
pub struct Pending {
    /// Requests waiting to be sent.
    awaiting_send: HashMap<u16, Request>,

    /// Requests waiting for a response.
    awaiting_recv: HashMap<u16, InFlight>,
}

impl Pending {
    /// Creates an empty set of requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of outstanding requests.
    pub fn len(&self) -> usize {
        self.awaiting_send.len() + self.awaiting_recv.len()
    }

    /// Returns whether there are no outstanding requests.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether any requests are waiting to be sent.
    pub fn has_unsent(&self) -> bool {
        !self.awaiting_send.is_empty()
    }

    /// Returns whether any requests are waiting for a response.
    pub fn awaiting_response(&self) -> bool {
        !self.awaiting_recv.is_empty()
    }

    /// Returns the earliest deadline of the requests waiting for a response.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.awaiting_recv
            .values()
            .filter_map(|item| item.deadline)
            .min()
    }

    /// Adds a new request waiting to be sent.
    ///
    /// The request gets a random message ID not currently used by any
    /// other request, which is returned. The more requests are
    /// outstanding, the longer finding a free ID may take. If all IDs are
    /// taken, the request is refused.
    pub fn insert(&mut self, request: Request) -> Result<u16, Error> {
        if self.len() >= ID_SPACE {
            return Err(Error::IdSpaceExhausted);
        }
        let mut id = rand::random();
        while self.contains(id) {
            id = rand::random();
        }
        self.awaiting_send.insert(id, request);
        Ok(id)
    }

    /// Returns whether a request with the given ID exists.
    pub fn contains(&self, id: u16) -> bool {
        self.awaiting_send.contains_key(&id)
            || self.awaiting_recv.contains_key(&id)
    }

    /// Moves all requests waiting to be sent to waiting for a response.
    ///
    /// Returns the IDs and names of the queries that now need sending.
    /// The requests are already waiting for a response when the queries
    /// go out, so even the fastest response finds them. Requests that
    /// have been cancelled are dropped instead.
    pub fn start_sending(
        &mut self,
        deadline: Option<Instant>,
    ) -> Vec<(u16, Dname)> {
        let mut res = Vec::with_capacity(self.awaiting_send.len());
        for (id, request) in self.awaiting_send.drain() {
            if request.is_cancelled() {
                continue;
            }
            res.push((id, request.qname.clone()));
            self.awaiting_recv
                .insert(id, InFlight { request, deadline });
        }
        res
    }

    /// Fails the request with the given ID if it is waiting for a response.
    pub fn fail(&mut self, id: u16, err: Error) {
        if let Some(item) = self.awaiting_recv.remove(&id) {
            item.request.complete(Err(err))
        }
    }

    /// Offers a response to the waiting requests.
    ///
    /// If the response has a question, it must be for the name the
    /// request asked for. Otherwise the request keeps waiting.
    pub fn complete(&mut self, response: &Response) -> Match {
        let item = match self.awaiting_recv.get(&response.id()) {
            Some(item) => item,
            None => return Match::Unknown,
        };
        if let Some(qname) = response.qname() {
            if *qname != item.request.qname {
                return Match::WrongQuestion;
            }
        }
        if let Some(item) = self.awaiting_recv.remove(&response.id()) {
            item.request.complete(Ok(response.addr()));
        }
        Match::Answered
    }

    /// Removes requests that have timed out or were cancelled.
    ///
    /// Timed out requests are failed with [`Error::Timeout`]. Returns the
    /// number of timed out requests.
    pub fn expire(&mut self, now: Instant) -> usize {
        self.awaiting_send.retain(|_, request| !request.is_cancelled());
        self.awaiting_recv
            .retain(|_, item| !item.request.is_cancelled());
        let expired: Vec<u16> = self
            .awaiting_recv
            .iter()
            .filter(|(_, item)| {
                item.deadline.map_or(false, |deadline| deadline <= now)
            })
            .map(|(id, _)| *id)
            .collect();
        for &id in &expired {
            self.fail(id, Error::Timeout)
        }
        expired.len()
    }

    /// Fails all requests with [`Error::ClientClosed`].
    pub fn close(&mut self) {
        for (_, request) in self.awaiting_send.drain() {
            request.complete(Err(Error::ClientClosed));
        }
        for (_, item) in self.awaiting_recv.drain() {
            item.request.complete(Err(Error::ClientClosed));
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::message::compose_query;
    use std::collections::HashSet;
    use std::str::FromStr;
    use std::time::Duration;
    use tokio::sync::oneshot::error::TryRecvError;

    fn request(name: &str) -> (Request, oneshot::Receiver<LookupResult>) {
        let (tx, rx) = oneshot::channel();
        (Request::new(Dname::from_str(name).unwrap(), tx), rx)
    }

    fn answer(id: u16, name: &str, addr: [u8; 4]) -> Response {
        let mut msg = compose_query(id, &Dname::from_str(name).unwrap())
            .to_vec();
        msg[2] |= 0x80; // QR
        msg[7] = 1; // ANCOUNT
        msg.extend_from_slice(b"\xc0\x0c\x00\x01\x00\x01\x00\x00\x00\x3c");
        msg.extend_from_slice(b"\x00\x04");
        msg.extend_from_slice(&addr);
        Response::parse(&msg).unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let mut pending = Pending::new();
        let mut ids = HashSet::new();
        let mut receivers = Vec::new();
        for i in 0..2000 {
            let (req, rx) = request("example.com");
            receivers.push(rx);
            assert!(ids.insert(pending.insert(req).unwrap()));
            // Move some along so both sets are checked.
            if i % 3 == 0 {
                pending.start_sending(None);
            }
        }
        assert_eq!(pending.len(), 2000);
    }

    #[test]
    fn complete_once() {
        let mut pending = Pending::new();
        let (req, mut rx) = request("example.com");
        let id = pending.insert(req).unwrap();

        // Not sent yet, so not answerable.
        let resp = answer(id, "example.com", [93, 184, 216, 34]);
        assert_eq!(pending.complete(&resp), Match::Unknown);

        let sent = pending.start_sending(None);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, id);
        assert!(!pending.has_unsent());

        assert_eq!(pending.complete(&resp), Match::Answered);
        assert_eq!(pending.complete(&resp), Match::Unknown);
        assert!(pending.is_empty());
        assert_eq!(
            rx.try_recv().unwrap().unwrap(),
            Some([93, 184, 216, 34].into())
        );
    }

    #[test]
    fn wrong_question_keeps_waiting() {
        let mut pending = Pending::new();
        let (req, mut rx) = request("example.com");
        let id = pending.insert(req).unwrap();
        pending.start_sending(None);

        let resp = answer(id, "example.org", [10, 0, 0, 1]);
        assert_eq!(pending.complete(&resp), Match::WrongQuestion);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let resp = answer(id, "EXAMPLE.com", [10, 0, 0, 2]);
        assert_eq!(pending.complete(&resp), Match::Answered);
        assert_eq!(rx.try_recv().unwrap().unwrap(), Some([10, 0, 0, 2].into()));
    }

    #[test]
    fn fail_only_in_flight() {
        let mut pending = Pending::new();
        let (req, mut rx) = request("example.com");
        let id = pending.insert(req).unwrap();
        pending.fail(id, Error::UdpShortSend);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        pending.start_sending(None);
        pending.fail(id, Error::UdpShortSend);
        assert!(matches!(rx.try_recv(), Ok(Err(Error::UdpShortSend))));
        assert!(pending.is_empty());
    }

    #[test]
    fn cancelled_are_dropped() {
        let mut pending = Pending::new();
        let (req, rx) = request("example.com");
        pending.insert(req).unwrap();
        let (req, _rx) = request("example.net");
        pending.insert(req).unwrap();
        drop(rx);
        let sent = pending.start_sending(None);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, Dname::from_str("example.net").unwrap());
    }

    #[test]
    fn expire() {
        let mut pending = Pending::new();
        let now = Instant::now();
        let (req, mut early) = request("example.com");
        pending.insert(req).unwrap();
        pending.start_sending(Some(now));
        let (req, mut late) = request("example.com");
        pending.insert(req).unwrap();
        pending.start_sending(Some(now + Duration::from_secs(60)));
        let (req, mut never) = request("example.com");
        pending.insert(req).unwrap();
        pending.start_sending(None);

        assert_eq!(pending.expire(now), 1);
        assert!(matches!(early.try_recv(), Ok(Err(Error::Timeout))));
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(never.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn awaiting_response() {
        let mut pending = Pending::new();
        let now = Instant::now();
        assert!(!pending.awaiting_response());
        assert_eq!(pending.next_deadline(), None);

        let (req, _never) = request("example.com");
        let id = pending.insert(req).unwrap();
        assert!(!pending.awaiting_response());
        pending.start_sending(None);
        assert!(pending.awaiting_response());
        assert_eq!(pending.next_deadline(), None);

        let (req, _late) = request("example.com");
        pending.insert(req).unwrap();
        pending.start_sending(Some(now + Duration::from_secs(60)));
        let (req, _early) = request("example.com");
        pending.insert(req).unwrap();
        pending.start_sending(Some(now + Duration::from_secs(1)));
        assert_eq!(pending.next_deadline(), Some(now + Duration::from_secs(1)));

        pending.fail(id, Error::UdpShortSend);
        assert!(pending.awaiting_response());
        pending.close();
        assert!(!pending.awaiting_response());
    }

    #[test]
    fn close_fails_everything() {
        let mut pending = Pending::new();
        let (req, mut sent) = request("example.com");
        pending.insert(req).unwrap();
        pending.start_sending(None);
        let (req, mut unsent) = request("example.com");
        pending.insert(req).unwrap();

        pending.close();
        assert!(pending.is_empty());
        assert!(matches!(sent.try_recv(), Ok(Err(Error::ClientClosed))));
        assert!(matches!(unsent.try_recv(), Ok(Err(Error::ClientClosed))));
    }
}
