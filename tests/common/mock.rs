//! A mock resolver.
//!
//! The mock listens on a loopback UDP socket in a thread of its own and
//! hands each query it receives to a closure which decides what to send
//! back. The helper functions below turn a query into the various
//! responses needed by the tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::vec::Vec;

/// What the mock sends in reply to a query.
pub type Behaviour = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send>;

//------------ MockResolver --------------------------------------------------

/// A resolver answering queries on a loopback socket.
///
/// The thread is stopped when the value is dropped.
pub struct MockResolver {
    addr: SocketAddr,
    queries: Arc<Mutex<Vec<Vec<u8>>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockResolver {
    /// Starts a new mock resolver.
    pub fn start(behaviour: Behaviour) -> Self {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let addr = sock.local_addr().unwrap();
        let queries = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let queries = queries.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 512];
                while !stop.load(Ordering::Relaxed) {
                    let (len, from) = match sock.recv_from(&mut buf) {
                        Ok(res) => res,
                        Err(_) => continue,
                    };
                    let query = &buf[..len];
                    queries.lock().push(query.to_vec());
                    for reply in behaviour(query) {
                        let _ = sock.send_to(&reply, from);
                    }
                }
            })
        };
        MockResolver {
            addr,
            queries,
            stop,
            handle: Some(handle),
        }
    }

    /// Starts a mock resolver answering every query with `addr`.
    pub fn answering(addr: Ipv4Addr) -> Self {
        Self::start(Box::new(move |query| vec![answer(query, addr)]))
    }

    /// Starts a mock resolver that never answers.
    pub fn silent() -> Self {
        Self::start(Box::new(|_| Vec::new()))
    }

    /// Returns the address to send queries to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the number of queries received so far.
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    /// Returns the distinct message IDs of all queries received so far.
    pub fn query_ids(&self) -> HashSet<u16> {
        self.queries
            .lock()
            .iter()
            .map(|query| u16::from_be_bytes([query[0], query[1]]))
            .collect()
    }
}

impl Drop for MockResolver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

//------------ Responses -----------------------------------------------------

/// Turns a query into a response without any answers.
pub fn no_answer(query: &[u8]) -> Vec<u8> {
    let mut msg = query.to_vec();
    msg[2] |= 0x80;
    msg[3] |= 0x80;
    msg
}

/// Turns a query into a response with one answer record.
///
/// The owner of the record is a compression pointer to the question.
pub fn record(query: &[u8], rtype: u16, rclass: u16, rdata: &[u8]) -> Vec<u8> {
    let mut msg = no_answer(query);
    msg[7] = 1;
    msg.extend_from_slice(b"\xc0\x0c");
    msg.extend_from_slice(&rtype.to_be_bytes());
    msg.extend_from_slice(&rclass.to_be_bytes());
    msg.extend_from_slice(&3600u32.to_be_bytes());
    msg.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    msg.extend_from_slice(rdata);
    msg
}

/// Turns a query into a response with an A record for `addr`.
pub fn answer(query: &[u8], addr: Ipv4Addr) -> Vec<u8> {
    record(query, 1, 1, &addr.octets())
}
