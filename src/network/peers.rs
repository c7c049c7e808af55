// Known peers and their outbound queues.
// Every peer gets one channel and one writer thread, so a slow or dead peer only
// ever delays its own queue. A writer that keeps failing evicts its peer.

use crate::error::Result;
use crate::network::message::{send_message, Message};
use log::{info, warn};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Duration;

const SEND_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);
// Messages in a row that could not be delivered before a peer is dropped
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

struct Peer {
    addr: String,
    outbound: Sender<Message>,
}

#[derive(Clone)]
pub struct Peers {
    inner: Arc<RwLock<Vec<Peer>>>,
    max_peers: usize,
}

impl Peers {
    pub fn new(max_peers: usize) -> Peers {
        Peers {
            inner: Arc::new(RwLock::new(vec![])),
            max_peers,
        }
    }

    /// Registers a peer and starts its writer. False when it is already known
    /// or the peer set is full.
    pub fn add_peer(&self, addr: &str) -> bool {
        let mut inner = self.write_inner();
        if inner.iter().any(|p| p.addr == addr) || inner.len() >= self.max_peers {
            return false;
        }

        let (outbound, receiver) = mpsc::channel::<Message>();
        let peers = self.clone();
        let peer_addr = addr.to_string();
        thread::spawn(move || {
            let mut failures = 0;
            for message in receiver {
                match deliver(&peer_addr, &message) {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        warn!("Could not deliver {} to {peer_addr}: {e}", message.name());
                        if failures >= MAX_CONSECUTIVE_FAILURES {
                            peers.evict_peer(&peer_addr);
                            break;
                        }
                    }
                }
            }
        });

        inner.push(Peer {
            addr: addr.to_string(),
            outbound,
        });
        info!("Connected to peer: {addr}");
        true
    }

    pub fn evict_peer(&self, addr: &str) {
        let mut inner = self.write_inner();
        if let Some(idx) = inner.iter().position(|p| p.addr == addr) {
            inner.remove(idx);
            info!("Evicted peer: {addr}");
        }
    }

    /// Queues a message for one peer
    pub fn send_to(&self, addr: &str, message: Message) -> bool {
        let inner = self.read_inner();
        match inner.iter().find(|p| p.addr == addr) {
            Some(peer) => peer.outbound.send(message).is_ok(),
            None => false,
        }
    }

    /// Queues a message for every peer
    pub fn broadcast(&self, message: &Message) {
        for peer in self.read_inner().iter() {
            if peer.outbound.send(message.clone()).is_err() {
                warn!("Outbound queue to {} is closed", peer.addr);
            }
        }
    }

    pub fn addresses(&self) -> Vec<String> {
        self.read_inner().iter().map(|p| p.addr.clone()).collect()
    }

    pub fn is_known(&self, addr: &str) -> bool {
        self.read_inner().iter().any(|p| p.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.read_inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_inner().is_empty()
    }

    /// Drops every peer. Their writers finish once the queues drain.
    pub fn clear(&self) {
        self.write_inner().clear();
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, Vec<Peer>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Vec<Peer>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// I retry with a doubling pause before counting a message as lost
fn deliver(addr: &str, message: &Message) -> Result<()> {
    let mut backoff = RETRY_BACKOFF;
    let mut attempt = 1;
    loop {
        match send_message(addr, message) {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= SEND_ATTEMPTS => return Err(e),
            Err(_) => {
                thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
        }
    }
}
