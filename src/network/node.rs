// A node is the ledger plus its peers.
// Local events (a committed block, an accepted transaction) fan out to every
// peer queue. Inbound messages come in through the server and end up in
// `handle_message`. Forks are settled by cumulative difficulty, never by length.

use crate::core::{
    cumulative_difficulty, Block, Blockchain, Miner, Transaction, DEFAULT_MAX_BLOCK_TRANSACTIONS,
};
use crate::error::{BlockchainError, Result};
use crate::network::message::parse_peer_addr;
use crate::network::{Message, Peers, Server};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// What a received block did to the local chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockCheck {
    /// Extended the tip
    Accepted(Block),
    /// Ahead of the tip on a chain I do not have. The sender's chain is needed.
    NeedFullChain,
    /// At or behind the tip, nothing changed
    UpToDate,
}

#[derive(Clone)]
pub struct Node {
    address: String,
    blockchain: Blockchain,
    peers: Peers,
    max_block_transactions: usize,
    shutdown: Arc<AtomicBool>,
    mining: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Node {
    pub fn new(address: &str, blockchain: Blockchain, max_peers: usize) -> Node {
        Node {
            address: address.to_string(),
            blockchain,
            peers: Peers::new(max_peers),
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
            shutdown: Arc::new(AtomicBool::new(false)),
            mining: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_max_block_transactions(mut self, max_block_transactions: usize) -> Node {
        self.max_block_transactions = max_block_transactions;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Binds the listener, then accepts connections on a background thread.
    /// Bootstrap peers are contacted once the listener is up.
    pub fn start(&self, bootstrap_peers: &[String]) -> Result<JoinHandle<()>> {
        let server = Server::new(self.clone());
        let listener = server.bind()?;
        let handle = thread::spawn(move || server.serve(listener));

        for peer in bootstrap_peers {
            if let Err(e) = self.connect_to_peer(peer) {
                warn!("Could not reach bootstrap peer {peer}: {e}");
            }
        }
        Ok(handle)
    }

    /// Runs the node until [`Node::shutdown`] is called
    pub fn run(&self, bootstrap_peers: &[String]) -> Result<()> {
        let served = self.start(bootstrap_peers).and_then(|handle| {
            handle
                .join()
                .map_err(|_| BlockchainError::Network("Server thread panicked".to_string()))
        });
        // The mining loop must not outlive the server, whichever way it ended
        if !self.is_shutting_down() {
            self.shutdown();
        }
        self.join_mining_loop()?;
        served
    }

    /// Stops the accept loop, cancels mining and drops every peer queue
    pub fn shutdown(&self) {
        info!("Shutting down node {}", self.address);
        self.shutdown.store(true, Ordering::SeqCst);
        self.peers.clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Registers a peer and introduces myself. False when the peer was already
    /// known, is this node, or the peer set is full.
    pub fn connect_to_peer(&self, addr: &str) -> Result<bool> {
        parse_peer_addr(addr)?;
        if addr == self.address || !self.peers.add_peer(addr) {
            return Ok(false);
        }

        self.peers.send_to(
            addr,
            Message::Hello {
                addr_from: self.address.clone(),
                latest_block: self.blockchain.get_last_block(),
            },
        );
        Ok(true)
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.addresses()
    }

    pub fn handle_message(&self, message: Message) -> Result<()> {
        match message {
            Message::Hello {
                addr_from,
                latest_block,
            } => self.handle_hello(addr_from, latest_block),
            Message::NewBlock { addr_from, block } => {
                self.handle_new_block(&addr_from, block).map(|_| ())
            }
            Message::NewTransaction { transaction } => self.handle_new_transaction(transaction),
            Message::ChainRequest {
                addr_from,
                from_index,
            } => {
                let blocks = self.blockchain.get_blocks_from(from_index);
                self.reply(&addr_from, Message::ChainResponse { blocks })
            }
            Message::ChainResponse { blocks } => self.handle_chain_response(blocks).map(|_| ()),
            Message::PeerList { peers } => {
                for peer in peers {
                    if !self.peers.is_known(&peer) {
                        if let Err(e) = self.connect_to_peer(&peer) {
                            debug!("Ignoring advertised peer {peer}: {e}");
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn handle_hello(&self, addr_from: String, latest_block: Block) -> Result<()> {
        let newly_known = self.connect_to_peer(&addr_from)?;
        if !newly_known {
            // Already introduced, but the peer may still be behind me
            let tip = self.blockchain.get_last_block();
            if tip.get_index() > latest_block.get_index() {
                self.peers.send_to(
                    &addr_from,
                    Message::NewBlock {
                        addr_from: self.address.clone(),
                        block: tip,
                    },
                );
            }
        }

        let others: Vec<String> = self
            .peers
            .addresses()
            .into_iter()
            .filter(|peer| *peer != addr_from)
            .collect();
        if !others.is_empty() {
            self.peers
                .send_to(&addr_from, Message::PeerList { peers: others });
        }

        self.handle_new_block(&addr_from, latest_block).map(|_| ())
    }

    fn handle_new_block(&self, addr_from: &str, block: Block) -> Result<BlockCheck> {
        let outcome = self.check_received_block(block)?;
        match &outcome {
            BlockCheck::Accepted(block) => self.announce_block(block),
            BlockCheck::NeedFullChain => {
                info!("Peer {addr_from} is ahead of me, requesting its chain");
                self.reply(
                    addr_from,
                    Message::ChainRequest {
                        addr_from: self.address.clone(),
                        from_index: 0,
                    },
                )?;
            }
            BlockCheck::UpToDate => {}
        }
        Ok(outcome)
    }

    fn handle_new_transaction(&self, transaction: Transaction) -> Result<()> {
        if self
            .blockchain
            .get_transaction_by_id(&transaction.get_id())
            .is_ok()
        {
            return Ok(());
        }
        self.submit_transaction(transaction).map(|_| ())
    }

    /// Decides what to do with a block a peer sent me. Only a block that
    /// directly extends my tip changes anything.
    pub fn check_received_block(&self, block: Block) -> Result<BlockCheck> {
        let tip = self.blockchain.get_last_block();

        if block.get_index() <= tip.get_index() {
            return Ok(BlockCheck::UpToDate);
        }
        if block.get_index() != tip.get_index() + 1 || block.get_previous_hash() != tip.get_hash() {
            return Ok(BlockCheck::NeedFullChain);
        }

        match self.blockchain.add_block(block) {
            Ok(block) => Ok(BlockCheck::Accepted(block)),
            // The tip moved between my look and the append
            Err(e) if e.is_stale() => {
                debug!("Received block went stale: {e}");
                Ok(BlockCheck::UpToDate)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves a fork with a peer's chain. A partial response is spliced onto my
    /// own blocks below its first index. True when my chain was replaced.
    pub fn handle_chain_response(&self, blocks: Vec<Block>) -> Result<bool> {
        let Some(first) = blocks.first() else {
            return Ok(false);
        };

        let candidate = if first.get_index() == 0 {
            blocks
        } else {
            let mut prefix: Vec<Block> = self
                .blockchain
                .get_all_blocks()
                .into_iter()
                .take_while(|b| b.get_index() < first.get_index())
                .collect();
            prefix.extend(blocks);
            prefix
        };

        Blockchain::verify_hash_chain(&candidate)?;

        let candidate_work = cumulative_difficulty(&candidate);
        let current_work = self.blockchain.cumulative_difficulty();
        if candidate_work <= current_work {
            info!(
                "Keeping my chain: received cumulative difficulty {candidate_work} does not exceed {current_work}"
            );
            return Ok(false);
        }

        self.blockchain.replace_chain(candidate)?;
        self.announce_block(&self.blockchain.get_last_block());
        Ok(true)
    }

    /// Admits a transaction to the pending pool and relays it
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        let accepted = self.blockchain.add_transaction(transaction)?;
        self.peers.broadcast(&Message::NewTransaction {
            transaction: accepted.clone(),
        });
        Ok(accepted)
    }

    /// A block announced by an outside caller, treated like one from a peer
    pub fn submit_block(&self, block: Block) -> Result<BlockCheck> {
        let outcome = self.check_received_block(block)?;
        if let BlockCheck::Accepted(block) = &outcome {
            self.announce_block(block);
        }
        Ok(outcome)
    }

    /// Mines one block on the current tip, commits it and relays it
    pub fn mine(&self, reward_address: &str, fee_address: &str) -> Result<Block> {
        let block = Miner::new(self.blockchain.clone())
            .with_max_transactions(self.max_block_transactions)
            .mine_and_commit(reward_address, fee_address, &self.shutdown)?;
        self.announce_block(&block);
        Ok(block)
    }

    /// Mines in the background whenever transactions are pending, until shutdown
    /// Starts mining in the background whenever transactions are pending.
    /// The loop stops on shutdown and [`Node::run`] waits for it.
    pub fn start_mining_loop(&self, reward_address: String, fee_address: String, poll_interval: Duration) {
        let mut mining = self.mining.lock().unwrap_or_else(PoisonError::into_inner);
        if mining.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Mining loop is already running");
            return;
        }

        let node = self.clone();
        *mining = Some(thread::spawn(move || {
            info!("Mining is on. Address to receive rewards: {reward_address}");
            while !node.is_shutting_down() {
                if node.blockchain.get_all_transactions().is_empty() {
                    thread::sleep(poll_interval);
                    continue;
                }
                match node.mine(&reward_address, &fee_address) {
                    Ok(_) => {}
                    Err(BlockchainError::MiningCancelled) => break,
                    Err(e) if e.is_stale() => debug!("Lost a mining race: {e}"),
                    Err(e) => {
                        error!("Mining failed: {e}");
                        thread::sleep(poll_interval);
                    }
                }
            }
            info!("Mining loop stopped");
        }));
    }

    pub fn is_mining(&self) -> bool {
        self.mining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn join_mining_loop(&self) -> Result<()> {
        let handle = self.mining.lock().unwrap_or_else(PoisonError::into_inner).take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| BlockchainError::Network("Mining thread panicked".to_string())),
            None => Ok(()),
        }
    }

    pub fn get_confirmations(&self, transaction_id: &Uuid) -> Result<u64> {
        self.blockchain.get_confirmations(transaction_id)
    }

    fn announce_block(&self, block: &Block) {
        self.peers.broadcast(&Message::NewBlock {
            addr_from: self.address.clone(),
            block: block.clone(),
        });
    }

    // Replies go through the peer's queue when it is known, directly otherwise
    fn reply(&self, addr: &str, message: Message) -> Result<()> {
        if self.peers.send_to(addr, message.clone()) {
            return Ok(());
        }
        crate::network::send_message(addr, &message)
    }
}
