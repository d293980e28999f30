//! Ledger state management.
//!
//! The `Ledger` owns the three collections that make up chain state:
//! - The hash-linked block sequence, genesis first
//! - The node table
//! - The consensus state (mechanism and current authority)
//!
//! All three are loaded from the store on open and written back after every
//! change. The chain is append-only.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use tally_core::{
    default_nodes, Block, BlockBuilder, ConsensusState, Error, Hash, Mechanism, Node, NodeStatus,
    Result, Transaction, DEFAULT_BLOCK_TIME_MS, DEFAULT_DIFFICULTY,
};
use tally_storage::{keys, KvStore, KvStoreExt};

use crate::validators::{RotationPolicy, ValidatorSet};

/// Chain configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Network identifier written into every block payload.
    pub network_id: String,
    /// Mechanism seeded into a fresh consensus state.
    pub mechanism: Mechanism,
    /// Target block time in milliseconds.
    pub block_time_ms: u64,
    /// Difficulty seeded into a fresh consensus state.
    pub difficulty: u32,
    /// Nonce attempts before a PoW block is abandoned.
    pub pow_max_iterations: u64,
    /// Where authority goes when the current validator is no longer active.
    pub rotation_policy: RotationPolicy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network_id: "tally-election-net".into(),
            mechanism: Mechanism::ProofOfAuthority,
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            difficulty: DEFAULT_DIFFICULTY,
            pow_max_iterations: 5_000_000,
            rotation_policy: RotationPolicy::RestartFromFirst,
        }
    }
}

/// What `initialize` had to create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub genesis_created: bool,
    pub nodes_seeded: bool,
    pub consensus_seeded: bool,
}

impl InitReport {
    /// Check if nothing was missing.
    pub fn is_noop(&self) -> bool {
        !(self.genesis_created || self.nodes_seeded || self.consensus_seeded)
    }
}

/// Coarse network health derived from node liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkHealth {
    Healthy,
    Degraded,
    Critical,
}

/// Summary of the node table and authority pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub validators: usize,
    pub active_validators: usize,
    pub chain_length: usize,
    pub current_validator: String,
    pub epoch: u64,
    pub health: NetworkHealth,
}

/// Current state of the election ledger.
pub struct Ledger<S: KvStore> {
    store: Arc<S>,
    config: ChainConfig,
    chain: Vec<Block>,
    nodes: Vec<Node>,
    consensus: ConsensusState,
}

impl<S: KvStore> Ledger<S> {
    /// Open the ledger, loading persisted state and seeding whatever is
    /// missing.
    pub fn open(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        let consensus =
            ConsensusState::new(Vec::new(), config.block_time_ms, config.difficulty);
        let mut ledger = Self {
            store,
            config,
            chain: Vec::new(),
            nodes: Vec::new(),
            consensus,
        };
        ledger.initialize()?;
        Ok(ledger)
    }

    /// Reload every collection from the store, creating the genesis block,
    /// the default node table and the default consensus state when absent.
    ///
    /// Running it again against an initialized store changes nothing.
    pub fn initialize(&mut self) -> Result<InitReport> {
        let mut report = InitReport::default();

        match self.store.load::<Vec<Block>>(keys::CHAIN)? {
            Some(chain) if !chain.is_empty() => self.chain = chain,
            _ => {
                let genesis = Block::genesis(tally_core::now());
                let chain = vec![genesis];
                self.store.save(keys::CHAIN, &chain)?;
                info!(hash = %chain[0].hash, "Created genesis block");
                self.chain = chain;
                report.genesis_created = true;
            }
        }

        match self.store.load::<Vec<Node>>(keys::NODES)? {
            Some(nodes) => self.nodes = nodes,
            None => {
                let nodes = default_nodes();
                self.store.save(keys::NODES, &nodes)?;
                info!(count = nodes.len(), "Seeded node table");
                self.nodes = nodes;
                report.nodes_seeded = true;
            }
        }

        match self.store.load::<ConsensusState>(keys::CONSENSUS)? {
            Some(consensus) => self.consensus = consensus,
            None => {
                let roster = self
                    .nodes
                    .iter()
                    .filter(|n| n.is_validator())
                    .map(|n| n.id.clone())
                    .collect();
                let mut consensus =
                    ConsensusState::new(roster, self.config.block_time_ms, self.config.difficulty);
                consensus.mechanism = self.config.mechanism;
                self.store.save(keys::CONSENSUS, &consensus)?;
                info!(
                    validator = %consensus.current_validator,
                    mechanism = ?consensus.mechanism,
                    "Seeded consensus state"
                );
                self.consensus = consensus;
                report.consensus_seeded = true;
            }
        }

        Ok(report)
    }

    /// Build a block holding `transactions` on top of the tip, validate it,
    /// append it and rotate authority.
    ///
    /// On any failure the chain is left untouched. Pool bookkeeping is the
    /// caller's job.
    pub fn append(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let tip = self.chain.last().ok_or_else(Error::not_initialized)?;
        let producer = self.consensus.current_validator.clone();

        if !self.consensus.validators.contains(&producer) {
            return Err(Error::invalid_block(
                tip.index + 1,
                format!("unknown validator: {producer}"),
            ));
        }

        let builder = BlockBuilder::new(producer.clone())
            .parent(tip)
            .data(json!({
                "network": self.config.network_id,
                "transaction_count": transactions.len(),
            }))
            .transactions(transactions)
            .difficulty(self.consensus.difficulty);

        let block = match self.consensus.mechanism {
            Mechanism::ProofOfAuthority => builder.seal(),
            Mechanism::ProofOfWork => builder.mine(self.config.pow_max_iterations)?,
        };

        block.validate(Some(tip))?;

        self.chain.push(block.clone());
        if let Err(e) = self.store.save(keys::CHAIN, &self.chain) {
            self.chain.pop();
            return Err(e);
        }

        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == producer) {
            node.record_validation(block.timestamp);
        }
        self.rotate();
        self.persist_metadata();

        info!(
            index = block.index,
            hash = %block.hash,
            validator = %producer,
            transactions = block.transactions.len(),
            gas_used = block.gas_used,
            "Appended block"
        );

        Ok(block)
    }

    /// Hand authority to the next active validator and bump the epoch.
    fn rotate(&mut self) {
        let active = ValidatorSet::active_from(&self.nodes);
        let next = active
            .next_after(
                &self.consensus.current_validator,
                &self.consensus.validators,
                self.config.rotation_policy,
            )
            .map(str::to_owned);

        match next {
            Some(next) => {
                debug!(
                    from = %self.consensus.current_validator,
                    to = %next,
                    epoch = self.consensus.epoch + 1,
                    "Rotated authority"
                );
                self.consensus.rotate_to(next);
            }
            None => warn!("No active validators, authority unchanged"),
        }
    }

    /// Write nodes and consensus state. The chain write is what commits a
    /// block, so failures here are logged and picked up by the next write.
    fn persist_metadata(&self) {
        if let Err(e) = self.store.save(keys::NODES, &self.nodes) {
            warn!(error = %e, "Failed to persist node table");
        }
        if let Err(e) = self.store.save(keys::CONSENSUS, &self.consensus) {
            warn!(error = %e, "Failed to persist consensus state");
        }
    }

    /// Check every block against its own content and its predecessor.
    pub fn validate_chain(&self) -> bool {
        self.first_invalid_block().is_none()
    }

    /// Position of the first block that fails validation.
    pub fn first_invalid_block(&self) -> Option<u64> {
        let mut parent: Option<&Block> = None;
        for (position, block) in self.chain.iter().enumerate() {
            if let Err(e) = block.validate(parent) {
                warn!(index = position, error = %e, "Chain integrity violation");
                return Some(position as u64);
            }
            parent = Some(block);
        }
        None
    }

    /// Set a node's liveness. Takes effect at the next rotation.
    pub fn set_node_status(&mut self, id: &str, status: NodeStatus) -> Result<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::node_not_found(id))?;
        node.status = status;
        self.store.save(keys::NODES, &self.nodes)?;
        info!(node = id, status = ?status, "Node status changed");
        Ok(())
    }

    /// Switch the block production mechanism.
    pub fn set_mechanism(&mut self, mechanism: Mechanism) -> Result<()> {
        self.consensus.mechanism = mechanism;
        self.store.save(keys::CONSENSUS, &self.consensus)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// All blocks, genesis first.
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Number of blocks including genesis.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Latest block.
    pub fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn block_by_index(&self, index: u64) -> Option<&Block> {
        self.chain.get(usize::try_from(index).ok()?)
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Option<&Block> {
        self.chain.iter().find(|b| &b.hash == hash)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Active validators in node-table order.
    pub fn active_validators(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_active_validator()).collect()
    }

    pub fn consensus(&self) -> &ConsensusState {
        &self.consensus
    }

    /// Node counts, authority pointer and health.
    pub fn network_status(&self) -> NetworkStatus {
        let total_nodes = self.nodes.len();
        let active_nodes = self.nodes.iter().filter(|n| n.is_active()).count();
        let validators = self.nodes.iter().filter(|n| n.is_validator()).count();
        let active_validators = self.active_validators().len();

        let health = if active_validators < 2 {
            NetworkHealth::Critical
        } else if active_nodes * 2 < total_nodes {
            NetworkHealth::Degraded
        } else {
            NetworkHealth::Healthy
        };

        NetworkStatus {
            total_nodes,
            active_nodes,
            validators,
            active_validators,
            chain_length: self.chain.len(),
            current_validator: self.consensus.current_validator.clone(),
            epoch: self.consensus.epoch,
            health,
        }
    }
}
