//! Collaborators of the staking engine: where chain data comes from and
//! where a found coinstake goes.

use async_trait::async_trait;
use pos_common::{
    crypto::Hash,
    kernel::StakeProof,
    time::TimestampSeconds,
    transaction::Transaction,
};
use serde::{Deserialize, Serialize};

use crate::ledger::{ChainTip, LedgerSnapshot};

// Minimal header data needed to derive stake modifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: Hash,
    // None for the genesis block
    pub parent: Option<Hash>,
    pub height: u64,
    pub time: TimestampSeconds,
    pub entropy: Hash,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn best_tip(&self) -> anyhow::Result<ChainTip>;

    async fn is_synced(&self) -> anyhow::Result<bool>;

    // Wallet outputs as seen at `tip`
    async fn snapshot(&self, tip: &ChainTip) -> anyhow::Result<LedgerSnapshot>;

    async fn block_header(&self, hash: &Hash) -> anyhow::Result<Option<BlockHeader>>;

    // Reward for a block staked at `height`
    async fn stake_reward(&self, height: u64) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted,
    // Valid but lost a race against another block
    Orphaned,
    Rejected(String),
}

#[async_trait]
pub trait CoinstakeSink: Send + Sync {
    async fn submit_coinstake(
        &self,
        tx: Transaction,
        proof: StakeProof,
        tip: &ChainTip,
    ) -> anyhow::Result<SubmitOutcome>;
}
