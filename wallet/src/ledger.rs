use std::{
    collections::HashSet,
    sync::Arc,
};

use log::trace;
use pos_common::{
    crypto::Hash,
    difficulty::CompactBits,
    script::Script,
    time::TimestampSeconds,
    tokio::sync::RwLock,
    transaction::{OutPoint, Transaction, TxOutput},
};
use serde::{Deserialize, Serialize};

// Immutable handle on the best block, passed to every component of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash,
    pub time: TimestampSeconds,
    pub bits: CompactBits,
}

impl Default for ChainTip {
    fn default() -> Self {
        Self {
            height: 0,
            hash: Hash::zero(),
            time: 0,
            bits: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub script: Script,
    pub confirmations: u64,
    pub creation_height: u64,
    // Timestamp of the block that created the output
    pub creation_time: TimestampSeconds,
    // Change created by this wallet
    pub from_me: bool,
}

impl UnspentOutput {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }

    pub fn to_tx_output(&self) -> TxOutput {
        TxOutput::new(self.amount, self.script.clone())
    }
}

// An output consumed since the previous snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentOutput {
    pub outpoint: OutPoint,
    pub spending_tx: Transaction,
}

/// Point-in-time view of the wallet outputs at a given tip.
///
/// A snapshot is never mutated once published; every scan holds an `Arc`
/// to the snapshot it started from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub tip: ChainTip,
    pub outputs: Vec<UnspentOutput>,
    // coin control and collateral locks
    pub locked: HashSet<OutPoint>,
    pub spent: Vec<SpentOutput>,
}

impl LedgerSnapshot {
    pub fn new(tip: ChainTip, outputs: Vec<UnspentOutput>) -> Self {
        Self {
            tip,
            outputs,
            locked: HashSet::new(),
            spent: Vec::new(),
        }
    }

    pub fn get_output(&self, outpoint: &OutPoint) -> Option<&UnspentOutput> {
        self.outputs.iter().find(|output| output.outpoint == *outpoint)
    }

    pub fn is_locked(&self, outpoint: &OutPoint) -> bool {
        self.locked.contains(outpoint)
    }

    /// Confirmed outputs, plus unconfirmed own change when allowed.
    ///
    /// Locked outputs are not part of the balance available for staking.
    pub fn trusted_balance(&self, spend_unconfirmed_change: bool) -> u64 {
        self.outputs
            .iter()
            .filter(|output| !self.is_locked(&output.outpoint))
            .filter(|output| output.is_confirmed() || (spend_unconfirmed_change && output.from_me))
            .fold(0u64, |acc, output| acc.saturating_add(output.amount))
    }
}

/// Shared holder of the latest snapshot and of user coin control locks.
///
/// Locks reported by the chain, like masternode collateral, are kept apart
/// from user locks so unlocking by the user never releases them.
pub struct LedgerView {
    current: RwLock<Arc<LedgerSnapshot>>,
    chain_locks: RwLock<HashSet<OutPoint>>,
    user_locks: RwLock<HashSet<OutPoint>>,
}

impl LedgerView {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(LedgerSnapshot::default())),
            chain_locks: RwLock::new(HashSet::new()),
            user_locks: RwLock::new(HashSet::new()),
        }
    }

    pub async fn current(&self) -> Arc<LedgerSnapshot> {
        self.current.read().await.clone()
    }

    // Publish a new snapshot, merging the user locks into it
    pub async fn replace(&self, mut snapshot: LedgerSnapshot) -> Arc<LedgerSnapshot> {
        *self.chain_locks.write().await = snapshot.locked.clone();
        snapshot
            .locked
            .extend(self.user_locks.read().await.iter().copied());

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "ledger snapshot at height {} with {} outputs ({} locked)",
                snapshot.tip.height,
                snapshot.outputs.len(),
                snapshot.locked.len()
            );
        }

        let snapshot = Arc::new(snapshot);
        *self.current.write().await = snapshot.clone();
        snapshot
    }

    async fn republish(&self) {
        let mut current = self.current.write().await;
        let mut snapshot = (**current).clone();
        snapshot
            .locked
            .extend(self.user_locks.read().await.iter().copied());
        *current = Arc::new(snapshot);
    }

    pub async fn lock_output(&self, outpoint: OutPoint) -> bool {
        let inserted = self.user_locks.write().await.insert(outpoint);
        if inserted {
            self.republish().await;
        }
        inserted
    }

    pub async fn unlock_output(&self, outpoint: &OutPoint) -> bool {
        let removed = self.user_locks.write().await.remove(outpoint);
        if removed && !self.chain_locks.read().await.contains(outpoint) {
            let mut current = self.current.write().await;
            let mut snapshot = (**current).clone();
            snapshot.locked.remove(outpoint);
            *current = Arc::new(snapshot);
        }
        removed
    }

    pub async fn locked_outputs(&self) -> Vec<OutPoint> {
        self.user_locks.read().await.iter().copied().collect()
    }
}

impl Default for LedgerView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_common::crypto::hash;

    fn output(index: u32, amount: u64, confirmations: u64, from_me: bool) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint::new(hash(b"ledger"), index),
            amount,
            script: Script::empty(),
            confirmations,
            creation_height: 1,
            creation_time: 0,
            from_me,
        }
    }

    #[test]
    fn test_trusted_balance() {
        let mut snapshot = LedgerSnapshot::new(
            ChainTip::default(),
            vec![
                output(0, 100, 5, false),
                output(1, 20, 0, true),
                output(2, 7, 0, false),
                output(3, 50, 3, false),
            ],
        );
        assert_eq!(snapshot.trusted_balance(false), 150);
        assert_eq!(snapshot.trusted_balance(true), 170);

        snapshot.locked.insert(OutPoint::new(hash(b"ledger"), 3));
        assert_eq!(snapshot.trusted_balance(false), 100);
    }

    #[tokio::test]
    async fn test_user_locks_survive_replace() {
        let view = LedgerView::new();
        let locked = OutPoint::new(hash(b"ledger"), 0);
        assert!(view.lock_output(locked).await);
        assert!(!view.lock_output(locked).await);

        let snapshot = view
            .replace(LedgerSnapshot::new(ChainTip::default(), vec![output(0, 1, 1, false)]))
            .await;
        assert!(snapshot.is_locked(&locked));

        assert!(view.unlock_output(&locked).await);
        assert!(!view.current().await.is_locked(&locked));
    }

    #[tokio::test]
    async fn test_user_unlock_keeps_chain_locks() {
        let view = LedgerView::new();
        let collateral = OutPoint::new(hash(b"ledger"), 0);
        let mut snapshot = LedgerSnapshot::new(ChainTip::default(), vec![output(0, 1, 1, false)]);
        snapshot.locked.insert(collateral);
        view.replace(snapshot).await;

        assert!(view.lock_output(collateral).await);
        assert!(view.unlock_output(&collateral).await);
        assert!(view.current().await.is_locked(&collateral));
        assert!(view.locked_outputs().await.is_empty());

        // released once the chain stops reporting it
        let snapshot = view
            .replace(LedgerSnapshot::new(ChainTip::default(), vec![output(0, 1, 1, false)]))
            .await;
        assert!(!snapshot.is_locked(&collateral));
    }
}
