//! Cold staking delegations.
//!
//! An owner hands the right to stake some coins to a staker without handing
//! over the right to spend them. Both sides of a delegation can live in this
//! wallet: outputs we own are tracked so the owner sees what is delegated,
//! outputs we stake for are tracked so claims can be refused once voided.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use indexmap::IndexMap;
use log::{debug, info, warn};
use pos_common::{
    config::MIN_COLD_STAKING_AMOUNT,
    crypto::{Address, Hash, Hashable},
    network::Network,
    script::{Script, ScriptTemplate},
    tokio::sync::RwLock,
    transaction::{verify_coinstake, OutPoint, Transaction, TxOutput},
};
use serde::{Deserialize, Serialize};

use crate::{
    coinstake::build_coinstake,
    error::StakingError,
    keystore::Keystore,
    ledger::LedgerSnapshot,
    staking::{KernelSolution, StakeSplitThreshold},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationState {
    Active,
    // Spent outside of a coinstake claim, or revoked by the user
    Voided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub outpoint: OutPoint,
    pub owner: Address,
    pub staker: Address,
    pub amount: u64,
    pub creation_tx: Hash,
    pub label: Option<String>,
    pub state: DelegationState,
}

impl Delegation {
    pub fn is_active(&self) -> bool {
        self.state == DelegationState::Active
    }
}

// Changes applied by a sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub discovered: usize,
    pub migrated: usize,
    pub voided: usize,
    pub pruned: usize,
}

pub struct DelegationManager {
    network: Network,
    keystore: Arc<Keystore>,
    allow_self_delegation: AtomicBool,
    records: RwLock<IndexMap<OutPoint, Delegation>>,
    // labels of delegations created here but not yet seen on chain
    pending_labels: RwLock<HashMap<Script, String>>,
    // voided delegations whose spend was seen on chain
    spent_voids: RwLock<HashSet<OutPoint>>,
}

impl DelegationManager {
    pub fn new(keystore: Arc<Keystore>, allow_self_delegation: bool) -> Self {
        Self {
            network: keystore.get_network(),
            keystore,
            allow_self_delegation: AtomicBool::new(allow_self_delegation),
            records: RwLock::new(IndexMap::new()),
            pending_labels: RwLock::new(HashMap::new()),
            spent_voids: RwLock::new(HashSet::new()),
        }
    }

    pub fn set_allow_self_delegation(&self, allow: bool) {
        self.allow_self_delegation.store(allow, Ordering::SeqCst);
    }

    pub fn is_self_delegation_allowed(&self) -> bool {
        self.allow_self_delegation.load(Ordering::SeqCst)
    }

    /// Build the cold stake output delegating `amount` to `staker`.
    ///
    /// A fresh owner key is generated when `owner` is None, which requires a
    /// fully unlocked wallet.
    pub async fn create_delegation(
        &self,
        owner: Option<Address>,
        staker: &str,
        amount: u64,
        label: Option<String>,
    ) -> Result<TxOutput, StakingError> {
        let staker = Address::from_string_for(staker, self.network)
            .map_err(|e| StakingError::InvalidStakerAddress(e.to_string()))?;

        if !self.is_self_delegation_allowed() && self.keystore.is_mine(&staker).await {
            return Err(StakingError::InvalidStakerAddress(format!(
                "{} belongs to this wallet",
                staker
            )));
        }

        if amount < MIN_COLD_STAKING_AMOUNT {
            return Err(StakingError::AmountTooLow {
                amount,
                minimum: MIN_COLD_STAKING_AMOUNT,
            });
        }

        let owner = match owner {
            Some(owner) => {
                if owner.get_network() != self.network {
                    return Err(StakingError::Crypto(
                        pos_common::crypto::CryptoError::InvalidAddress(owner.to_string()),
                    ));
                }
                owner
            }
            None => self.keystore.new_address().await?,
        };

        if owner == staker {
            return Err(StakingError::InvalidStakerAddress(format!(
                "{} is also the owner",
                staker
            )));
        }

        let script = ScriptTemplate::ColdStake {
            staker: *staker.get_key_id(),
            owner: *owner.get_key_id(),
        }
        .to_script();

        if let Some(label) = label {
            self.pending_labels
                .write()
                .await
                .insert(script.clone(), label);
        }

        if log::log_enabled!(log::Level::Info) {
            info!("Delegating {} from {} to staker {}", amount, owner, staker);
        }

        Ok(TxOutput::new(amount, script))
    }

    // Track a cold stake output, keeps the existing record if already known
    pub async fn record_delegation(
        &self,
        outpoint: OutPoint,
        creation_tx: Hash,
        output: &TxOutput,
        label: Option<String>,
    ) -> Result<(), StakingError> {
        let ScriptTemplate::ColdStake { staker, owner } = output.script.template()? else {
            return Err(StakingError::UnrecognizedScript);
        };

        let mut records = self.records.write().await;
        records.entry(outpoint).or_insert_with(|| Delegation {
            outpoint,
            owner: Address::new(self.network, owner),
            staker: Address::new(self.network, staker),
            amount: output.amount,
            creation_tx,
            label,
            state: DelegationState::Active,
        });
        Ok(())
    }

    /// Bring the records in line with a new ledger snapshot.
    ///
    /// A delegated output spent by a coinstake paying back to its own script
    /// moves to the new outputs. Spent any other way it is voided for good.
    /// Cold stake outputs we own or stake for that are not tracked yet are
    /// recorded.
    pub async fn sync(&self, snapshot: &LedgerSnapshot) -> Result<SyncReport, StakingError> {
        let mut report = SyncReport::default();
        let keys = self.keystore.key_set().await;
        let mut records = self.records.write().await;
        let mut spent_voids = self.spent_voids.write().await;

        for spent in &snapshot.spent {
            let Some(record) = records.get(&spent.outpoint).cloned() else {
                continue;
            };
            if !record.is_active() {
                spent_voids.insert(spent.outpoint);
                continue;
            }

            let tx = &spent.spending_tx;
            let script = ScriptTemplate::ColdStake {
                staker: *record.staker.get_key_id(),
                owner: *record.owner.get_key_id(),
            }
            .to_script();

            if is_claim_of(tx, &script) {
                let txid = tx.hash();
                records.shift_remove(&spent.outpoint);
                for (index, output) in tx.get_outputs().iter().enumerate().skip(1) {
                    let outpoint = OutPoint::new(txid, index as u32);
                    records.insert(
                        outpoint,
                        Delegation {
                            outpoint,
                            amount: output.amount,
                            creation_tx: txid,
                            state: DelegationState::Active,
                            ..record.clone()
                        },
                    );
                }
                report.migrated += 1;

                if log::log_enabled!(log::Level::Debug) {
                    debug!("Delegation {} migrated to coinstake {}", spent.outpoint, txid);
                }
            } else if let Some(record) = records.get_mut(&spent.outpoint) {
                record.state = DelegationState::Voided;
                spent_voids.insert(spent.outpoint);
                report.voided += 1;

                if log::log_enabled!(log::Level::Info) {
                    info!("Delegation {} was spent and is now void", spent.outpoint);
                }
            }
        }

        let mut pending_labels = self.pending_labels.write().await;
        for output in &snapshot.outputs {
            if records.contains_key(&output.outpoint) {
                continue;
            }
            let Ok(ScriptTemplate::ColdStake { staker, owner }) = output.script.template() else {
                continue;
            };
            if !keys.contains(&staker) && !keys.contains(&owner) {
                continue;
            }

            records.insert(
                output.outpoint,
                Delegation {
                    outpoint: output.outpoint,
                    owner: Address::new(self.network, owner),
                    staker: Address::new(self.network, staker),
                    amount: output.amount,
                    creation_tx: output.outpoint.txid,
                    label: pending_labels.remove(&output.script),
                    state: DelegationState::Active,
                },
            );
            report.discovered += 1;
        }

        // a void is dropped once its spend left the recent history
        let in_history: HashSet<OutPoint> = snapshot
            .spent
            .iter()
            .map(|spent| spent.outpoint)
            .chain(snapshot.outputs.iter().map(|output| output.outpoint))
            .collect();
        spent_voids.retain(|outpoint| {
            if in_history.contains(outpoint) {
                return true;
            }
            if records.shift_remove(outpoint).is_some() {
                report.pruned += 1;
            }
            false
        });

        if report != SyncReport::default() && log::log_enabled!(log::Level::Debug) {
            debug!(
                "Delegations synced at height {}: {} discovered, {} migrated, {} voided, {} pruned",
                snapshot.tip.height,
                report.discovered,
                report.migrated,
                report.voided,
                report.pruned
            );
        }

        Ok(report)
    }

    // Permanently refuse to stake this output again
    pub async fn void_delegation(&self, outpoint: &OutPoint) -> Result<Delegation, StakingError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(outpoint)
            .ok_or(StakingError::UnknownOutput(*outpoint))?;

        if !record.is_active() {
            return Err(StakingError::DelegationAlreadyVoided);
        }
        record.state = DelegationState::Voided;

        if log::log_enabled!(log::Level::Info) {
            info!("Delegation {} voided", outpoint);
        }
        Ok(record.clone())
    }

    /// Sign the coinstake claiming a kernel found on one of our outputs.
    ///
    /// The keystore signs cold stake outputs on the staker path and plain key
    /// outputs with their own key. Only staking rights are needed, so this
    /// works on a wallet unlocked for staking only.
    pub async fn sign_kernel_claim(
        &self,
        solution: &KernelSolution,
        reward: u64,
        threshold: StakeSplitThreshold,
    ) -> Result<Transaction, StakingError> {
        let output = &solution.candidate.output;
        if let Some(record) = self.records.read().await.get(&output.outpoint) {
            if !record.is_active() {
                return Err(StakingError::DelegationAlreadyVoided);
            }
        }

        let kernel = output.to_tx_output();
        let mut tx = build_coinstake(solution, reward, threshold)?;
        self.keystore
            .sign_claim(&mut tx, &kernel, &solution.candidate.class)
            .await?;

        if let Err(e) = verify_coinstake(&tx, &kernel) {
            if log::log_enabled!(log::Level::Warn) {
                warn!("Refusing invalid claim on {}: {}", output.outpoint, e);
            }
            return Err(e.into());
        }

        Ok(tx)
    }

    // Outputs that must never be used as a kernel again
    pub async fn voided_outputs(&self) -> HashSet<OutPoint> {
        self.records
            .read()
            .await
            .values()
            .filter(|record| !record.is_active())
            .map(|record| record.outpoint)
            .collect()
    }

    pub async fn list_delegations(&self) -> Vec<Delegation> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn delegation_for(&self, outpoint: &OutPoint) -> Option<Delegation> {
        self.records.read().await.get(outpoint).cloned()
    }
}

// A coinstake spending into the same script only
fn is_claim_of(tx: &Transaction, script: &Script) -> bool {
    tx.is_coinstake()
        && tx
            .get_outputs()
            .iter()
            .skip(1)
            .all(|output| output.script == *script)
}
