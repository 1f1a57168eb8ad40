//! The staking loop.
//!
//! Every cycle works on one immutable tip: the ledger is refreshed when the
//! tip moves, eligible outputs are selected, their timestamp windows are
//! probed for a kernel and a found kernel is signed, re-checked against the
//! current tip and handed to the coinstake sink.

mod kernel;
mod modifier;
mod selector;
mod split;
mod stats;

pub use kernel::*;
pub use modifier::StakeModifierCache;
pub use selector::*;
pub use split::*;
pub use stats::*;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use pos_common::{
    config::MAX_FUTURE_BLOCK_TIME,
    crypto::{Address, Hash, Hashable},
    network::Network,
    time::{get_current_time_in_seconds, TimestampSeconds},
    tokio::{
        select, spawn_task,
        sync::{Mutex, RwLock},
        task::{self, JoinHandle},
        time::sleep,
    },
    transaction::OutPoint,
};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    chain::{ChainSource, CoinstakeSink, SubmitOutcome},
    config::{StakingConfig, MAX_STALE_RETRIES},
    delegation::DelegationManager,
    error::StakingError,
    keystore::Keystore,
    ledger::{ChainTip, LedgerSnapshot, LedgerView},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotStakingReason {
    Disabled,
    NotSynced,
    WalletLocked,
    NoEligibleOutputs,
    ReserveBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum StakingStatus {
    Active,
    Inactive(NotStakingReason),
}

impl StakingStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, StakingStatus::Active)
    }
}

// Result of one staking cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Inactive(NotStakingReason),
    NoKernel,
    Cancelled,
    // The tip kept moving while claiming
    Skipped,
    Staked {
        txid: Hash,
        height: u64,
        outcome: SubmitOutcome,
    },
}

// Runtime tunable part of the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingSettings {
    pub enabled: bool,
    pub split_threshold: StakeSplitThreshold,
    pub reserve_balance: u64,
    pub spend_unconfirmed_change: bool,
    pub filter: DelegatorFilter,
    pub poll_interval_ms: u64,
}

impl StakingSettings {
    pub fn from_config(config: &StakingConfig) -> Result<Self, StakingError> {
        Ok(Self {
            enabled: !config.disable_staking,
            split_threshold: StakeSplitThreshold::new(config.stake_split_threshold)?,
            reserve_balance: config.reserve_balance,
            spend_unconfirmed_change: config.spend_unconfirmed_change,
            filter: DelegatorFilter::new(&config.staking_whitelist, &config.staking_blacklist),
            poll_interval_ms: config.staking_poll_interval_ms,
        })
    }
}

#[derive(Default)]
struct ScanState {
    tip: Option<Hash>,
    // end of the last window probed on `tip`
    last_probed: Option<TimestampSeconds>,
    // kernels already submitted on `tip`
    claimed: HashSet<OutPoint>,
}

pub struct Staker {
    network: Network,
    chain: Arc<dyn ChainSource>,
    sink: Arc<dyn CoinstakeSink>,
    keystore: Arc<Keystore>,
    ledger: Arc<LedgerView>,
    delegations: Arc<DelegationManager>,
    modifiers: StakeModifierCache,
    stats: Arc<StakingStats>,
    settings: RwLock<StakingSettings>,
    status: RwLock<StakingStatus>,
    scan: Mutex<ScanState>,
    // cancellation flag of the running search
    cancel: Mutex<Arc<AtomicBool>>,
    stopping: AtomicBool,
    task: Mutex<Option<JoinHandle<Result<(), anyhow::Error>>>>,
}

impl Staker {
    pub fn new(
        settings: StakingSettings,
        chain: Arc<dyn ChainSource>,
        sink: Arc<dyn CoinstakeSink>,
        keystore: Arc<Keystore>,
        ledger: Arc<LedgerView>,
        delegations: Arc<DelegationManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            network: keystore.get_network(),
            chain,
            sink,
            keystore,
            ledger,
            delegations,
            modifiers: StakeModifierCache::default(),
            stats: Arc::new(StakingStats::new()),
            settings: RwLock::new(settings),
            status: RwLock::new(StakingStatus::Inactive(NotStakingReason::NotSynced)),
            scan: Mutex::new(ScanState::default()),
            cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            stopping: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), StakingError> {
        trace!("Starting staker");
        if self.is_running().await {
            return Err(StakingError::AlreadyRunning);
        }
        self.stopping.store(false, Ordering::SeqCst);

        let zelf = Arc::clone(self);
        *self.task.lock().await = Some(spawn_task("staker", async move {
            while !zelf.stopping.load(Ordering::SeqCst) {
                match zelf.run_cycle().await {
                    Ok(outcome) => {
                        if log::log_enabled!(log::Level::Trace) {
                            trace!("staking cycle: {:?}", outcome);
                        }
                    }
                    Err(e) if e.is_benign() => {
                        if log::log_enabled!(log::Level::Debug) {
                            debug!("Staking cycle ended: {}", e);
                        }
                    }
                    Err(e) => {
                        if log::log_enabled!(log::Level::Error) {
                            error!("Error while staking: {}", e);
                        }
                    }
                }

                let interval = zelf.settings.read().await.poll_interval_ms;
                sleep(Duration::from_millis(interval)).await;
            }

            Ok(())
        }));

        info!("Staker started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), StakingError> {
        trace!("Stopping staker");
        let handle = self
            .task
            .lock()
            .await
            .take()
            .ok_or(StakingError::NotRunning)?;

        self.stopping.store(true, Ordering::SeqCst);
        self.cancel_search().await;

        if handle.is_finished() {
            debug!("Staker is already finished");
            handle.await??;
        } else {
            debug!("Staker is running, stopping it");
            handle.abort();
        }

        info!("Staker stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        let task = self.task.lock().await;
        task.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn cancel_search(&self) {
        self.cancel.lock().await.store(true, Ordering::SeqCst);
    }

    /// Abort the running search and force a rescan on the next cycle.
    ///
    /// Called on anything changing the set of eligible outputs: lock state,
    /// new addresses, coin control, settings.
    pub async fn invalidate(&self) {
        self.cancel_search().await;
        *self.scan.lock().await = ScanState::default();
    }

    async fn set_status(&self, status: StakingStatus) {
        let mut current = self.status.write().await;
        if *current != status {
            if log::log_enabled!(log::Level::Info) {
                match status {
                    StakingStatus::Active => info!("Staking is active"),
                    StakingStatus::Inactive(reason) => info!("Not staking: {}", reason),
                }
            }
            *current = status;
        }
    }

    /// Run one staking cycle, retrying a claim when the tip moved under it.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, StakingError> {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            self.set_status(StakingStatus::Inactive(NotStakingReason::Disabled))
                .await;
            return Ok(CycleOutcome::Inactive(NotStakingReason::Disabled));
        }

        if !self.chain.is_synced().await? {
            self.set_status(StakingStatus::Inactive(NotStakingReason::NotSynced))
                .await;
            return Ok(CycleOutcome::Inactive(NotStakingReason::NotSynced));
        }

        let mut retries = 0;
        loop {
            match self.try_stake(&settings).await {
                Err(StakingError::StaleTipDuringClaim) => {
                    self.stats.record_stale();
                    retries += 1;
                    if retries >= MAX_STALE_RETRIES {
                        if log::log_enabled!(log::Level::Warn) {
                            warn!(
                                "Tip changed during {} consecutive claims, skipping this cycle",
                                retries
                            );
                        }
                        self.stats.record_skipped_cycle();
                        return Ok(CycleOutcome::Skipped);
                    }
                    debug!("Tip changed while claiming, rescanning");
                }
                Err(StakingError::NoKernelSolution) => return Ok(CycleOutcome::NoKernel),
                Err(StakingError::SearchCancelled) => return Ok(CycleOutcome::Cancelled),
                result => return result,
            }
        }
    }

    // Refresh the ledger view and delegations when the tip moved
    async fn refresh(&self, tip: &ChainTip) -> Result<Arc<LedgerSnapshot>, StakingError> {
        let mut scan = self.scan.lock().await;
        let current = self.ledger.current().await;
        if scan.tip == Some(tip.hash) && current.tip.hash == tip.hash {
            return Ok(current);
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!("New tip {} at height {}", tip.hash, tip.height);
        }

        let snapshot = self.chain.snapshot(tip).await?;
        let snapshot = self.ledger.replace(snapshot).await;
        self.delegations.sync(&snapshot).await?;
        *scan = ScanState {
            tip: Some(tip.hash),
            ..Default::default()
        };

        Ok(snapshot)
    }

    async fn try_stake(&self, settings: &StakingSettings) -> Result<CycleOutcome, StakingError> {
        let tip = self.chain.best_tip().await?;
        let snapshot = self.refresh(&tip).await?;

        let lock_state = self.keystore.lock_state().await;
        let keys = self.keystore.key_set().await;
        let mut excluded = self.delegations.voided_outputs().await;
        let modifier = self.modifiers.get_modifier(&*self.chain, &tip.hash).await?;
        let last_probed = {
            let scan = self.scan.lock().await;
            excluded.extend(scan.claimed.iter().copied());
            scan.last_probed
        };
        let min_age = self.network.stake_min_age();
        let policy = SelectionPolicy {
            min_depth: self.network.stake_min_depth(),
            min_age,
            reserve_balance: settings.reserve_balance,
            spend_unconfirmed_change: settings.spend_unconfirmed_change,
            filter: settings.filter.clone(),
        };

        let selection =
            select_candidates(&snapshot, lock_state, &keys, &policy, &excluded, modifier);
        if let Some(reason) = selection.reason {
            self.set_status(StakingStatus::Inactive(reason)).await;
            return Ok(CycleOutcome::Inactive(reason));
        }
        self.set_status(StakingStatus::Active).await;

        let cancel = Arc::new(AtomicBool::new(false));
        *self.cancel.lock().await = cancel.clone();

        let now = get_current_time_in_seconds();
        let hashes = Arc::new(AtomicU64::new(0));
        self.stats.record_search();

        let candidates = selection.candidates;
        let counter = hashes.clone();
        let flag = cancel.clone();
        let mut search = task::spawn_blocking(move || {
            let params = SearchParams {
                tip: &tip,
                min_age,
                last_probed,
                now,
            };
            search_kernel(&candidates, &params, &flag, &counter)
        });

        // a new block makes the running search worthless
        let result = select! {
            result = &mut search => result?,
            _ = self.watch_tip(&tip.hash, &cancel, settings.poll_interval_ms) => search.await?,
        };
        self.stats.record_hashes(hashes.load(Ordering::Relaxed));

        let solution = match result {
            Ok(solution) => solution,
            Err(StakingError::NoKernelSolution) => {
                let mut scan = self.scan.lock().await;
                if scan.tip == Some(tip.hash) {
                    scan.last_probed = Some(now.saturating_add(MAX_FUTURE_BLOCK_TIME));
                }
                return Err(StakingError::NoKernelSolution);
            }
            Err(e) => return Err(e),
        };
        self.stats.record_found();

        let reward = self.chain.stake_reward(tip.height + 1).await?;
        let tx = self
            .delegations
            .sign_kernel_claim(&solution, reward, settings.split_threshold)
            .await?;

        // The claim is only valid on top of the tip it was found on
        let current = self.chain.best_tip().await?;
        if current.hash != tip.hash {
            if log::log_enabled!(log::Level::Debug) {
                debug!(
                    "Discarding kernel {} found on {}, tip is now {}",
                    solution.kernel_hash, tip.hash, current.hash
                );
            }
            return Err(StakingError::StaleTipDuringClaim);
        }

        let txid = tx.hash();
        let kernel = solution.candidate.output.outpoint;
        let submitted = self.sink.submit_coinstake(tx, solution.proof(), &tip).await;
        {
            // whatever the outcome, this kernel is done on this tip
            let mut scan = self.scan.lock().await;
            if scan.tip == Some(tip.hash) {
                scan.claimed.insert(kernel);
                scan.last_probed = Some(solution.timestamp.saturating_sub(1));
            }
        }
        let outcome = submitted?;
        match &outcome {
            SubmitOutcome::Accepted => {
                self.stats.record_accepted();
                if log::log_enabled!(log::Level::Info) {
                    info!(
                        "Staked block {} with {} ({} coins), coinstake {}",
                        tip.height + 1,
                        solution.candidate.output.outpoint,
                        solution.candidate.output.amount,
                        txid
                    );
                }
            }
            SubmitOutcome::Orphaned => {
                self.stats.record_orphaned();
                if log::log_enabled!(log::Level::Info) {
                    info!("Coinstake {} was orphaned", txid);
                }
            }
            SubmitOutcome::Rejected(reason) => {
                self.stats.record_rejected();
                if log::log_enabled!(log::Level::Warn) {
                    warn!("Coinstake {} was rejected: {}", txid, reason);
                }
            }
        }

        Ok(CycleOutcome::Staked {
            txid,
            height: tip.height + 1,
            outcome,
        })
    }

    // Returns once the best tip is no longer `tip`, after raising `cancel`
    async fn watch_tip(&self, tip: &Hash, cancel: &AtomicBool, interval_ms: u64) {
        let interval = Duration::from_millis(interval_ms.max(1));
        loop {
            sleep(interval).await;
            if cancel.load(Ordering::SeqCst) {
                return;
            }

            match self.chain.best_tip().await {
                Ok(current) if current.hash != *tip => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!("Tip moved to {} during kernel search, cancelling", current.hash);
                    }
                    cancel.store(true, Ordering::SeqCst);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!("Error while watching the tip: {}", e);
                    }
                }
            }
        }
    }

    pub async fn get_status(&self) -> StakingStatus {
        *self.status.read().await
    }

    pub fn get_stats(&self) -> StakingStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn get_modifier_cache(&self) -> &StakeModifierCache {
        &self.modifiers
    }

    pub fn get_ledger(&self) -> &Arc<LedgerView> {
        &self.ledger
    }

    /// Lock an output against staking, rescanning when it changed anything.
    pub async fn lock_output(&self, outpoint: OutPoint) -> bool {
        let locked = self.ledger.lock_output(outpoint).await;
        if locked {
            self.invalidate().await;
        }
        locked
    }

    pub async fn unlock_output(&self, outpoint: &OutPoint) -> bool {
        let unlocked = self.ledger.unlock_output(outpoint).await;
        if unlocked {
            self.invalidate().await;
        }
        unlocked
    }

    pub async fn get_settings(&self) -> StakingSettings {
        self.settings.read().await.clone()
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.settings.write().await.enabled = enabled;
        self.invalidate().await;
    }

    pub async fn set_split_threshold(&self, value: u64) -> Result<(), StakingError> {
        let threshold = StakeSplitThreshold::new(value)?;
        self.settings.write().await.split_threshold = threshold;
        if log::log_enabled!(log::Level::Info) {
            info!("Stake split threshold set to {}", threshold);
        }
        Ok(())
    }

    pub async fn get_split_threshold(&self) -> StakeSplitThreshold {
        self.settings.read().await.split_threshold
    }

    pub async fn set_reserve_balance(&self, amount: u64) {
        self.settings.write().await.reserve_balance = amount;
        self.invalidate().await;
    }

    pub async fn set_spend_unconfirmed_change(&self, allow: bool) {
        self.settings.write().await.spend_unconfirmed_change = allow;
        self.invalidate().await;
    }

    fn parse_address(&self, address: &str) -> Result<Address, StakingError> {
        Ok(Address::from_string_for(address, self.network)?)
    }

    pub async fn add_to_whitelist(&self, owner: &str) -> Result<bool, StakingError> {
        let owner = self.parse_address(owner)?;
        let added = self
            .settings
            .write()
            .await
            .filter
            .add_to_whitelist(*owner.get_key_id());
        self.invalidate().await;
        Ok(added)
    }

    pub async fn remove_from_whitelist(&self, owner: &str) -> Result<bool, StakingError> {
        let owner = self.parse_address(owner)?;
        let removed = self
            .settings
            .write()
            .await
            .filter
            .remove_from_whitelist(owner.get_key_id());
        self.invalidate().await;
        Ok(removed)
    }

    pub async fn add_to_blacklist(&self, owner: &str) -> Result<bool, StakingError> {
        let owner = self.parse_address(owner)?;
        let added = self
            .settings
            .write()
            .await
            .filter
            .add_to_blacklist(*owner.get_key_id());
        self.invalidate().await;
        Ok(added)
    }

    pub async fn remove_from_blacklist(&self, owner: &str) -> Result<bool, StakingError> {
        let owner = self.parse_address(owner)?;
        let removed = self
            .settings
            .write()
            .await
            .filter
            .remove_from_blacklist(owner.get_key_id());
        self.invalidate().await;
        Ok(removed)
    }
}
