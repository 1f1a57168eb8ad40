//! Stake eligibility: which outputs may be used as a kernel at a given tip.

use std::collections::HashSet;

use log::trace;
use pos_common::{
    crypto::{Address, KeyId},
    kernel::StakeModifier,
    time::TimestampSeconds,
    transaction::OutPoint,
};
use serde::{Deserialize, Serialize};

use super::NotStakingReason;
use crate::{
    classifier::{classify, KeySet, ScriptClass},
    keystore::LockState,
    ledger::{LedgerSnapshot, UnspentOutput},
};

/// Whitelist and blacklist of delegators, by owner key.
///
/// Only applies to cold stake outputs owned by someone else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorFilter {
    whitelist: HashSet<KeyId>,
    blacklist: HashSet<KeyId>,
}

impl DelegatorFilter {
    pub fn new(whitelist: &[Address], blacklist: &[Address]) -> Self {
        Self {
            whitelist: whitelist.iter().map(|a| *a.get_key_id()).collect(),
            blacklist: blacklist.iter().map(|a| *a.get_key_id()).collect(),
        }
    }

    pub fn allows(&self, owner: &KeyId) -> bool {
        if self.blacklist.contains(owner) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.contains(owner)
    }

    pub fn add_to_whitelist(&mut self, owner: KeyId) -> bool {
        self.whitelist.insert(owner)
    }

    pub fn remove_from_whitelist(&mut self, owner: &KeyId) -> bool {
        self.whitelist.remove(owner)
    }

    pub fn add_to_blacklist(&mut self, owner: KeyId) -> bool {
        self.blacklist.insert(owner)
    }

    pub fn remove_from_blacklist(&mut self, owner: &KeyId) -> bool {
        self.blacklist.remove(owner)
    }

    pub fn get_whitelist(&self) -> &HashSet<KeyId> {
        &self.whitelist
    }

    pub fn get_blacklist(&self) -> &HashSet<KeyId> {
        &self.blacklist
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub min_depth: u64,
    pub min_age: TimestampSeconds,
    pub reserve_balance: u64,
    pub spend_unconfirmed_change: bool,
    pub filter: DelegatorFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelCandidate {
    pub output: UnspentOutput,
    pub class: ScriptClass,
    // modifier of the tip the candidate was selected at
    pub modifier: StakeModifier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub candidates: Vec<KernelCandidate>,
    // Why the set is empty, when it is
    pub reason: Option<NotStakingReason>,
}

impl Selection {
    fn empty(reason: NotStakingReason) -> Self {
        Self {
            candidates: Vec::new(),
            reason: Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn total_amount(&self) -> u64 {
        self.candidates
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.output.amount))
    }
}

fn is_eligible<K: KeySet + ?Sized>(
    output: &UnspentOutput,
    snapshot: &LedgerSnapshot,
    keys: &K,
    policy: &SelectionPolicy,
    excluded: &HashSet<OutPoint>,
) -> Option<ScriptClass> {
    if output.amount == 0
        || output.confirmations < policy.min_depth
        || snapshot.is_locked(&output.outpoint)
        || excluded.contains(&output.outpoint)
    {
        return None;
    }

    if output.creation_time.saturating_add(policy.min_age) > snapshot.tip.time {
        return None;
    }

    let (class, holding) = classify(&output.script, keys).ok()?;
    match class {
        ScriptClass::Spendable { .. } if holding.staker => Some(class),
        ScriptClass::ColdStakeable { owner, .. } => {
            if !holding.owner && !policy.filter.allows(&owner) {
                return None;
            }
            Some(class)
        }
        _ => None,
    }
}

/// Build the ordered set of kernel candidates for a snapshot.
///
/// Largest amounts come first, ties ordered by outpoint. The result only
/// depends on its inputs so calling it twice on the same snapshot gives the
/// same set. `excluded` holds outputs that must never stake again, like
/// voided delegations.
pub fn select_candidates<K: KeySet + ?Sized>(
    snapshot: &LedgerSnapshot,
    lock_state: LockState,
    keys: &K,
    policy: &SelectionPolicy,
    excluded: &HashSet<OutPoint>,
    modifier: StakeModifier,
) -> Selection {
    if !lock_state.can_stake() {
        return Selection::empty(NotStakingReason::WalletLocked);
    }

    if snapshot.trusted_balance(policy.spend_unconfirmed_change) <= policy.reserve_balance {
        return Selection::empty(NotStakingReason::ReserveBalance);
    }

    let mut seen = HashSet::new();
    let mut candidates: Vec<KernelCandidate> = snapshot
        .outputs
        .iter()
        .filter(|output| seen.insert(output.outpoint))
        .filter_map(|output| {
            is_eligible(output, snapshot, keys, policy, excluded).map(|class| KernelCandidate {
                output: output.clone(),
                class,
                modifier,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.output
            .amount
            .cmp(&a.output.amount)
            .then_with(|| a.output.outpoint.cmp(&b.output.outpoint))
    });

    if log::log_enabled!(log::Level::Trace) {
        trace!(
            "{} of {} outputs eligible for staking at height {}",
            candidates.len(),
            snapshot.outputs.len(),
            snapshot.tip.height
        );
    }

    if candidates.is_empty() {
        return Selection::empty(NotStakingReason::NoEligibleOutputs);
    }

    Selection {
        candidates,
        reason: None,
    }
}
