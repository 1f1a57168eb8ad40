use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, trace};
use pos_common::{
    config::MAX_FUTURE_BLOCK_TIME,
    crypto::Hash,
    difficulty::target_from_compact,
    kernel::{compute_kernel_hash, kernel_meets_target, KernelError, StakeProof},
    time::TimestampSeconds,
};
use primitive_types::U256;
use rayon::prelude::*;

use super::selector::KernelCandidate;
use crate::{config::MAX_KERNEL_SEARCH_WINDOW, error::StakingError, ledger::ChainTip};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSolution {
    pub candidate: KernelCandidate,
    pub timestamp: TimestampSeconds,
    pub kernel_hash: Hash,
}

impl KernelSolution {
    pub fn proof(&self) -> StakeProof {
        StakeProof {
            outpoint: self.candidate.output.outpoint,
            amount: self.candidate.output.amount,
            creation_time: self.candidate.output.creation_time,
            timestamp: self.timestamp,
            modifier: self.candidate.modifier,
        }
    }
}

/// Inputs of one kernel search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams<'a> {
    pub tip: &'a ChainTip,
    pub min_age: TimestampSeconds,
    // Last timestamp already probed on this tip
    pub last_probed: Option<TimestampSeconds>,
    pub now: TimestampSeconds,
}

// Inclusive range of timestamps worth probing for an output created at `creation_time`
pub fn search_window(
    params: &SearchParams,
    creation_time: TimestampSeconds,
) -> Option<(TimestampSeconds, TimestampSeconds)> {
    let mut start = params
        .tip
        .time
        .saturating_add(1)
        .max(creation_time.saturating_add(params.min_age))
        .max(params.now.saturating_sub(MAX_KERNEL_SEARCH_WINDOW));
    if let Some(last) = params.last_probed {
        start = start.max(last.saturating_add(1));
    }
    let end = params.now.saturating_add(MAX_FUTURE_BLOCK_TIME);

    (start <= end).then_some((start, end))
}

enum Probe {
    Found(TimestampSeconds, Hash),
    Exhausted,
    Cancelled,
}

fn probe_candidate(
    candidate: &KernelCandidate,
    params: &SearchParams,
    target: &U256,
    cancel: &AtomicBool,
    hashes: &AtomicU64,
) -> Probe {
    let Some((start, end)) = search_window(params, candidate.output.creation_time) else {
        return Probe::Exhausted;
    };

    let output = &candidate.output;
    let mut count = 0u64;
    let mut result = Probe::Exhausted;
    for timestamp in start..=end {
        if cancel.load(Ordering::Relaxed) {
            result = Probe::Cancelled;
            break;
        }

        count += 1;
        let hash = compute_kernel_hash(
            candidate.modifier,
            output.creation_time,
            &output.outpoint,
            timestamp,
        );
        if kernel_meets_target(&hash, output.amount, target) {
            result = Probe::Found(timestamp, hash);
            break;
        }
    }

    hashes.fetch_add(count, Ordering::Relaxed);
    result
}

/// Probe the timestamp window of every candidate for a winning kernel.
///
/// Candidates are scanned in parallel. The winner is the earliest timestamp,
/// ties resolved by the candidate order. Setting `cancel` aborts the search
/// before the next probe.
pub fn search_kernel(
    candidates: &[KernelCandidate],
    params: &SearchParams,
    cancel: &AtomicBool,
    hashes: &AtomicU64,
) -> Result<KernelSolution, StakingError> {
    let target = target_from_compact(params.tip.bits).map_err(KernelError::from)?;

    let results: Vec<(usize, Probe)> = candidates
        .par_iter()
        .enumerate()
        .map(|(i, candidate)| (i, probe_candidate(candidate, params, &target, cancel, hashes)))
        .collect();

    if cancel.load(Ordering::Relaxed) {
        debug!("Kernel search cancelled");
        return Err(StakingError::SearchCancelled);
    }

    let winner = results
        .into_iter()
        .filter_map(|(i, probe)| match probe {
            Probe::Found(timestamp, hash) => Some((timestamp, i, hash)),
            Probe::Exhausted | Probe::Cancelled => None,
        })
        .min_by_key(|(timestamp, i, _)| (*timestamp, *i));

    match winner {
        Some((timestamp, i, kernel_hash)) => {
            let candidate = candidates[i].clone();
            if log::log_enabled!(log::Level::Debug) {
                debug!(
                    "Found kernel {} at {} with {} ({} coins)",
                    kernel_hash, timestamp, candidate.output.outpoint, candidate.output.amount
                );
            }
            Ok(KernelSolution {
                candidate,
                timestamp,
                kernel_hash,
            })
        }
        None => {
            trace!("No kernel in window for {} candidates", candidates.len());
            Err(StakingError::NoKernelSolution)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classifier::ScriptClass, ledger::UnspentOutput};
    use pos_common::{
        config::COIN_VALUE,
        crypto::{hash, KeyPair},
        kernel::check_stake_kernel,
        script::ScriptTemplate,
        transaction::OutPoint,
    };

    // Easy target so that nearly every probe wins
    const EASY_BITS: u32 = 0x2100ffff;

    fn candidate(index: u32, amount: u64) -> KernelCandidate {
        let keypair = KeyPair::new();
        KernelCandidate {
            output: UnspentOutput {
                outpoint: OutPoint::new(hash(b"kernel"), index),
                amount,
                script: ScriptTemplate::PayToPubKeyHash(keypair.key_id()).to_script(),
                confirmations: 10,
                creation_height: 1,
                creation_time: 100,
                from_me: false,
            },
            class: ScriptClass::Spendable {
                owner: keypair.key_id(),
            },
            modifier: 7,
        }
    }

    fn tip(bits: u32) -> ChainTip {
        ChainTip {
            height: 10,
            hash: hash(b"tip"),
            time: 1_000,
            bits,
        }
    }

    #[test]
    fn test_window_bounds() {
        let tip = tip(EASY_BITS);
        let params = SearchParams {
            tip: &tip,
            min_age: 0,
            last_probed: None,
            now: 1_010,
        };
        assert_eq!(search_window(&params, 100), Some((1_001, 1_025)));
        // too young until after the window
        assert_eq!(search_window(&params, 1_000 + 26), None);

        let params = SearchParams {
            last_probed: Some(1_020),
            ..params
        };
        assert_eq!(search_window(&params, 100), Some((1_021, 1_025)));

        let params = SearchParams {
            now: 10_000,
            last_probed: None,
            ..params
        };
        assert_eq!(
            search_window(&params, 100),
            Some((10_000 - MAX_KERNEL_SEARCH_WINDOW, 10_000 + MAX_FUTURE_BLOCK_TIME))
        );
    }

    #[test]
    fn test_earliest_solution_and_validation() {
        let tip = tip(EASY_BITS);
        let params = SearchParams {
            tip: &tip,
            min_age: 0,
            last_probed: None,
            now: 1_010,
        };
        let candidates = vec![candidate(0, 100 * COIN_VALUE), candidate(1, 50 * COIN_VALUE)];
        let cancel = AtomicBool::new(false);
        let hashes = AtomicU64::new(0);

        let solution = search_kernel(&candidates, &params, &cancel, &hashes).unwrap();
        assert_eq!(solution.timestamp, 1_001);
        assert_eq!(solution.candidate.output.outpoint.index, 0);
        assert!(hashes.load(Ordering::Relaxed) >= 1);

        let proof = solution.proof();
        assert_eq!(
            check_stake_kernel(&proof, tip.time, tip.bits, 0, 1_010),
            Ok(solution.kernel_hash)
        );

        // identical inputs, identical kernel
        let again = search_kernel(&candidates, &params, &cancel, &hashes).unwrap();
        assert_eq!(again, solution);
    }

    #[test]
    fn test_no_solution_and_cancel() {
        // target of 1 cannot be met by any realistic hash
        let tip = tip(0x01010000);
        let params = SearchParams {
            tip: &tip,
            min_age: 0,
            last_probed: None,
            now: 1_010,
        };
        let candidates = vec![candidate(0, 1)];
        let hashes = AtomicU64::new(0);

        assert!(matches!(
            search_kernel(&candidates, &params, &AtomicBool::new(false), &hashes),
            Err(StakingError::NoKernelSolution)
        ));
        assert_eq!(hashes.load(Ordering::Relaxed), 25);

        assert!(matches!(
            search_kernel(&candidates, &params, &AtomicBool::new(true), &hashes),
            Err(StakingError::SearchCancelled)
        ));
    }
}
