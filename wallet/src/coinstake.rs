use log::trace;
use pos_common::{
    config::COINSTAKE_TX_VERSION,
    transaction::{Transaction, TransactionError, TxInput, TxOutput},
};

use crate::{
    error::StakingError,
    staking::{split_stake_amount, KernelSolution, StakeSplitThreshold},
};

/// Build the unsigned coinstake claiming a kernel.
///
/// The kernel value plus the reward is split according to `threshold` and
/// every part pays back to the script of the kernel output, after the
/// leading marker output.
pub fn build_coinstake(
    solution: &KernelSolution,
    reward: u64,
    threshold: StakeSplitThreshold,
) -> Result<Transaction, StakingError> {
    let output = &solution.candidate.output;
    let total = output
        .amount
        .checked_add(reward)
        .ok_or(TransactionError::AmountOverflow)?;

    let mut outputs = vec![TxOutput::marker()];
    outputs.extend(
        split_stake_amount(total, threshold)
            .into_iter()
            .map(|amount| TxOutput::new(amount, output.script.clone())),
    );

    if log::log_enabled!(log::Level::Trace) {
        trace!(
            "coinstake for {} pays {} in {} outputs",
            output.outpoint,
            total,
            outputs.len() - 1
        );
    }

    Ok(Transaction::new(
        COINSTAKE_TX_VERSION,
        vec![TxInput::unsigned(output.outpoint)],
        outputs,
        0,
    ))
}
