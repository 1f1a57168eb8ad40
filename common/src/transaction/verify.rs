use log::trace;

use super::{SpendPath, Transaction, TransactionError, TxOutput};
use crate::script::ScriptTemplate;

/// Structural and signature checks of a coinstake against the output it spends.
///
/// The staker path of a cold staking script may only produce a coinstake
/// whose outputs all pay back to the exact same script, for a total not
/// below the kernel amount. The owner path and plain key scripts are only
/// required to keep the value.
pub fn verify_coinstake(tx: &Transaction, kernel_output: &TxOutput) -> Result<(), TransactionError> {
    if !tx.is_coinstake() {
        return Err(TransactionError::NotCoinstake);
    }

    let inputs = tx.get_inputs();
    if inputs.len() != 1 {
        return Err(TransactionError::InvalidInputCount(inputs.len()));
    }

    let witness = inputs[0]
        .witness
        .as_ref()
        .ok_or(TransactionError::MissingWitness)?;

    let template = ScriptTemplate::parse(&kernel_output.script)?;
    match (&template, witness.path) {
        (ScriptTemplate::PayToPubKey(key), SpendPath::Owner) => {
            if *key != witness.public_key {
                return Err(TransactionError::KeyMismatch);
            }
        }
        (ScriptTemplate::PayToPubKeyHash(key_id), SpendPath::Owner) => {
            if witness.public_key.key_id() != *key_id {
                return Err(TransactionError::KeyMismatch);
            }
        }
        (ScriptTemplate::ColdStake { owner, .. }, SpendPath::Owner) => {
            if witness.public_key.key_id() != *owner {
                return Err(TransactionError::KeyMismatch);
            }
        }
        (ScriptTemplate::ColdStake { staker, .. }, SpendPath::Staker) => {
            if witness.public_key.key_id() != *staker {
                return Err(TransactionError::KeyMismatch);
            }

            // every output after the marker must pay back to the delegated script
            for (index, output) in tx.get_outputs().iter().enumerate().skip(1) {
                if output.script != kernel_output.script {
                    return Err(TransactionError::OutputScriptMismatch(index));
                }
            }
        }
        (ScriptTemplate::Multisig { .. }, _) => {
            return Err(TransactionError::UnsupportedKernelScript);
        }
        _ => return Err(TransactionError::WrongSpendPath),
    }

    let output_total = tx
        .get_output_total()
        .ok_or(TransactionError::AmountOverflow)?;
    if output_total < kernel_output.amount {
        return Err(TransactionError::ValueDecrease {
            input: kernel_output.amount,
            output: output_total,
        });
    }

    let sighash = tx.get_signature_hash();
    witness
        .public_key
        .verify(sighash.as_bytes(), &witness.signature)?;

    if log::log_enabled!(log::Level::Trace) {
        trace!(
            "coinstake spending {} verified ({:?} path)",
            inputs[0].outpoint,
            witness.path
        );
    }

    Ok(())
}
