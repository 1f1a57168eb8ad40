use thiserror::Error;

use crate::{crypto::CryptoError, script::ScriptError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction is not a coinstake")]
    NotCoinstake,
    #[error("Coinstake must spend exactly one kernel input, got {0}")]
    InvalidInputCount(usize),
    #[error("Input index {0} is out of range")]
    InvalidInputIndex(usize),
    #[error("Input is not signed")]
    MissingWitness,
    #[error("Spend path is not allowed for this script")]
    WrongSpendPath,
    #[error("Witness key does not match the locking script")]
    KeyMismatch,
    #[error("Output {0} does not pay back to the kernel script")]
    OutputScriptMismatch(usize),
    #[error("Coinstake outputs {output} are below the kernel amount {input}")]
    ValueDecrease { input: u64, output: u64 },
    #[error("Output amounts overflow")]
    AmountOverflow,
    #[error("Kernel script cannot sign a coinstake")]
    UnsupportedKernelScript,
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("Invalid signature: {0}")]
    Signature(#[from] CryptoError),
}
