use pos_common::{
    crypto::{CryptoError, KeyId},
    kernel::KernelError,
    script::ScriptError,
    tokio::task::JoinError,
    transaction::{OutPoint, TransactionError},
};
use thiserror::Error;

use crate::cipher::CipherError;

#[derive(Error, Debug)]
pub enum StakingError {
    #[error("Wallet is locked")]
    WalletLocked,
    #[error("Script matches no stakeable template")]
    UnrecognizedScript,
    #[error("No kernel found in the search window")]
    NoKernelSolution,
    #[error("Kernel search was cancelled")]
    SearchCancelled,
    #[error("Chain tip changed while claiming the kernel")]
    StaleTipDuringClaim,
    #[error("Invalid staker address: {0}")]
    InvalidStakerAddress(String),
    #[error("Staker key is not available in this wallet")]
    MissingStakerKey,
    #[error("Script class does not match the kernel script")]
    ScriptClassMismatch,
    #[error("Delegation has been voided")]
    DelegationAlreadyVoided,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Invalid stake split threshold {0}")]
    InvalidSplitThreshold(u64),
    #[error("Amount {amount} is below the minimum of {minimum}")]
    AmountTooLow { amount: u64, minimum: u64 },
    #[error("Key {0} is not in this wallet")]
    UnknownKey(KeyId),
    #[error("Unknown output {0}")]
    UnknownOutput(OutPoint),
    #[error("Staker is already running")]
    AlreadyRunning,
    #[error("Staker is not running")]
    NotRunning,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Task(#[from] JoinError),
    #[error("Keystore error: {0}")]
    Keystore(CipherError),
    #[error(transparent)]
    Chain(#[from] anyhow::Error),
}

impl From<ScriptError> for StakingError {
    fn from(_: ScriptError) -> Self {
        StakingError::UnrecognizedScript
    }
}

impl From<CipherError> for StakingError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::InvalidPassword => StakingError::InvalidPassword,
            err => StakingError::Keystore(err),
        }
    }
}

impl StakingError {
    // Outcomes of a normal staking cycle, logged at debug level only
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            StakingError::NoKernelSolution
                | StakingError::SearchCancelled
                | StakingError::StaleTipDuringClaim
        )
    }
}
