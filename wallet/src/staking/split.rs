use std::fmt;

use pos_common::{
    config::{MAX_STAKE_SPLIT_OUTPUTS, MIN_STAKE_SPLIT_THRESHOLD},
    utils::format_coin,
};
use serde::{Deserialize, Serialize};

use crate::error::StakingError;

/// Target size of the outputs created by a coinstake.
///
/// Zero disables splitting, any other value must be at least
/// [`MIN_STAKE_SPLIT_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct StakeSplitThreshold(u64);

impl StakeSplitThreshold {
    pub fn new(value: u64) -> Result<Self, StakingError> {
        if value != 0 && value < MIN_STAKE_SPLIT_THRESHOLD {
            return Err(StakingError::InvalidSplitThreshold(value));
        }
        Ok(Self(value))
    }

    pub const fn disabled() -> Self {
        Self(0)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn is_disabled(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u64> for StakeSplitThreshold {
    type Error = StakingError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StakeSplitThreshold> for u64 {
    fn from(value: StakeSplitThreshold) -> Self {
        value.0
    }
}

impl fmt::Display for StakeSplitThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            write!(f, "disabled")
        } else {
            write!(f, "{}", format_coin(self.0))
        }
    }
}

/// Split a coinstake value into near-equal parts of at least `threshold`.
///
/// The sum of the parts always equals `amount`. The remainder of the
/// division goes one unit at a time to the first parts.
pub fn split_stake_amount(amount: u64, threshold: StakeSplitThreshold) -> Vec<u64> {
    let threshold = threshold.get();
    if threshold == 0 || amount <= threshold {
        return vec![amount];
    }

    let count = (amount / threshold).clamp(1, MAX_STAKE_SPLIT_OUTPUTS as u64);
    let base = amount / count;
    let remainder = amount % count;

    (0..count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}
