//! Ownership aware classification of locking scripts.

use std::collections::HashSet;

use pos_common::{
    crypto::KeyId,
    script::{Script, ScriptTemplate},
};
use serde::{Deserialize, Serialize};

use crate::error::StakingError;

// Ids of the keys a wallet controls
pub trait KeySet {
    fn has_key(&self, key_id: &KeyId) -> bool;
}

impl KeySet for HashSet<KeyId> {
    fn has_key(&self, key_id: &KeyId) -> bool {
        self.contains(key_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ScriptClass {
    // Pay to key or key hash, staked by the key itself
    Spendable { owner: KeyId },
    // Cold stake output whose staker key is in this wallet
    ColdStakeable { owner: KeyId, staker: KeyId },
    // Cold stake output staked by someone else
    DelegatedExternal { owner: KeyId, staker: KeyId },
    Multisig { required: u8, total: u8 },
}

// Which roles of a script this wallet can sign for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHolding {
    pub owner: bool,
    pub staker: bool,
}

impl ScriptClass {
    pub fn is_cold_stake(&self) -> bool {
        matches!(
            self,
            ScriptClass::ColdStakeable { .. } | ScriptClass::DelegatedExternal { .. }
        )
    }

    // Owner of the coins, None for multisig
    pub fn get_owner(&self) -> Option<&KeyId> {
        match self {
            ScriptClass::Spendable { owner }
            | ScriptClass::ColdStakeable { owner, .. }
            | ScriptClass::DelegatedExternal { owner, .. } => Some(owner),
            ScriptClass::Multisig { .. } => None,
        }
    }

    // Key that signs a kernel claim for this output
    pub fn get_staking_key(&self) -> Option<&KeyId> {
        match self {
            ScriptClass::Spendable { owner } => Some(owner),
            ScriptClass::ColdStakeable { staker, .. } => Some(staker),
            ScriptClass::DelegatedExternal { .. } | ScriptClass::Multisig { .. } => None,
        }
    }
}

/// Classify a script against the keys held by the wallet.
///
/// Fails with [`StakingError::UnrecognizedScript`] when the script matches
/// no known template. Such outputs still count as balance but never stake.
pub fn classify<K: KeySet + ?Sized>(
    script: &Script,
    keys: &K,
) -> Result<(ScriptClass, KeyHolding), StakingError> {
    let result = match script.template()? {
        ScriptTemplate::PayToPubKey(public_key) => {
            let owner = public_key.key_id();
            let held = keys.has_key(&owner);
            (
                ScriptClass::Spendable { owner },
                KeyHolding {
                    owner: held,
                    staker: held,
                },
            )
        }
        ScriptTemplate::PayToPubKeyHash(owner) => {
            let held = keys.has_key(&owner);
            (
                ScriptClass::Spendable { owner },
                KeyHolding {
                    owner: held,
                    staker: held,
                },
            )
        }
        ScriptTemplate::ColdStake { staker, owner } => {
            let holding = KeyHolding {
                owner: keys.has_key(&owner),
                staker: keys.has_key(&staker),
            };
            let class = if holding.staker {
                ScriptClass::ColdStakeable { owner, staker }
            } else {
                ScriptClass::DelegatedExternal { owner, staker }
            };
            (class, holding)
        }
        ScriptTemplate::Multisig { required, keys: public_keys } => {
            let held = public_keys
                .iter()
                .filter(|key| keys.has_key(&key.key_id()))
                .count();
            (
                ScriptClass::Multisig {
                    required,
                    total: public_keys.len() as u8,
                },
                KeyHolding {
                    owner: held >= required as usize,
                    staker: false,
                },
            )
        }
    };

    Ok(result)
}
