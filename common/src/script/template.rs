use serde::{Deserialize, Serialize};

use super::{
    decode_small_int, small_int_op, Script, ScriptError, OP_CHECKCOLDSTAKEVERIFY,
    OP_CHECKMULTISIG, OP_CHECKSIG, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY, OP_HASH160, OP_IF,
    OP_PUSHBYTES_20, OP_PUSHBYTES_32, OP_ROT,
};
use crate::{
    config::KEY_ID_SIZE,
    crypto::{KeyId, PublicKey, PUBLIC_KEY_SIZE},
};

// Maximum number of keys in a bare multisig output
pub const MAX_MULTISIG_KEYS: usize = 16;

const P2PK_SIZE: usize = 2 + PUBLIC_KEY_SIZE;
const P2PKH_SIZE: usize = 5 + KEY_ID_SIZE;
// OP_DUP OP_HASH160 OP_ROT OP_IF OP_CHECKCOLDSTAKEVERIFY <staker> OP_ELSE <owner> OP_ENDIF OP_EQUALVERIFY OP_CHECKSIG
const COLD_STAKE_SIZE: usize = 11 + 2 * KEY_ID_SIZE;

/// Standard output templates, matched structurally on the script bytes.
///
/// Only these four shapes are understood by the staking engine, anything
/// else is reported as [`ScriptError::UnrecognizedScript`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptTemplate {
    // <pubkey> OP_CHECKSIG
    PayToPubKey(PublicKey),
    // OP_DUP OP_HASH160 <key id> OP_EQUALVERIFY OP_CHECKSIG
    PayToPubKeyHash(KeyId),
    // OP_m <pubkey>... OP_n OP_CHECKMULTISIG
    Multisig { required: u8, keys: Vec<PublicKey> },
    // Spendable by the owner, stakeable by the staker
    ColdStake { staker: KeyId, owner: KeyId },
}

impl ScriptTemplate {
    pub fn parse(script: &Script) -> Result<Self, ScriptError> {
        let bytes = script.as_bytes();

        if let Some(template) = Self::parse_p2pkh(bytes) {
            return Ok(template);
        }

        if let Some(template) = Self::parse_cold_stake(bytes) {
            return Ok(template);
        }

        if let Some(template) = Self::parse_p2pk(bytes) {
            return Ok(template);
        }

        Self::parse_multisig(bytes)
    }

    fn parse_p2pk(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != P2PK_SIZE
            || bytes[0] != OP_PUSHBYTES_32
            || bytes[P2PK_SIZE - 1] != OP_CHECKSIG
        {
            return None;
        }

        PublicKey::from_slice(&bytes[1..1 + PUBLIC_KEY_SIZE])
            .ok()
            .map(Self::PayToPubKey)
    }

    fn parse_p2pkh(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != P2PKH_SIZE
            || bytes[0] != OP_DUP
            || bytes[1] != OP_HASH160
            || bytes[2] != OP_PUSHBYTES_20
            || bytes[3 + KEY_ID_SIZE] != OP_EQUALVERIFY
            || bytes[4 + KEY_ID_SIZE] != OP_CHECKSIG
        {
            return None;
        }

        Some(Self::PayToPubKeyHash(read_key_id(&bytes[3..3 + KEY_ID_SIZE])))
    }

    fn parse_cold_stake(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != COLD_STAKE_SIZE {
            return None;
        }

        let staker_start = 6;
        let else_pos = staker_start + KEY_ID_SIZE;
        let owner_start = else_pos + 2;
        let tail = owner_start + KEY_ID_SIZE;

        let head_ok = bytes[..staker_start]
            == [
                OP_DUP,
                OP_HASH160,
                OP_ROT,
                OP_IF,
                OP_CHECKCOLDSTAKEVERIFY,
                OP_PUSHBYTES_20,
            ];
        let middle_ok = bytes[else_pos] == OP_ELSE && bytes[else_pos + 1] == OP_PUSHBYTES_20;
        let tail_ok = bytes[tail..] == [OP_ENDIF, OP_EQUALVERIFY, OP_CHECKSIG];
        if !(head_ok && middle_ok && tail_ok) {
            return None;
        }

        Some(Self::ColdStake {
            staker: read_key_id(&bytes[staker_start..else_pos]),
            owner: read_key_id(&bytes[owner_start..tail]),
        })
    }

    fn parse_multisig(bytes: &[u8]) -> Result<Self, ScriptError> {
        // smallest: OP_1 <key> OP_1 OP_CHECKMULTISIG
        if bytes.len() < 3 + 1 + PUBLIC_KEY_SIZE || bytes[bytes.len() - 1] != OP_CHECKMULTISIG {
            return Err(ScriptError::UnrecognizedScript);
        }

        let required = decode_small_int(bytes[0]).ok_or(ScriptError::UnrecognizedScript)?;
        let total = decode_small_int(bytes[bytes.len() - 2]).ok_or(ScriptError::UnrecognizedScript)?;

        let body = &bytes[1..bytes.len() - 2];
        let chunk = 1 + PUBLIC_KEY_SIZE;
        if body.len() % chunk != 0 || body.len() / chunk != total as usize {
            return Err(ScriptError::UnrecognizedScript);
        }

        let mut keys = Vec::with_capacity(total as usize);
        for push in body.chunks(chunk) {
            if push[0] != OP_PUSHBYTES_32 {
                return Err(ScriptError::UnrecognizedScript);
            }
            let key =
                PublicKey::from_slice(&push[1..]).map_err(|_| ScriptError::UnrecognizedScript)?;
            keys.push(key);
        }

        if required == 0 || required > total {
            return Err(ScriptError::InvalidMultisig {
                required: required as usize,
                total: total as usize,
            });
        }

        Ok(Self::Multisig { required, keys })
    }

    pub fn to_script(&self) -> Script {
        let mut bytes = Vec::new();
        match self {
            Self::PayToPubKey(key) => {
                bytes.push(OP_PUSHBYTES_32);
                bytes.extend_from_slice(key.as_bytes());
                bytes.push(OP_CHECKSIG);
            }
            Self::PayToPubKeyHash(key_id) => {
                bytes.extend_from_slice(&[OP_DUP, OP_HASH160, OP_PUSHBYTES_20]);
                bytes.extend_from_slice(key_id.as_bytes());
                bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
            }
            Self::Multisig { required, keys } => {
                bytes.push(small_int_op(*required));
                for key in keys {
                    bytes.push(OP_PUSHBYTES_32);
                    bytes.extend_from_slice(key.as_bytes());
                }
                bytes.push(small_int_op(keys.len() as u8));
                bytes.push(OP_CHECKMULTISIG);
            }
            Self::ColdStake { staker, owner } => {
                bytes.extend_from_slice(&[
                    OP_DUP,
                    OP_HASH160,
                    OP_ROT,
                    OP_IF,
                    OP_CHECKCOLDSTAKEVERIFY,
                    OP_PUSHBYTES_20,
                ]);
                bytes.extend_from_slice(staker.as_bytes());
                bytes.extend_from_slice(&[OP_ELSE, OP_PUSHBYTES_20]);
                bytes.extend_from_slice(owner.as_bytes());
                bytes.extend_from_slice(&[OP_ENDIF, OP_EQUALVERIFY, OP_CHECKSIG]);
            }
        }
        Script::new(bytes)
    }

    // Build a multisig template, validating m-of-n
    pub fn multisig(required: u8, keys: Vec<PublicKey>) -> Result<Self, ScriptError> {
        let total = keys.len();
        if required == 0 || required as usize > total || total > MAX_MULTISIG_KEYS {
            return Err(ScriptError::InvalidMultisig {
                required: required as usize,
                total,
            });
        }
        Ok(Self::Multisig { required, keys })
    }

    pub fn is_cold_stake(&self) -> bool {
        matches!(self, Self::ColdStake { .. })
    }
}

fn read_key_id(slice: &[u8]) -> KeyId {
    let mut id = [0u8; KEY_ID_SIZE];
    id.copy_from_slice(slice);
    KeyId::new(id)
}
