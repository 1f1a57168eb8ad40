//! Stake kernel hashing and validation.
//!
//! A kernel is the output used as proof of stake. Its hash commits to the
//! stake modifier of the chain, the output identity and creation time, and
//! the candidate block timestamp. A kernel wins when the hash is below the
//! target weighted by the output amount.

use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::MAX_FUTURE_BLOCK_TIME,
    crypto::{hash_with_domain, Hash},
    difficulty::{check_kernel_target, target_from_compact, CompactBits, DifficultyError},
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampSeconds,
    transaction::OutPoint,
};

const KERNEL_DOMAIN: &[u8] = b"POS-KERNEL-v1";
const STAKE_MODIFIER_DOMAIN: &[u8] = b"POS-STAKE-MODIFIER-v1";

// 64 bits of chain entropy mixed into every kernel hash
pub type StakeModifier = u64;

// Modifier of the genesis block
pub const GENESIS_STAKE_MODIFIER: StakeModifier = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Kernel amount cannot be zero")]
    ZeroAmount,
    #[error("Timestamp {timestamp} is not after the previous block {previous}")]
    TimestampNotAfterTip {
        timestamp: TimestampSeconds,
        previous: TimestampSeconds,
    },
    #[error("Kernel output is too young: created at {creation_time}, min age {min_age}s, timestamp {timestamp}")]
    TooYoung {
        creation_time: TimestampSeconds,
        min_age: TimestampSeconds,
        timestamp: TimestampSeconds,
    },
    #[error("Timestamp {timestamp} is too far in the future (now {now})")]
    TooFarInFuture {
        timestamp: TimestampSeconds,
        now: TimestampSeconds,
    },
    #[error("Kernel hash {0} does not meet the target")]
    TargetNotMet(Hash),
    #[error(transparent)]
    Difficulty(#[from] DifficultyError),
}

// Derive the modifier of a block from its parent modifier and the block entropy
pub fn compute_stake_modifier(parent: StakeModifier, entropy: &Hash) -> StakeModifier {
    let digest = hash_with_domain(
        STAKE_MODIFIER_DOMAIN,
        &[&parent.to_be_bytes(), entropy.as_bytes()],
    );
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(bytes)
}

// Kernel hash for a candidate timestamp
// All integers are written big endian, like the serializer
#[inline]
pub fn compute_kernel_hash(
    modifier: StakeModifier,
    creation_time: TimestampSeconds,
    outpoint: &OutPoint,
    timestamp: TimestampSeconds,
) -> Hash {
    hash_with_domain(
        KERNEL_DOMAIN,
        &[
            &modifier.to_be_bytes(),
            &creation_time.to_be_bytes(),
            outpoint.txid.as_bytes(),
            &outpoint.index.to_be_bytes(),
            &timestamp.to_be_bytes(),
        ],
    )
}

/// Everything a validating node needs to recompute a kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeProof {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub creation_time: TimestampSeconds,
    pub timestamp: TimestampSeconds,
    pub modifier: StakeModifier,
}

impl StakeProof {
    pub fn kernel_hash(&self) -> Hash {
        compute_kernel_hash(
            self.modifier,
            self.creation_time,
            &self.outpoint,
            self.timestamp,
        )
    }
}

impl Serializer for StakeProof {
    fn write(&self, writer: &mut Writer) {
        self.outpoint.write(writer);
        writer.write_u64(self.amount);
        writer.write_u64(self.creation_time);
        writer.write_u64(self.timestamp);
        writer.write_u64(self.modifier);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            outpoint: OutPoint::read(reader)?,
            amount: reader.read_u64()?,
            creation_time: reader.read_u64()?,
            timestamp: reader.read_u64()?,
            modifier: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        self.outpoint.size() + 8 * 4
    }
}

// Timestamp rules shared by the local search and by validation
pub fn check_kernel_timestamp(
    creation_time: TimestampSeconds,
    timestamp: TimestampSeconds,
    previous_time: TimestampSeconds,
    min_age: TimestampSeconds,
    now: TimestampSeconds,
) -> Result<(), KernelError> {
    if timestamp <= previous_time {
        return Err(KernelError::TimestampNotAfterTip {
            timestamp,
            previous: previous_time,
        });
    }

    if creation_time.saturating_add(min_age) > timestamp {
        return Err(KernelError::TooYoung {
            creation_time,
            min_age,
            timestamp,
        });
    }

    if timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
        return Err(KernelError::TooFarInFuture { timestamp, now });
    }

    Ok(())
}

// Does a kernel hash win for this amount against an already decoded target
#[inline]
pub fn kernel_meets_target(hash: &Hash, amount: u64, target: &U256) -> bool {
    amount > 0 && check_kernel_target(hash, amount, target)
}

/// Full validation of a stake proof on top of the previous block.
///
/// Returns the kernel hash when the proof is valid.
pub fn check_stake_kernel(
    proof: &StakeProof,
    previous_time: TimestampSeconds,
    bits: CompactBits,
    min_age: TimestampSeconds,
    now: TimestampSeconds,
) -> Result<Hash, KernelError> {
    if proof.amount == 0 {
        return Err(KernelError::ZeroAmount);
    }

    check_kernel_timestamp(
        proof.creation_time,
        proof.timestamp,
        previous_time,
        min_age,
        now,
    )?;

    let target = target_from_compact(bits)?;
    let hash = proof.kernel_hash();
    if !check_kernel_target(&hash, proof.amount, &target) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("kernel {} for {} rejected: {}", hash, proof.outpoint, bits);
        }
        return Err(KernelError::TargetNotMet(hash));
    }

    Ok(hash)
}
