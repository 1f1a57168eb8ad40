use crate::crypto::Hash;
use primitive_types::{U256, U512};
use thiserror::Error;

// Compact representation of a stake target, as stored in block headers
// Layout: 1 byte exponent (size in bytes) followed by a 3 bytes mantissa
// The 0x00800000 bit is a sign bit and must never be set
pub type CompactBits = u32;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DifficultyError {
    #[error("Compact target {0:#010x} is negative")]
    NegativeTarget(CompactBits),
    #[error("Compact target {0:#010x} overflows 256 bits")]
    TargetOverflow(CompactBits),
    #[error("Target cannot be a value zero")]
    TargetCannotBeZero,
    #[error("Target {bits:#010x} is easier than the stake limit {limit:#010x}")]
    AboveStakeLimit {
        bits: CompactBits,
        limit: CompactBits,
    },
}

// Decode a compact target into its full 256 bits value
pub fn target_from_compact(bits: CompactBits) -> Result<U256, DifficultyError> {
    let size = bits >> 24;
    let mantissa = bits & MANTISSA_MASK;

    if mantissa != 0 && bits & SIGN_BIT != 0 {
        return Err(DifficultyError::NegativeTarget(bits));
    }

    if mantissa != 0
        && (size > 34 || (mantissa > 0xff && size > 33) || (mantissa > 0xffff && size > 32))
    {
        return Err(DifficultyError::TargetOverflow(bits));
    }

    let target = if size <= 3 {
        U256::from(mantissa >> (8 * (3 - size)))
    } else {
        U256::from(mantissa) << (8 * (size - 3) as usize)
    };

    if target.is_zero() {
        return Err(DifficultyError::TargetCannotBeZero);
    }

    Ok(target)
}

// Encode a target in its compact form
// Precision below the 3 most significant bytes is lost
pub fn compact_from_target(target: &U256) -> CompactBits {
    let mut size = (target.bits() as u32 + 7) / 8;
    let mut mantissa = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*target >> (8 * (size - 3) as usize)).low_u32()
    };

    // The mantissa must not look negative, shift it one byte
    if mantissa & SIGN_BIT != 0 {
        mantissa >>= 8;
        size += 1;
    }

    (size << 24) | mantissa
}

// Decode a compact target and ensure it is not easier than the given limit
pub fn target_within_limit(
    bits: CompactBits,
    limit: CompactBits,
) -> Result<U256, DifficultyError> {
    let target = target_from_compact(bits)?;
    let limit_target = target_from_compact(limit)?;
    if target > limit_target {
        return Err(DifficultyError::AboveStakeLimit { bits, limit });
    }
    Ok(target)
}

// Check a kernel hash against the target weighted by the staked amount
// The product is done on U512 so a large amount can never overflow
#[inline]
pub fn check_kernel_target(hash: &Hash, amount: u64, target: &U256) -> bool {
    let hash_value = U512::from(U256::from_big_endian(hash.as_bytes()));
    let weighted_target = target.full_mul(U256::from(amount));
    hash_value <= weighted_target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STAKE_LIMIT_BITS;

    #[test]
    fn test_known_compact_values() {
        // Bitcoin genesis target
        let target = target_from_compact(0x1d00ffff).unwrap();
        assert_eq!(target, U256::from(0xffffu64) << 208);
        assert_eq!(compact_from_target(&target), 0x1d00ffff);

        let target = target_from_compact(0x0300_1234).unwrap();
        assert_eq!(target, U256::from(0x1234u64));

        let target = target_from_compact(0x0112_0000).unwrap();
        assert_eq!(target, U256::from(0x12u64));
        assert_eq!(compact_from_target(&target), 0x0112_0000);
    }

    #[test]
    fn test_sign_bit_normalized() {
        // 0x80 as first mantissa byte would read as negative
        let target = U256::from(0x80u64);
        let bits = compact_from_target(&target);
        assert_eq!(bits, 0x0200_8000);
        assert_eq!(target_from_compact(bits).unwrap(), target);
    }

    #[test]
    fn test_invalid_compact_values() {
        assert_eq!(
            target_from_compact(0x0480_0001),
            Err(DifficultyError::NegativeTarget(0x0480_0001))
        );
        assert_eq!(
            target_from_compact(0xff12_3456),
            Err(DifficultyError::TargetOverflow(0xff12_3456))
        );
        assert_eq!(
            target_from_compact(0x0100_0000),
            Err(DifficultyError::TargetCannotBeZero)
        );
    }

    #[test]
    fn test_stake_limit() {
        assert!(target_within_limit(0x1d00ffff, STAKE_LIMIT_BITS).is_ok());
        assert!(matches!(
            target_within_limit(0x1f00ffff, STAKE_LIMIT_BITS),
            Err(DifficultyError::AboveStakeLimit { .. })
        ));
    }

    #[test]
    fn test_amount_weights_target() {
        let target = U256::from(1000u64);
        let hash = Hash::new({
            let mut bytes = [0u8; 32];
            // value 5000
            bytes[30] = 0x13;
            bytes[31] = 0x88;
            bytes
        });

        assert!(!check_kernel_target(&hash, 1, &target));
        assert!(!check_kernel_target(&hash, 4, &target));
        assert!(check_kernel_target(&hash, 5, &target));
        assert!(check_kernel_target(&hash, u64::MAX, &target));
        assert!(!check_kernel_target(&hash, 0, &target));
    }

    #[test]
    fn test_no_overflow_on_max_values() {
        assert!(check_kernel_target(&Hash::max(), u64::MAX, &U256::max_value()));
    }
}
