use crate::{static_assert, time::TimestampSeconds};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 8 decimals numbers
pub const COIN_DECIMALS: u8 = 8;
// 100 000 000 to represent 1 coin
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS as u32);
// 21M full coin
pub const MAXIMUM_SUPPLY: u64 = 21_000_000 * COIN_VALUE;

// Target block time in seconds
pub const BLOCK_TIME: TimestampSeconds = 60;

// ===== STAKING RULES =====

// Minimum confirmations before an output can be used as a stake kernel
pub const STAKE_MIN_DEPTH: u64 = 600;
// Minimum age (seconds between output creation and kernel time) on mainnet
pub const STAKE_MIN_AGE: TimestampSeconds = 60 * 60;
// How far in the future a coinstake timestamp may be compared to the local clock
// Peers reject blocks beyond this drift
pub const MAX_FUTURE_BLOCK_TIME: TimestampSeconds = 15;
// Kernel search granularity in seconds
pub const STAKE_TIMESTAMP_GRANULARITY: TimestampSeconds = 1;

// Minimum non-zero stake split threshold
pub const MIN_STAKE_SPLIT_THRESHOLD: u64 = COIN_VALUE;
// Maximum number of outputs a coinstake may be split into
pub const MAX_STAKE_SPLIT_OUTPUTS: usize = 30;

// Minimum amount accepted for a cold staking delegation
pub const MIN_COLD_STAKING_AMOUNT: u64 = COIN_VALUE;

// Reward paid by a coinstake on top of the kernel amount
pub const STAKE_REWARD: u64 = 2 * COIN_VALUE;

// Easiest target accepted for stake kernels, in compact form
pub const STAKE_LIMIT_BITS: u32 = 0x1e0f_ffff;

// Transaction version used by coinstakes
pub const COINSTAKE_TX_VERSION: u16 = 1;

// Key hash size used by pay-to-key-hash and cold staking scripts
pub const KEY_ID_SIZE: usize = 20;

// Addresses format
// mainnet prefix address
pub const PREFIX_ADDRESS: &str = "pos";
// testnet prefix address
pub const TESTNET_PREFIX_ADDRESS: &str = "tps";
// devnet prefix address
pub const DEVNET_PREFIX_ADDRESS: &str = "dps";

// Static checks
static_assert!(
    MIN_STAKE_SPLIT_THRESHOLD > 0,
    "Minimum stake split threshold must be strictly positive"
);
static_assert!(
    MAXIMUM_SUPPLY >= COIN_VALUE,
    "Maximum supply must be greater than or equal to coin value"
);
static_assert!(
    MAX_STAKE_SPLIT_OUTPUTS >= 1,
    "A coinstake must be allowed at least one output"
);
