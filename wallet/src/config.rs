use argon2::{Algorithm, Argon2, Params, Version};
use clap::Parser;
use lazy_static::lazy_static;
use pos_common::{
    config::{COIN_VALUE, VERSION},
    crypto::Address,
    logger::{default_logs_datetime_format, LogLevel, LoggerConfig, ModuleConfig},
    network::Network,
};
use serde::{Deserialize, Serialize};

use crate::simulator::Scenario;

pub const PASSWORD_HASH_SIZE: usize = 32;
pub const SALT_SIZE: usize = 32;
pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

// Interval between two staking cycles
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
// How many times a claim is retried on a moving tip before the cycle is skipped
pub const MAX_STALE_RETRIES: u32 = 3;
// Blocks kept in the stake modifier cache
pub const STAKE_MODIFIER_CACHE_SIZE: usize = 1024;
// Oldest timestamp probed, relative to the local clock
// Without it a stale tip would make the search window unbounded
pub const MAX_KERNEL_SEARCH_WINDOW: u64 = 600;
// Default value above which coinstake outputs are split
pub const DEFAULT_STAKE_SPLIT_THRESHOLD: u64 = 2000 * COIN_VALUE;

lazy_static! {
    pub static ref PASSWORD_ALGORITHM: Argon2<'static> = {
        // 15 MB, 16 iterations
        let params = Params::new(15 * 1000, 16, 1, Some(PASSWORD_HASH_SIZE)).unwrap_or_default();
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    };

    // Devnet keystores are throwaway, keep unlocking instant
    pub static ref DEVNET_PASSWORD_ALGORITHM: Argon2<'static> = {
        let params = Params::new(64, 1, 1, Some(PASSWORD_HASH_SIZE)).unwrap_or_default();
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    };
}

// Key derivation used to encrypt keystores of this network
pub fn password_algorithm(network: Network) -> &'static Argon2<'static> {
    match network {
        Network::Devnet => &DEVNET_PASSWORD_ALGORITHM,
        Network::Mainnet | Network::Testnet => &PASSWORD_ALGORITHM,
    }
}

// Functions Helpers
fn default_log_filename() -> String {
    String::from("pos-wallet.log")
}

fn default_logs_path() -> String {
    String::from("logs/")
}

fn default_stake_split_threshold() -> u64 {
    DEFAULT_STAKE_SPLIT_THRESHOLD
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_blocks() -> u64 {
    10
}

fn default_funding_outputs() -> usize {
    4
}

fn default_funding_amount() -> u64 {
    1000 * COIN_VALUE
}

fn default_devnet_bits() -> u32 {
    // a block every few seconds with the default funding
    0x1c00_ffff
}

fn default_network() -> Network {
    Network::Devnet
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Disable the staking loop
    #[clap(long)]
    #[serde(default)]
    pub disable_staking: bool,
    /// Coinstake outputs above this value (atomic units) are split in several outputs
    /// 0 disables splitting, otherwise it must be at least 1 coin
    #[clap(long, default_value_t = default_stake_split_threshold())]
    #[serde(default = "default_stake_split_threshold")]
    pub stake_split_threshold: u64,
    /// Count unconfirmed change sent to ourselves in the staking balance
    #[clap(long)]
    #[serde(default)]
    pub spend_unconfirmed_change: bool,
    /// Seconds a staking-only unlock stays valid, 0 keeps it until locked
    #[clap(long, default_value_t = 0)]
    #[serde(default)]
    pub staking_unlock_duration: u64,
    /// Amount (atomic units) kept out of staking
    #[clap(long, default_value_t = 0)]
    #[serde(default)]
    pub reserve_balance: u64,
    /// Allow delegating to a staker address owned by this wallet
    #[clap(long)]
    #[serde(default)]
    pub allow_self_delegation: bool,
    /// Only stake cold outputs delegated by these owner addresses
    #[clap(long)]
    #[serde(default)]
    pub staking_whitelist: Vec<Address>,
    /// Never stake cold outputs delegated by these owner addresses
    #[clap(long)]
    #[serde(default)]
    pub staking_blacklist: Vec<Address>,
    /// Milliseconds between two staking cycles
    #[clap(long, default_value_t = default_poll_interval_ms())]
    #[serde(default = "default_poll_interval_ms")]
    pub staking_poll_interval_ms: u64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            disable_staking: false,
            stake_split_threshold: DEFAULT_STAKE_SPLIT_THRESHOLD,
            spend_unconfirmed_change: false,
            staking_unlock_duration: 0,
            reserve_balance: 0,
            allow_self_delegation: false,
            staking_whitelist: Vec::new(),
            staking_blacklist: Vec::new(),
            staking_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct LogConfig {
    /// Set log level
    #[clap(long, value_enum, default_value_t)]
    #[serde(default)]
    pub log_level: LogLevel,
    /// Set file log level
    /// By default, it will be the same as log level
    #[clap(long, value_enum)]
    pub file_log_level: Option<LogLevel>,
    /// Disable the log file
    #[clap(long)]
    #[serde(default)]
    pub disable_file_logging: bool,
    /// Disable the log filename date based
    /// If disabled, the log file will be named pos-wallet.log instead of YYYY-MM-DD.pos-wallet.log
    #[clap(long)]
    #[serde(default)]
    pub disable_file_log_date_based: bool,
    /// Disable the usage of colors in log
    #[clap(long)]
    #[serde(default)]
    pub disable_log_color: bool,
    /// Log filename
    ///
    /// By default filename is pos-wallet.log.
    /// File will be stored in logs directory, this is only the filename, not the full path.
    #[clap(long, default_value_t = default_log_filename())]
    #[serde(default = "default_log_filename")]
    pub filename_log: String,
    /// Logs directory
    ///
    /// By default it will be logs/ of the current directory.
    /// It must end with a / to be a valid folder.
    #[clap(long, default_value_t = default_logs_path())]
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    /// Module configuration for logs, as module=level
    #[clap(long)]
    #[serde(default)]
    pub logs_modules: Vec<ModuleConfig>,
    /// Change the datetime format used by the logger
    #[clap(long, default_value_t = default_logs_datetime_format())]
    #[serde(default = "default_logs_datetime_format")]
    pub datetime_format: String,
}

impl From<&LogConfig> for LoggerConfig {
    fn from(config: &LogConfig) -> Self {
        LoggerConfig {
            level: config.log_level,
            file_level: config.file_log_level,
            disable_file_logging: config.disable_file_logging,
            disable_file_log_date_based: config.disable_file_log_date_based,
            disable_log_color: config.disable_log_color,
            filename_log: config.filename_log.clone(),
            logs_path: config.logs_path.clone(),
            modules: config.logs_modules.clone(),
            datetime_format: config.datetime_format.clone(),
        }
    }
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Which outputs the devnet wallet starts with
    #[clap(long, default_value_t = Scenario::Mixed)]
    #[serde(default)]
    pub scenario: Scenario,
    /// Stop after this many staked blocks, 0 runs until interrupted
    #[clap(long, default_value_t = default_blocks())]
    #[serde(default = "default_blocks")]
    pub blocks: u64,
    /// Number of outputs funded at startup
    #[clap(long, default_value_t = default_funding_outputs())]
    #[serde(default = "default_funding_outputs")]
    pub funding_outputs: usize,
    /// Amount (atomic units) of every funded output
    #[clap(long, default_value_t = default_funding_amount())]
    #[serde(default = "default_funding_amount")]
    pub funding_amount: u64,
    /// Compact stake target of the devnet chain
    #[clap(long, default_value_t = default_devnet_bits())]
    #[serde(default = "default_devnet_bits")]
    pub devnet_bits: u32,
}

#[derive(Parser, Serialize, Deserialize, Clone)]
#[clap(
    version = VERSION,
    about = "Proof-of-stake wallet staking engine running against an in-memory devnet"
)]
#[command(styles = pos_common::get_cli_styles())]
pub struct Config {
    /// Log configuration
    #[clap(flatten)]
    pub log: LogConfig,
    /// Staking configuration
    #[clap(flatten)]
    pub staking: StakingConfig,
    /// Simulator configuration
    #[clap(flatten)]
    pub simulator: SimulatorConfig,
    /// Network selected for chain
    #[clap(long, value_enum, default_value_t = default_network())]
    #[serde(default = "default_network")]
    pub network: Network,
    /// Password used to encrypt the keystore
    #[clap(long)]
    pub password: Option<String>,
    /// JSON File to load the configuration from
    #[clap(long)]
    #[serde(skip)]
    #[serde(default)]
    pub config_file: Option<String>,
    /// Generate the template at the `config_file` path
    #[clap(long)]
    #[serde(skip)]
    #[serde(default)]
    pub generate_config_template: bool,
}
