pub mod chain;
pub mod cipher;
pub mod classifier;
pub mod coinstake;
pub mod config;
pub mod delegation;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod simulator;
pub mod staking;
