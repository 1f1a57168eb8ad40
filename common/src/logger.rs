//! Console and file logging backed by `fern`.

use std::{fmt, fs, str::FromStr};

use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub fn default_logs_datetime_format() -> String {
    String::from("[%Y-%m-%d] (%H:%M:%S%.3f)")
}

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

// Per module log level override, written as `module=level`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub module: String,
    pub level: LogLevel,
}

impl FromStr for ModuleConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, level) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid module config '{}', expected module=level", s))?;
        Ok(Self {
            module: module.to_owned(),
            level: level.parse()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub level: LogLevel,
    // Defaults to `level` when not set
    pub file_level: Option<LogLevel>,
    pub disable_file_logging: bool,
    pub disable_file_log_date_based: bool,
    pub disable_log_color: bool,
    pub filename_log: String,
    // Must end with a `/`
    pub logs_path: String,
    pub modules: Vec<ModuleConfig>,
    pub datetime_format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file_level: None,
            disable_file_logging: true,
            disable_file_log_date_based: false,
            disable_log_color: false,
            filename_log: String::from("pos-wallet.log"),
            logs_path: String::from("logs/"),
            modules: Vec::new(),
            datetime_format: default_logs_datetime_format(),
        }
    }
}

/// Build the dispatch tree without installing it.
pub fn build_dispatch(config: &LoggerConfig) -> Result<fern::Dispatch, LoggerError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);

    // the root level lets through whatever one of the outputs wants
    let file_level = LevelFilter::from(config.file_level.unwrap_or(config.level));
    let mut base = fern::Dispatch::new().level(LevelFilter::from(config.level).max(file_level));
    for module in &config.modules {
        base = base.level_for(module.module.clone(), module.level.into());
    }

    let datetime_format = config.datetime_format.clone();
    let use_colors = !config.disable_log_color;
    let stdout = fern::Dispatch::new()
        .level(config.level.into())
        .format(move |out, message, record| {
            let level = if use_colors {
                colors.color(record.level()).to_string()
            } else {
                record.level().to_string()
            };
            out.finish(format_args!(
                "{} {} [{}] {}",
                chrono::Local::now().format(&datetime_format),
                level,
                record.target(),
                message
            ))
        })
        .chain(std::io::stdout());
    base = base.chain(stdout);

    if !config.disable_file_logging {
        fs::create_dir_all(&config.logs_path)?;

        let datetime_format = config.datetime_format.clone();
        let file = fern::Dispatch::new()
            .level(config.file_level.unwrap_or(config.level).into())
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().format(&datetime_format),
                    record.level(),
                    record.target(),
                    message
                ))
            });

        let file = if config.disable_file_log_date_based {
            file.chain(fern::log_file(format!(
                "{}{}",
                config.logs_path, config.filename_log
            ))?)
        } else {
            file.chain(fern::DateBased::new(
                config.logs_path.clone(),
                format!("%Y-%m-%d.{}", config.filename_log),
            ))
        };
        base = base.chain(file);
    }

    Ok(base)
}

// Install the global logger, can only be done once per process
pub fn init_logger(config: &LoggerConfig) -> Result<(), LoggerError> {
    build_dispatch(config)?.apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_config_parse() {
        let config: ModuleConfig = "pos_wallet::staking=trace".parse().unwrap();
        assert_eq!(config.module, "pos_wallet::staking");
        assert_eq!(config.level, LogLevel::Trace);
        assert!("no_level".parse::<ModuleConfig>().is_err());
        assert!("module=loud".parse::<ModuleConfig>().is_err());
    }

    #[test]
    fn test_level_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs_path = format!("{}/logs/", dir.path().display());
        let config = LoggerConfig {
            disable_file_logging: false,
            disable_file_log_date_based: true,
            logs_path: logs_path.clone(),
            ..Default::default()
        };

        assert!(build_dispatch(&config).is_ok());
        assert!(std::path::Path::new(&logs_path).is_dir());
    }
}
