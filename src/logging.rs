use std::fs::OpenOptions;

use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};

use crate::config::{Config, LogConfig};

/// Environment variable overriding the configured level.
pub const LOG_ENV: &str = "PIPESH_LOG";

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn effective_level(log: &LogConfig) -> LevelFilter {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .or_else(|| parse_level(&log.level))
        .unwrap_or(LevelFilter::Warn)
}

/// Send log records to the configured file. The terminal belongs to the
/// children, so nothing is logged there. Best-effort: a logger that cannot be
/// set up is silently skipped.
pub fn init(config: &Config) {
    let level = effective_level(&config.log);
    if level == LevelFilter::Off {
        return;
    }

    let path = config.log_path();
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let log_config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    let _ = WriteLogger::init(level, log_config, file);
}
