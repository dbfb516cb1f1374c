// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "bookstore.log";
const LOG_FILTER_ENV: &str = "BOOKSTORE_LOG";

pub fn log_dir(config: &Config) -> Result<PathBuf> {
    match config.log_dir() {
        Some(dir) => Ok(dir),
        None => bookstore_db::default_log_dir(),
    }
}

/// `BOOKSTORE_LOG` wins over the configured level.
fn filter_directive(config: &Config) -> String {
    env::var(LOG_FILTER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.log_level().to_owned())
}

/// Sends tracing output to a daily-rolling file. The terminal belongs to the UI, so
/// nothing is written to stdout or stderr. Keep the guard alive until exit.
pub fn init(config: &Config) -> Result<WorkerGuard> {
    let dir = log_dir(config)?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;

    let directive = filter_directive(config);
    let env_filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter {directive:?}; try info or debug"))?;

    let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .try_init()
        .context("install log subscriber")?;

    tracing::info!(dir = %dir.display(), "logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::{filter_directive, log_dir};
    use crate::config::Config;
    use anyhow::Result;
    use std::path::PathBuf;

    #[test]
    fn configured_log_dir_is_used_verbatim() -> Result<()> {
        let mut config = Config::default();
        config.logging.dir = Some("/var/log/bookstore".to_owned());
        assert_eq!(log_dir(&config)?, PathBuf::from("/var/log/bookstore"));
        Ok(())
    }

    #[test]
    fn configured_level_is_the_fallback_filter() {
        let mut config = Config::default();
        config.logging.level = Some("warn".to_owned());
        if std::env::var_os("BOOKSTORE_LOG").is_none() {
            assert_eq!(filter_directive(&config), "warn");
        }
    }
}
