// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use bookstore_app::DateFormat;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_BUSY_TIMEOUT: &str = "2s";
const DEFAULT_CURRENCY_SYMBOL: &str = "€";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub reports: Reports,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            ui: Ui::default(),
            reports: Reports::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
    pub busy_timeout: Option<String>,
    /// Busy attempts before giving up on the write lock; 0 waits forever.
    pub lock_attempts: Option<u32>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout: Some(DEFAULT_BUSY_TIMEOUT.to_owned()),
            lock_attempts: Some(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub date_format: Option<String>,
    pub remember_subset: Option<bool>,
    pub currency_symbol: Option<String>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            date_format: Some(DateFormat::default().pattern()),
            remember_subset: Some(true),
            currency_symbol: Some(DEFAULT_CURRENCY_SYMBOL.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reports {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub dir: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            dir: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("BOOKSTORE_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!(
                "cannot resolve config directory; set BOOKSTORE_CONFIG_PATH to the config file"
            )
        })?;

        let app_dir = config_root.join(bookstore_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [storage], [ui], [reports] and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Run `bookstore --print-example-config` for the current layout",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            bookstore_db::validate_db_path(db_path)?;
        }

        if let Some(timeout) = &self.storage.busy_timeout {
            let parsed = parse_duration(timeout)?;
            if parsed.is_zero() {
                bail!(
                    "storage.busy_timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(format) = &self.ui.date_format {
            format
                .parse::<DateFormat>()
                .with_context(|| format!("ui.date_format in {}", path.display()))?;
        }

        if let Some(symbol) = &self.ui.currency_symbol
            && symbol.trim().is_empty()
        {
            bail!(
                "ui.currency_symbol in {} must not be empty",
                path.display()
            );
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => bookstore_db::default_db_path(),
        }
    }

    pub fn busy_timeout(&self) -> Result<Duration> {
        parse_duration(
            self.storage
                .busy_timeout
                .as_deref()
                .unwrap_or(DEFAULT_BUSY_TIMEOUT),
        )
    }

    /// `None` keeps retrying a busy database until it frees up.
    pub fn lock_attempts(&self) -> Option<u32> {
        self.storage.lock_attempts.filter(|attempts| *attempts > 0)
    }

    pub fn date_format(&self) -> Result<DateFormat> {
        match &self.ui.date_format {
            Some(format) => format.parse(),
            None => Ok(DateFormat::default()),
        }
    }

    pub fn remember_subset(&self) -> bool {
        self.ui.remember_subset.unwrap_or(true)
    }

    pub fn currency_symbol(&self) -> &str {
        self.ui
            .currency_symbol
            .as_deref()
            .unwrap_or(DEFAULT_CURRENCY_SYMBOL)
    }

    pub fn reports_dir(&self) -> Result<PathBuf> {
        match &self.reports.dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => bookstore_db::default_reports_dir(),
        }
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.logging.dir.as_ref().map(PathBuf::from)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# bookstore config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is the platform data dir (for example ~/.local/share/bookstore/bookstore.db)\n# db_path = \"/absolute/path/to/bookstore.db\"\nbusy_timeout = \"{}\"\n# Busy attempts before giving up on a locked database; 0 waits forever.\nlock_attempts = 0\n\n[ui]\n# One of: {}\ndate_format = \"{}\"\nremember_subset = true\ncurrency_symbol = \"{}\"\n\n[reports]\n# dir = \"/absolute/path/to/reports\"\n\n[logging]\nlevel = \"{}\"\n# dir = \"/absolute/path/to/logs\"\n",
            path.display(),
            DEFAULT_BUSY_TIMEOUT,
            DateFormat::ALL.map(DateFormat::pattern).join(" "),
            DateFormat::default().pattern(),
            DEFAULT_CURRENCY_SYMBOL,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid busy timeout {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid busy timeout {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use <N>ms or <N>s (for example 500ms or 2s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use bookstore_app::{DateFormat, DateOrder};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert!(config.remember_subset());
        assert_eq!(config.busy_timeout()?, Duration::from_secs(2));
        assert_eq!(config.lock_attempts(), None);
        assert_eq!(config.date_format()?, DateFormat::default());
        assert_eq!(config.currency_symbol(), "€");
        assert_eq!(config.log_level(), "info");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[ui]\nremember_subset = false\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[storage], [ui], [reports] and [logging]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[storage]\nbusy_timeout = \"500ms\"\nlock_attempts = 20\n[ui]\ndate_format = \"mm-dd-yyyy\"\nremember_subset = false\ncurrency_symbol = \"$\"\n[reports]\ndir = \"/srv/reports\"\n[logging]\nlevel = \"debug\"\ndir = \"/var/log/bookstore\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.busy_timeout()?, Duration::from_millis(500));
        assert_eq!(config.lock_attempts(), Some(20));
        assert_eq!(
            config.date_format()?,
            DateFormat::new(DateOrder::MonthDay, '-', true)
        );
        assert!(!config.remember_subset());
        assert_eq!(config.currency_symbol(), "$");
        assert_eq!(config.reports_dir()?, PathBuf::from("/srv/reports"));
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_dir(), Some(PathBuf::from("/var/log/bookstore")));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 3\n")?;
        let error = Config::load(&path).expect_err("v3 config should fail");
        let message = error.to_string();
        assert!(message.contains("unsupported config version 3"));
        assert!(message.contains("--print-example-config"));
        Ok(())
    }

    #[test]
    fn unknown_date_format_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ui]\ndate_format = \"yyyy.mm.dd\"\n")?;
        let error = Config::load(&path).expect_err("unknown date format should fail");
        let message = format!("{error:#}");
        assert!(message.contains("ui.date_format"), "unexpected message: {message}");
        assert!(message.contains("dd/mm/yy"), "unexpected message: {message}");
        Ok(())
    }

    #[test]
    fn zero_busy_timeout_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[storage]\nbusy_timeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn busy_timeout_parses_millis_and_seconds() -> Result<()> {
        assert_eq!(parse_duration("250ms")?, Duration::from_millis(250));
        assert_eq!(parse_duration("3s")?, Duration::from_secs(3));
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("BOOKSTORE_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKSTORE_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_prefers_storage_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("BOOKSTORE_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKSTORE_DB_PATH");
        }
        assert_eq!(config.db_path()?, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("BOOKSTORE_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("BOOKSTORE_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[storage]\ndb_path = \"https://shop.example/bookstore.db\"\n",
        )?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        let message = error.to_string();
        assert!(
            message.contains("looks like a URI") || message.contains("filesystem path"),
            "unexpected message: {message}"
        );
        Ok(())
    }

    #[test]
    fn example_config_loads_back() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        for section in ["[storage]", "[ui]", "[reports]", "[logging]"] {
            assert!(example.contains(section), "missing {section}");
        }

        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.date_format()?, DateFormat::default());
        Ok(())
    }
}
