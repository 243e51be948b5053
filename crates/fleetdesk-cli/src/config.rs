// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use fleetdesk_app::{Collection, DEFAULT_PAGE_SIZE};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "fleetdesk";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:1337/api";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_PAGE_SIZE: usize = 500;
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            ui: Ui::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub token: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub page_size: Option<usize>,
    pub start_tab: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("FLEETDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set FLEETDESK_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
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
                    "config file {} has no version. Add `version = 1` and put values under [api], [ui], and [log]",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
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
        let base_url = self.base_url();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!(
                "api.base_url in {} must start with http:// or https://, got {:?}",
                path.display(),
                base_url
            );
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed.is_zero() {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(size) = self.ui.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&size)
        {
            bail!(
                "ui.page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {}",
                path.display(),
                size
            );
        }

        if let Some(tab) = &self.ui.start_tab
            && Collection::parse(tab).is_none()
        {
            bail!(
                "ui.start_tab in {} is {:?}; use one of: {}",
                path.display(),
                tab,
                collection_names()
            );
        }

        let level = self.log_level();
        if !LOG_LEVELS.contains(&level) {
            bail!(
                "log.level in {} is {:?}; use one of: {}",
                path.display(),
                level,
                LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim()
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    // FLEETDESK_TOKEN wins; blank values count as unset.
    pub fn token(&self) -> Option<String> {
        env::var("FLEETDESK_TOKEN")
            .ok()
            .or_else(|| self.api.token.clone())
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty())
    }

    pub fn page_size(&self) -> usize {
        self.ui.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn start_tab(&self) -> Collection {
        self.ui
            .start_tab
            .as_deref()
            .and_then(Collection::parse)
            .unwrap_or(Collection::Contracts)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL).trim()
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file in the config")
        })?;
        Ok(data_root.join(APP_NAME).join("fleetdesk.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# fleetdesk config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\ntimeout = \"{}\"\n# Optional. FLEETDESK_TOKEN overrides it.\n# token = \"<jwt>\"\n\n[ui]\npage_size = {}\nstart_tab = \"contracts\"\n\n[log]\nlevel = \"{}\"\n# Optional. Default is the platform data dir (for example ~/.local/share/fleetdesk/fleetdesk.log)\n# file = \"/absolute/path/to/fleetdesk.log\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            DEFAULT_PAGE_SIZE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

pub fn collection_names() -> String {
    Collection::ALL
        .iter()
        .map(|collection| collection.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use fleetdesk_app::Collection;
    use fleetdesk_testkit::temp_config_path;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let (temp, path) = temp_config_path()?;
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
        let (_temp, path) = temp_config_path()?;
        let config = Config::load(&path)?;
        assert_eq!(config.version, 1);
        assert_eq!(config.base_url(), "http://localhost:1337/api");
        assert_eq!(config.timeout()?, Duration::from_secs(10));
        assert_eq!(config.page_size(), 10);
        assert_eq!(config.start_tab(), Collection::Contracts);
        assert_eq!(config.log_level(), "info");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url = \"http://x\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api], [ui], and [log]"));
        Ok(())
    }

    #[test]
    fn v1_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"https://backend.example/api/\"\ntimeout = \"1500ms\"\n[ui]\npage_size = 25\nstart_tab = \"vehicles\"\n[log]\nlevel = \"debug\"\nfile = \"/tmp/fd.log\"\n",
        )?;
        let config = Config::load(&path)?;
        assert_eq!(config.base_url(), "https://backend.example/api");
        assert_eq!(config.timeout()?, Duration::from_millis(1500));
        assert_eq!(config.page_size(), 25);
        assert_eq!(config.start_tab(), Collection::Vehicles);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_file()?, PathBuf::from("/tmp/fd.log"));
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
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() -> Result<()> {
        let cases = [
            ("[api]\nbase_url = \"ftp://files\"\n", "http:// or https://"),
            ("[api]\ntimeout = \"0s\"\n", "must be positive"),
            ("[api]\ntimeout = \"soon\"\n", "invalid duration"),
            ("[ui]\npage_size = 0\n", "between 1 and 500"),
            ("[ui]\npage_size = 501\n", "between 1 and 500"),
            ("[ui]\nstart_tab = \"garage\"\n", "use one of: contracts"),
            ("[log]\nlevel = \"loud\"\n", "log.level"),
        ];
        for (body, expected) in cases {
            let (_temp, path) = write_config(&format!("version = 1\n{body}"))?;
            let error = Config::load(&path).expect_err("invalid value should fail");
            let message = format!("{error:#}");
            assert!(message.contains(expected), "{body}: {message}");
        }
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, override_path) = temp_config_path()?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("FLEETDESK_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("FLEETDESK_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn default_path_uses_config_toml_suffix_when_no_env_override() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("FLEETDESK_CONFIG_PATH");
        }
        let path = Config::default_path()?;
        assert!(path.ends_with("fleetdesk/config.toml"));
        Ok(())
    }

    #[test]
    fn token_env_override_wins_and_blank_means_unset() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[api]\ntoken = \"from-config\"\n")?;
        let config = Config::load(&path)?;

        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("FLEETDESK_TOKEN", "from-env");
        }
        let from_env = config.token();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("FLEETDESK_TOKEN");
        }
        assert_eq!(from_env.as_deref(), Some("from-env"));
        assert_eq!(config.token().as_deref(), Some("from-config"));

        let (_temp, path) = write_config("version = 1\n[api]\ntoken = \"  \"\n")?;
        assert_eq!(Config::load(&path)?.token(), None);
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let (_temp, path) = temp_config_path()?;
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        assert!(example.contains("[api]"));
        assert!(example.contains("[ui]"));
        assert!(example.contains("[log]"));

        std::fs::write(&path, example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.page_size(), 10);
        Ok(())
    }
}
