// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokenadmin_app::{DEFAULT_PAGE_SIZE, DEFAULT_PAGE_SIZES, PageSizes};

use crate::logging::{LogFormat, parse_level};

pub const APP_NAME: &str = "tokenadmin";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "warn";
const CONFIG_PATH_ENV: &str = "TOKENADMIN_CONFIG_PATH";
const AUTH_TOKEN_ENV: &str = "TOKENADMIN_AUTH_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub list: List,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: Server::default(),
            list: List::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub auth_token: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct List {
    pub page_size: Option<usize>,
    pub page_sizes: Option<Vec<usize>>,
}

impl Default for List {
    fn default() -> Self {
        Self {
            page_size: Some(DEFAULT_PAGE_SIZE),
            page_sizes: Some(DEFAULT_PAGE_SIZES.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            format: Some("compact".to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
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
                    "config file {} is not versioned. Add `version = 1` and put values under [server], [list], and [logging]",
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
        if let Some(base_url) = &self.server.base_url
            && base_url.trim().is_empty()
        {
            bail!(
                "server.base_url in {} is empty; remove it or set the server URL",
                path.display()
            );
        }

        if let Some(timeout) = &self.server.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "server.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        self.page_sizes()
            .with_context(|| format!("invalid [list] settings in {}", path.display()))?;

        if let Some(level) = &self.logging.level {
            parse_level(level)
                .with_context(|| format!("invalid logging.level in {}", path.display()))?;
        }

        if let Some(format) = &self.logging.format
            && LogFormat::parse(format).is_none()
        {
            bail!(
                "logging.format in {} must be pretty, compact or json, got {:?}",
                path.display(),
                format
            );
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<&str> {
        self.server
            .base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .ok_or_else(|| {
                anyhow!("no server configured; set [server].base_url in the config file")
            })
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.server.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    /// Token from the config file, else from the environment.
    pub fn auth_token(&self) -> Option<String> {
        self.server
            .auth_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| env::var(AUTH_TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty())
    }

    pub fn page_sizes(&self) -> Result<PageSizes> {
        let allowed = self
            .list
            .page_sizes
            .as_deref()
            .unwrap_or(&DEFAULT_PAGE_SIZES);
        PageSizes::new(allowed, self.list.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_format(&self) -> LogFormat {
        self.logging
            .format
            .as_deref()
            .and_then(LogFormat::parse)
            .unwrap_or_default()
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tokenadmin config\n# Place this file at: {}\n\nversion = 1\n\n[server]\nbase_url = \"https://pi.example.com\"\ntimeout = \"{}\"\n# Optional. {} is used when unset.\n# auth_token = \"<token from POST /auth>\"\n\n[list]\npage_size = {}\npage_sizes = {:?}\n\n[logging]\n# error, warn, info, debug or trace; RUST_LOG overrides\nlevel = \"{}\"\nformat = \"compact\"\n",
            path.display(),
            DEFAULT_TIMEOUT,
            AUTH_TOKEN_ENV,
            DEFAULT_PAGE_SIZE,
            DEFAULT_PAGE_SIZES,
            DEFAULT_LOG_LEVEL,
        )
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
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

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use crate::logging::LogFormat;
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let (temp, path) = tokenadmin_testkit::temp_config_path()?;
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
        assert_eq!(config.page_sizes()?.default_size(), 15);
        assert_eq!(config.timeout()?, Duration::from_secs(10));
        assert_eq!(config.log_format(), LogFormat::Compact);
        Ok(())
    }

    #[test]
    fn missing_base_url_is_actionable() {
        let error = Config::default().base_url().expect_err("no server");
        assert!(error.to_string().contains("[server].base_url"));
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[server]\nbase_url=\"https://pi\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[server], [list], and [logging]"));
        Ok(())
    }

    #[test]
    fn v1_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[server]\nbase_url = \"https://pi.example.com///\"\ntimeout = \"2s\"\nauth_token = \"abc\"\n[list]\npage_size = 25\npage_sizes = [10, 25]\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.base_url()?, "https://pi.example.com");
        assert_eq!(config.timeout()?, Duration::from_secs(2));
        assert_eq!(config.auth_token().as_deref(), Some("abc"));
        assert_eq!(config.page_sizes()?.allowed(), &[10, 25]);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_format(), LogFormat::Json);
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
    fn default_page_size_must_be_allowed() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[list]\npage_size = 20\n")?;
        let error = Config::load(&path).expect_err("20 is not in the default list");
        let message = format!("{error:#}");
        assert!(message.contains("[list]"), "{message}");
        assert!(message.contains("default page size 20"), "{message}");
        Ok(())
    }

    #[test]
    fn unknown_log_format_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[logging]\nformat = \"xml\"\n")?;
        let error = Config::load(&path).expect_err("xml format");
        assert!(error.to_string().contains("pretty, compact or json"));
        Ok(())
    }

    #[test]
    fn zero_timeout_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[server]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TOKENADMIN_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TOKENADMIN_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn auth_token_falls_back_to_env() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[server]\nbase_url = \"https://pi\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TOKENADMIN_AUTH_TOKEN", "from-env");
        }
        let config = Config::load(&path)?;
        let token = config.auth_token();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TOKENADMIN_AUTH_TOKEN");
        }
        assert_eq!(token.as_deref(), Some("from-env"));
        Ok(())
    }

    #[test]
    fn config_token_wins_over_env() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[server]\nauth_token = \"from-file\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TOKENADMIN_AUTH_TOKEN", "from-env");
        }
        let token = Config::load(&path)?.auth_token();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TOKENADMIN_AUTH_TOKEN");
        }
        assert_eq!(token.as_deref(), Some("from-file"));
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("oops").is_err());
        Ok(())
    }

    #[test]
    fn example_config_loads_back() -> Result<()> {
        let (_temp, path) = write_config("")?;
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.base_url()?, "https://pi.example.com");
        assert_eq!(config.page_sizes()?.allowed(), &[10, 15, 25, 50, 100]);
        Ok(())
    }
}
