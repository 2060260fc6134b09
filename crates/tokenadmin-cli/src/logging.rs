// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Diagnostics go to stderr through `tracing` so table output on stdout
//! stays clean. `RUST_LOG` overrides the configured level.

use anyhow::{Result, anyhow};
use std::io;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::default(),
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Starts from the configured level; each `-v` raises it one step.
    pub fn from_settings(level: &str, format: LogFormat, verbosity: u8) -> Result<Self> {
        let base = parse_level(level)?;
        Ok(Self {
            level: raise_level(base, verbosity),
            format,
            ..Self::default()
        })
    }
}

pub fn parse_level(value: &str) -> Result<Level> {
    value.trim().parse::<Level>().map_err(|_| {
        anyhow!("unknown log level {value:?}; use error, warn, info, debug or trace")
    })
}

fn raise_level(level: Level, steps: u8) -> Level {
    const ORDER: [Level; 5] = [
        Level::ERROR,
        Level::WARN,
        Level::INFO,
        Level::DEBUG,
        Level::TRACE,
    ];
    let start = ORDER.iter().position(|candidate| *candidate == level).unwrap_or(1);
    let index = (start + usize::from(steps)).min(ORDER.len() - 1);
    ORDER[index]
}

pub fn init_logging(config: &LogConfig) -> Result<()> {
    init_logging_with_writer(config, io::stderr)
}

pub fn init_logging_with_writer<W>(config: &LogConfig, writer: W) -> Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(config.level);
    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_ansi(config.with_ansi)
                    .with_target(false)
                    .without_time(),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(config.with_ansi)
                    .without_time(),
            )
            .try_init(),
    };
    result.map_err(|error| anyhow!("initialize logging: {error}"))
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

// Our crates log at `level`; dependencies stay at warn.
fn default_directives(level: Level) -> String {
    format!(
        "warn,tokenadmin={level},tokenadmin_app={level},tokenadmin_client={level}",
        level = level.as_str().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::{LogConfig, LogFormat, default_directives, parse_level, raise_level};
    use anyhow::Result;
    use tracing::Level;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" pretty "), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn verbosity_raises_level_and_saturates() -> Result<()> {
        assert_eq!(raise_level(Level::WARN, 1), Level::INFO);
        assert_eq!(raise_level(Level::WARN, 2), Level::DEBUG);
        assert_eq!(raise_level(Level::DEBUG, 9), Level::TRACE);

        let config = LogConfig::from_settings("info", LogFormat::Json, 1)?;
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn unknown_level_is_rejected() {
        let error = parse_level("loud").expect_err("not a level");
        assert!(error.to_string().contains("error, warn, info, debug or trace"));
    }

    #[test]
    fn default_directives_cover_workspace_crates() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("tokenadmin_client=debug"));
    }
}
