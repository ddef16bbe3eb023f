//! Load config from file and environment.

use anyhow::Context;
use peerbus_core::CoreConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration. File: ~/.config/peerbus/config.toml or /etc/peerbus/config.toml.
/// Env overrides: PEERBUS_GROUP, PEERBUS_LOG, PEERBUS_INPUT.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Tracing filter used when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Replay file to read events from instead of stdin.
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Capacity of the event channel between the reader and the consumer (default 1024).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub bus: CoreConfig,
}

fn default_log_filter() -> String {
    "info".to_string()
}
fn default_channel_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            input: None,
            channel_capacity: default_channel_capacity(),
            bus: CoreConfig::default(),
        }
    }
}

/// Load config: default, then the explicit file or the first standard file present, then env vars.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(p) => load_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    if c.channel_capacity == 0 {
        c.channel_capacity = default_channel_capacity();
    }
    Ok(c)
}

/// Apply env overrides through `lookup`.
pub fn apply_env(c: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(s) = lookup("PEERBUS_GROUP") {
        c.bus.group = s;
    }
    if let Some(s) = lookup("PEERBUS_LOG") {
        c.log_filter = s;
    }
    if let Some(s) = lookup("PEERBUS_INPUT") {
        c.input = Some(PathBuf::from(s));
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/peerbus/config.toml"));
    }
    out.push(PathBuf::from("/etc/peerbus/config.toml"));
    out
}

fn load_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse(&s).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}
