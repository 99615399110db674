//! Layered lookup for run tunables.
//!
//! A value is taken from the first layer that has it: command line,
//! `COLUMNAR_LOADER_<KEY>` environment variable, the optional YAML settings
//! file, then the caller's default.

use std::{collections::BTreeMap, env, fmt::Display, fs, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde_yaml::Value as YamlValue;

pub const ENV_PREFIX: &str = "COLUMNAR_LOADER_";

pub const KEYSPACE: &str = "keyspace";
pub const BATCH_SIZE: &str = "batch_size";
pub const STATEMENT_CACHE_SIZE: &str = "statement_cache_size";
pub const PROGRESS_SAMPLE_LINES: &str = "progress_sample_lines";
pub const STRICT_MAPPING: &str = "strict_mapping";
pub const DELIMITER: &str = "delimiter";

/// Typed, defaultable key lookup.
pub trait ConfigService {
    /// Raw text of `key`, if any layer sets it.
    fn lookup(&self, key: &str) -> Option<String>;

    fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.lookup(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|err| anyhow!("Invalid value '{raw}' for setting '{key}': {err}"))
            })
            .transpose()
    }

    fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.get(key)?.unwrap_or(default))
    }

    fn require<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)?.ok_or_else(|| {
            anyhow!(
                "Setting '{key}' is required (pass it on the command line or set {})",
                env_key(key)
            )
        })
    }
}

pub fn env_key(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
}

#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    cli: BTreeMap<String, String>,
    file: BTreeMap<String, String>,
    /// Replaces the process environment when set.
    env: Option<BTreeMap<String, String>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.cli.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn with_file(mut self, path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading settings file {path:?}"))?;
        self.file = parse_settings(&raw).with_context(|| format!("Parsing settings file {path:?}"))?;
        debug!("Loaded {} setting(s) from {path:?}", self.file.len());
        Ok(self)
    }

    pub fn with_env(mut self, vars: BTreeMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    fn env_value(&self, key: &str) -> Option<String> {
        let name = env_key(key);
        match &self.env {
            Some(vars) => vars.get(&name).cloned(),
            None => env::var(name).ok(),
        }
    }
}

impl ConfigService for LayeredConfig {
    fn lookup(&self, key: &str) -> Option<String> {
        self.cli
            .get(key)
            .cloned()
            .or_else(|| self.env_value(key))
            .or_else(|| self.file.get(key).cloned())
    }
}

fn parse_settings(raw: &str) -> Result<BTreeMap<String, String>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let values: BTreeMap<String, YamlValue> = serde_yaml::from_str(raw)?;
    values
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                YamlValue::String(s) => s,
                YamlValue::Number(n) => n.to_string(),
                YamlValue::Bool(b) => b.to_string(),
                _ => bail!("Setting '{key}' must be a scalar value"),
            };
            Ok((key, text))
        })
        .collect()
}
