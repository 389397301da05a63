#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::duplicates::DetectorLimits;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_VIDSHARE_PORT: u16 = 8080;
pub const DEFAULT_VIDSHARE_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_root: PathBuf,
    pub vidshare_port: u16,
    pub vidshare_host: String,
    /// Admin routes are disabled while this is unset.
    pub admin_token: Option<String>,
    pub limits: DetectorLimits,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_root: Option<PathBuf>,
    pub vidshare_port: Option<u16>,
    pub vidshare_host: Option<String>,
    pub duration_tolerance_secs: Option<i64>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig> {
    build_runtime_config_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let data_root = overrides
        .data_root
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("DATA_ROOT", file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("DATA_ROOT not set"))?;
    let vidshare_port = overrides
        .vidshare_port
        .or_else(|| lookup_parsed("VIDSHARE_PORT", file_vars, &env_lookup))
        .unwrap_or(DEFAULT_VIDSHARE_PORT);
    let vidshare_host = overrides
        .vidshare_host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value("VIDSHARE_HOST", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_VIDSHARE_HOST.to_string());
    let admin_token = lookup_value("VIDSHARE_ADMIN_TOKEN", file_vars, &env_lookup)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let defaults = DetectorLimits::default();
    let limits = DetectorLimits {
        title_scan_limit: lookup_parsed("DUPLICATE_TITLE_SCAN_LIMIT", file_vars, &env_lookup)
            .unwrap_or(defaults.title_scan_limit),
        duration_scan_limit: lookup_parsed("DUPLICATE_DURATION_SCAN_LIMIT", file_vars, &env_lookup)
            .unwrap_or(defaults.duration_scan_limit),
        duration_tolerance_secs: overrides
            .duration_tolerance_secs
            .or_else(|| lookup_parsed("DUPLICATE_DURATION_TOLERANCE", file_vars, &env_lookup))
            .filter(|value| *value >= 0)
            .unwrap_or(defaults.duration_tolerance_secs),
        ..defaults
    };

    Ok(RuntimeConfig {
        data_root: PathBuf::from(data_root),
        vidshare_port,
        vidshare_host,
        admin_token,
        limits,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

/// Unparseable values fall back to the default instead of failing startup.
fn lookup_parsed<T: std::str::FromStr>(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<T> {
    lookup_value(key, file_vars, env_lookup).and_then(|value| value.trim().parse::<T>().ok())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
