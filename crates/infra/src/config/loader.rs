//! Configuration loader
//!
//! Loads gateway configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Loads a `.env` file from the working directory, if one exists
//! 2. Uses environment variables when any `SSOGATE_*` variable is set
//! 3. Otherwise probes the standard paths for a JSON or TOML file
//! 4. Falls back to built-in defaults when no file exists either
//!
//! ## Environment Variables
//! - `SSOGATE_TUNNEL`: WebVPN gateway variant number
//! - `SSOGATE_HTTP_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `SSOGATE_USER_AGENT`: Browser identity sent on every request
//! - `SSOGATE_MAX_REDIRECTS`: Hop limit for redirect chains
//! - `SSOGATE_QUERY_CEILING`: Attempts per query operation
//! - `SSOGATE_QUERY_BACKOFF_MS`: Pause between query attempts
//! - `SSOGATE_SSO_URL`, `SSOGATE_TUNNEL_GATEWAY_URL`, `SSOGATE_BYKC_URL`,
//!   `SSOGATE_JWXT_URL`: Base-URL overrides
//! - `SSOGATE_RSA_PUBLIC_KEY`: Base64 DER key replacing the built-in one
//!
//! ## File Locations
//! The loader probes `ssogate.{toml,json}` then `config.{toml,json}` in the
//! working directory, its parent, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ssogate_domain::{GateConfig, GateError, Result, TunnelVariant};

const ENV_PREFIX: &str = "SSOGATE_";

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `GateError::Config` if a selected source is malformed or the
/// resulting configuration fails validation.
pub fn load() -> Result<GateConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let config = if env_configured() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        config
    } else {
        match probe_config_paths() {
            Some(path) => load_from_file(Some(path))?,
            None => {
                tracing::info!("No configuration found, using defaults");
                GateConfig::default()
            }
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from `SSOGATE_*` environment variables
///
/// Unset variables keep their defaults.
///
/// # Errors
/// Returns `GateError::Config` if no variable is set or a value does not
/// parse.
pub fn load_from_env() -> Result<GateConfig> {
    if !env_configured() {
        return Err(GateError::config(format!("No {ENV_PREFIX}* environment variables set")));
    }

    let mut config = GateConfig::default();

    if let Some(tunnel) = env_parse::<u16>("SSOGATE_TUNNEL")? {
        config.tunnel = Some(TunnelVariant(tunnel));
    }
    if let Some(secs) = env_parse::<u64>("SSOGATE_HTTP_TIMEOUT_SECS")? {
        config.http.timeout = Duration::from_secs(secs);
    }
    if let Some(agent) = env_opt("SSOGATE_USER_AGENT") {
        config.http.user_agent = agent;
    }
    if let Some(hops) = env_parse::<u32>("SSOGATE_MAX_REDIRECTS")? {
        config.http.max_redirects = hops;
    }
    if let Some(ceiling) = env_parse::<u32>("SSOGATE_QUERY_CEILING")? {
        config.retry.query_ceiling = ceiling;
    }
    if let Some(ms) = env_parse::<u64>("SSOGATE_QUERY_BACKOFF_MS")? {
        config.retry.query_backoff = Duration::from_millis(ms);
    }

    config.endpoints.sso = env_opt("SSOGATE_SSO_URL");
    config.endpoints.tunnel_gateway = env_opt("SSOGATE_TUNNEL_GATEWAY_URL");
    config.endpoints.bykc = env_opt("SSOGATE_BYKC_URL");
    config.endpoints.jwxt = env_opt("SSOGATE_JWXT_URL");
    config.rsa_public_key = env_opt("SSOGATE_RSA_PUBLIC_KEY");

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. JSON and TOML are
/// told apart by file extension.
///
/// # Errors
/// Returns `GateError::Config` if the file is missing, unreadable, or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<GateConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(GateError::config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            GateError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| GateError::config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<GateConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| GateError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| GateError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(GateError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["ssogate.toml", "ssogate.json", "config.toml", "config.json"];

    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter().flat_map(|dir| NAMES.iter().map(move |name| dir.join(name))).find(|p| p.exists())
}

fn env_configured() -> bool {
    std::env::vars_os().any(|(key, _)| key.to_str().is_some_and(|k| k.starts_with(ENV_PREFIX)))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| GateError::config(format!("Invalid value for {key} ('{raw}'): {e}")))
        })
        .transpose()
}
