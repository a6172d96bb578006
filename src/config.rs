// src/config.rs

//! Configuration loading utilities.
//!
//! Configuration is layered: TOML file, then environment overrides, then
//! validation. A missing or unreadable file falls back to defaults so that a
//! deployment can be configured purely through the environment.

use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;
use crate::models::Config;

/// Environment variables recognised as overrides.
pub mod vars {
    pub const BACKEND_URL: &str = "SUPABASE_URL";
    pub const ANON_KEY: &str = "SUPABASE_ANON_KEY";
    pub const SITE_URL: &str = "REVIEWA2Z_SITE_URL";
    pub const HOST: &str = "REVIEWA2Z_HOST";
    pub const PORT: &str = "REVIEWA2Z_PORT";
    pub const LOG_JSON: &str = "REVIEWA2Z_LOG_JSON";
}

/// Load, override from the process environment, and validate.
pub fn load(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path);
    apply_env(&mut config, |key| env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Apply environment overrides using the given lookup.
///
/// Values that fail to parse are logged and ignored.
pub fn apply_env<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(vars::BACKEND_URL) {
        config.backend.url = url;
    }
    if let Some(key) = lookup(vars::ANON_KEY) {
        config.backend.anon_key = key;
    }
    if let Some(url) = lookup(vars::SITE_URL) {
        config.site.url = url;
    }
    if let Some(host) = lookup(vars::HOST) {
        config.server.host = host;
    }
    if let Some(port) = parse_var(&lookup, vars::PORT) {
        config.server.port = port;
    }
    if let Some(json) = parse_var(&lookup, vars::LOG_JSON) {
        config.logging.json = json;
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    raw.trim()
        .parse()
        .map_err(|e| log::warn!("Ignoring invalid {key} value {raw:?}: {e}"))
        .ok()
}
