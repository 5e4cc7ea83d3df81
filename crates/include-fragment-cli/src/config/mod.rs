//! Configuration loading and resolution.
//!
//! Every knob resolves explicit flag, then environment variable, then
//! default.

use anyhow::{Context, Result};
use url::Url;

use include_fragment::negotiate::DEFAULT_ACCEPT;

pub const ACCEPT_ENV: &str = "INCLUDE_FRAGMENT_ACCEPT";
pub const TIMEOUT_ENV: &str = "INCLUDE_FRAGMENT_TIMEOUT_MS";
pub const BASE_URL_ENV: &str = "INCLUDE_FRAGMENT_BASE_URL";
pub const MAX_DEPTH_ENV: &str = "INCLUDE_FRAGMENT_MAX_DEPTH";

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Values given on the command line, if any.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    pub accept: Option<String>,
    pub timeout_ms: Option<u64>,
    pub base_url: Option<String>,
    pub max_depth: Option<usize>,
}

/// Fully resolved settings for a resolve run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveConfig {
    /// Accept value applied to placeholders without their own.
    pub accept: String,
    pub timeout_ms: u64,
    /// Base URL relative `src` values resolve against.
    pub base_url: Option<Url>,
    /// Rounds of nested placeholder expansion.
    pub max_depth: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            accept: DEFAULT_ACCEPT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            base_url: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ResolveConfig {
    /// Resolve against the process environment.
    pub fn from_env(flags: &Flags) -> Result<Self> {
        Self::resolve(flags, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve(flags: &Flags, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let accept = flags
            .accept
            .clone()
            .or_else(|| env(ACCEPT_ENV))
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_ACCEPT.to_string());

        let timeout_ms = match flags.timeout_ms {
            Some(ms) => ms,
            None => parse_env(&env, TIMEOUT_ENV)?.unwrap_or(DEFAULT_TIMEOUT_MS),
        };

        let max_depth = match flags.max_depth {
            Some(depth) => depth,
            None => parse_env(&env, MAX_DEPTH_ENV)?.unwrap_or(DEFAULT_MAX_DEPTH),
        };

        let base_url = match flags.base_url.clone().or_else(|| env(BASE_URL_ENV)) {
            Some(raw) if !raw.trim().is_empty() => Some(
                Url::parse(raw.trim()).with_context(|| format!("invalid base URL: {raw}"))?,
            ),
            _ => None,
        };

        Ok(Self {
            accept,
            timeout_ms,
            base_url,
            max_depth,
        })
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}"))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}
