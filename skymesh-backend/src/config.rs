use crate::bluesky::poller::PollerConfig;
use crate::threading::{Pacing, ThreadLimits};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DASHBOARD_DIR: &str = "DASHBOARD_DIR";
    pub const HISTORY_LIMIT: &str = "SKYMESH_HISTORY_LIMIT";
    // Bluesky account
    pub const BLUESKY_SERVICE: &str = "BLUESKY_SERVICE";
    pub const BLUESKY_HANDLE: &str = "BLUESKY_HANDLE";
    pub const BLUESKY_APP_PASSWORD: &str = "BLUESKY_APP_PASSWORD";
    // Agent Mesh backend
    pub const AGENT_MESH_API_URL: &str = "AGENT_MESH_API_URL";
    pub const AGENT_MESH_TIMEOUT_SECS: &str = "AGENT_MESH_TIMEOUT_SECS";
    // Poller
    pub const POLL_INTERVAL_MS: &str = "SKYMESH_POLL_INTERVAL_MS";
    pub const NOTIFICATION_LIMIT: &str = "SKYMESH_NOTIFICATION_LIMIT";
    // Reply threading
    pub const MAX_POST_GRAPHEMES: &str = "SKYMESH_MAX_POST_GRAPHEMES";
    pub const MAX_THREAD_DEPTH: &str = "SKYMESH_MAX_THREAD_DEPTH";
    pub const POST_DELAY_MS: &str = "SKYMESH_POST_DELAY_MS";
    pub const PART_DELAY_MS: &str = "SKYMESH_PART_DELAY_MS";
    pub const REFETCH_CHAIN_PARENTS: &str = "SKYMESH_REFETCH_CHAIN_PARENTS";
    pub const POST_LANGS: &str = "SKYMESH_POST_LANGS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 3000;
    pub const HISTORY_LIMIT: usize = 500;
    pub const HANDLE: &str = "Unknown";
    pub const BLUESKY_SERVICE: &str = "https://bsky.social";
    pub const AGENT_MESH_TIMEOUT_SECS: u64 = 120;
    pub const POLL_INTERVAL_MS: u64 = 15_000;
    pub const NOTIFICATION_LIMIT: u32 = 50;
    pub const MAX_POST_GRAPHEMES: usize = 300;
    pub const MAX_THREAD_DEPTH: usize = 9;
    pub const POST_DELAY_MS: u64 = 2_000;
    pub const PART_DELAY_MS: u64 = 3_000;
    pub const POST_LANGS: &str = "en";
}

/// listNotifications accepts at most this many per page
const MAX_NOTIFICATION_LIMIT: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Reads one setting; `None` when unset
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Process environment, treating blank values as unset
pub fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Dashboard server settings. Always available, even when the bridge is not configured.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub dashboard_dir: Option<String>,
    pub history_limit: usize,
    /// Handle shown on the dashboard
    pub handle: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: Lookup) -> Result<Self, ConfigError> {
        let history_limit = parsed(lookup, env_vars::HISTORY_LIMIT, defaults::HISTORY_LIMIT)?;
        if history_limit == 0 {
            return Err(invalid(env_vars::HISTORY_LIMIT, "0", "must be at least 1"));
        }

        Ok(Self {
            port: parsed(lookup, env_vars::PORT, defaults::PORT)?,
            dashboard_dir: lookup(env_vars::DASHBOARD_DIR),
            history_limit,
            handle: lookup(env_vars::BLUESKY_HANDLE)
                .unwrap_or_else(|| defaults::HANDLE.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BlueskyConfig {
    pub service: String,
    pub handle: String,
    pub app_password: String,
}

#[derive(Debug, Clone)]
pub struct AgentMeshConfig {
    pub api_url: String,
    pub timeout: Duration,
}

/// Everything the poller, Agent Mesh client and reply publisher need
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bluesky: BlueskyConfig,
    pub agent_mesh: AgentMeshConfig,
    pub poller: PollerConfig,
    pub limits: ThreadLimits,
    pub pacing: Pacing,
    pub refetch_chain_parents: bool,
    pub langs: Vec<String>,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: Lookup) -> Result<Self, ConfigError> {
        let bluesky = BlueskyConfig {
            service: lookup(env_vars::BLUESKY_SERVICE)
                .unwrap_or_else(|| defaults::BLUESKY_SERVICE.to_string()),
            handle: required(lookup, env_vars::BLUESKY_HANDLE)?,
            app_password: required(lookup, env_vars::BLUESKY_APP_PASSWORD)?,
        };

        let api_url = required(lookup, env_vars::AGENT_MESH_API_URL)?;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(invalid(env_vars::AGENT_MESH_API_URL, &api_url, "must be an http(s) URL"));
        }
        let agent_mesh = AgentMeshConfig {
            api_url,
            timeout: Duration::from_secs(parsed(
                lookup,
                env_vars::AGENT_MESH_TIMEOUT_SECS,
                defaults::AGENT_MESH_TIMEOUT_SECS,
            )?),
        };

        let interval_ms = positive(lookup, env_vars::POLL_INTERVAL_MS, defaults::POLL_INTERVAL_MS)?;
        let notification_limit =
            positive(lookup, env_vars::NOTIFICATION_LIMIT, defaults::NOTIFICATION_LIMIT)?;
        if notification_limit > MAX_NOTIFICATION_LIMIT {
            return Err(invalid(
                env_vars::NOTIFICATION_LIMIT,
                &notification_limit.to_string(),
                "must be at most 100",
            ));
        }

        let limits = ThreadLimits {
            max_post_graphemes: positive(
                lookup,
                env_vars::MAX_POST_GRAPHEMES,
                defaults::MAX_POST_GRAPHEMES,
            )?,
            max_visible_depth: positive(lookup, env_vars::MAX_THREAD_DEPTH, defaults::MAX_THREAD_DEPTH)?,
        };

        let pacing = Pacing {
            post_delay: Duration::from_millis(parsed(
                lookup,
                env_vars::POST_DELAY_MS,
                defaults::POST_DELAY_MS,
            )?),
            part_delay: Duration::from_millis(parsed(
                lookup,
                env_vars::PART_DELAY_MS,
                defaults::PART_DELAY_MS,
            )?),
        };

        let langs = lookup(env_vars::POST_LANGS)
            .unwrap_or_else(|| defaults::POST_LANGS.to_string())
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        Ok(Self {
            bluesky,
            agent_mesh,
            poller: PollerConfig {
                interval: Duration::from_millis(interval_ms),
                notification_limit,
            },
            limits,
            pacing,
            refetch_chain_parents: flag(lookup, env_vars::REFETCH_CHAIN_PARENTS, false)?,
            langs,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn required(lookup: Lookup, var: &'static str) -> Result<String, ConfigError> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parsed<T>(lookup: Lookup, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, e.to_string())),
        None => Ok(default),
    }
}

fn positive<T>(lookup: Lookup, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + Display,
    T::Err: Display,
{
    let value = parsed(lookup, var, default)?;
    if value <= T::default() {
        return Err(invalid(var, &value.to_string(), "must be greater than 0"));
    }
    Ok(value)
}

fn flag(lookup: Lookup, var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match lookup(var) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(var, &raw, "expected true or false")),
        },
        None => Ok(default),
    }
}
