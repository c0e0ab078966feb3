// acp-config/src/lib.rs
// ============================================================================
// Module: Process Configuration
// Description: Environment-variable driven configuration for the control
//              plane server, CLI, and worker binaries.
// Purpose: One fail-closed place to parse the env vars listed in §6, so the
//          policy gate and run worker never read `std::env` directly.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Configuration is read once at process startup into an immutable
//! [`Config`] and passed down by reference or `Arc`. This is the one
//! deliberate piece of global mutable *state* the design allows (§9): the
//! kill switch, enforcement mode, and quota limits live here rather than as
//! ad-hoc singletons elsewhere.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {var}: {value}")]
    Invalid {
        /// Name of the offending environment variable.
        var: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Process-wide policy enforcement mode, mirrored from
/// [`acp_core::EnforcementMode`] so this crate stays dependency-free of
/// `acp-core`'s wider surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Negative decisions are recorded but never block execution.
    Shadow,
    /// Negative decisions block execution.
    Enforce,
}

/// Full process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Policy gate enforcement mode.
    pub policy_enforcement_mode: EnforcementMode,
    /// Global kill switch for `external.write` actions.
    pub external_write_kill_switch: bool,
    /// Maximum egress requests per principal per rolling hour.
    pub egress_max_requests_per_hour: u32,
    /// Master key enabling the secrets vault; when absent the vault is
    /// disabled and DLP masking still runs but nothing is escrowed.
    pub secrets_master_key: Option<String>,
    /// Whether to embed the Runtime Worker loop in this process.
    pub run_worker_embedded: bool,
    /// Runtime Worker poll interval.
    pub run_worker_poll_interval: Duration,
    /// Maximum runs the worker claims per poll cycle.
    pub run_worker_batch_limit: u32,
    /// Workspace the embedded worker operates within.
    pub run_worker_workspace_id: Option<String>,
    /// Lease time-to-live granted on claim and refreshed on heartbeat.
    pub run_lease_ttl: Duration,
    /// Whether an authenticated session is required (vs. the legacy header).
    pub auth_require_session: bool,
    /// Whether the legacy `x-workspace-id` header is accepted without a
    /// session.
    pub auth_allow_legacy_workspace_header: bool,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `DATABASE_URL` is missing or any
    /// supplied variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require_env("DATABASE_URL")?;
        let policy_enforcement_mode = match optional_env("POLICY_ENFORCEMENT_MODE").as_deref() {
            None | Some("enforce") => EnforcementMode::Enforce,
            Some("shadow") => EnforcementMode::Shadow,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "POLICY_ENFORCEMENT_MODE",
                    value: other.to_string(),
                });
            }
        };
        let external_write_kill_switch = parse_bool_flag("EXTERNAL_WRITE_KILL_SWITCH", false)?;
        let egress_max_requests_per_hour =
            parse_env_or("EGRESS_MAX_REQUESTS_PER_HOUR", 1_000u32)?;
        let secrets_master_key = optional_env("SECRETS_MASTER_KEY");
        let run_worker_embedded = parse_bool_flag("RUN_WORKER_EMBEDDED", false)?;
        let run_worker_poll_ms: u64 = parse_env_or("RUN_WORKER_POLL_MS", 1_000u64)?;
        let run_worker_batch_limit = parse_env_or("RUN_WORKER_BATCH_LIMIT", 10u32)?;
        let run_worker_workspace_id = optional_env("RUN_WORKER_WORKSPACE_ID");
        let run_lease_ttl_ms: u64 = parse_env_or("RUN_LEASE_TTL_MS", 30_000u64)?;
        let auth_require_session = parse_bool_flag("AUTH_REQUIRE_SESSION", false)?;
        let auth_allow_legacy_workspace_header =
            parse_bool_flag("AUTH_ALLOW_LEGACY_WORKSPACE_HEADER", true)?;

        Ok(Self {
            database_url,
            policy_enforcement_mode,
            external_write_kill_switch,
            egress_max_requests_per_hour,
            secrets_master_key,
            run_worker_embedded,
            run_worker_poll_interval: Duration::from_millis(run_worker_poll_ms),
            run_worker_batch_limit,
            run_worker_workspace_id,
            run_lease_ttl: Duration::from_millis(run_lease_ttl_ms),
            auth_require_session,
            auth_allow_legacy_workspace_header,
        })
    }
}

fn require_env(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn optional_env(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.is_empty())
}

fn parse_bool_flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(var).as_deref() {
        None => Ok(default),
        Some("1") => Ok(true),
        Some("0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
        }),
    }
}

fn parse_env_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match optional_env(var) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            var,
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for var in [
            "DATABASE_URL",
            "POLICY_ENFORCEMENT_MODE",
            "EXTERNAL_WRITE_KILL_SWITCH",
            "EGRESS_MAX_REQUESTS_PER_HOUR",
            "SECRETS_MASTER_KEY",
            "RUN_WORKER_EMBEDDED",
            "RUN_WORKER_POLL_MS",
            "RUN_WORKER_BATCH_LIMIT",
            "RUN_WORKER_WORKSPACE_ID",
            "RUN_LEASE_TTL_MS",
            "AUTH_REQUIRE_SESSION",
            "AUTH_ALLOW_LEGACY_WORKSPACE_HEADER",
        ] {
            // SAFETY boundary note: tests are single-process and serialized
            // via `ENV_LOCK`, so concurrent mutation of the environment is
            // not possible across these cases.
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    fn missing_database_url_fails_closed() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_all();
        let err = Config::from_env().expect_err("must fail without DATABASE_URL");
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn defaults_are_enforce_mode_and_no_kill_switch() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_all();
        unsafe { env::set_var("DATABASE_URL", "postgres://localhost/acp") };
        let config = Config::from_env().expect("load config");
        assert_eq!(config.policy_enforcement_mode, EnforcementMode::Enforce);
        assert!(!config.external_write_kill_switch);
        assert!(!config.run_worker_embedded);
    }

    #[test]
    fn invalid_enforcement_mode_is_rejected() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_all();
        unsafe { env::set_var("DATABASE_URL", "postgres://localhost/acp") };
        unsafe { env::set_var("POLICY_ENFORCEMENT_MODE", "loud") };
        let err = Config::from_env().expect_err("must reject unknown mode");
        assert!(matches!(err, ConfigError::Invalid { var: "POLICY_ENFORCEMENT_MODE", .. }));
    }

    #[test]
    fn kill_switch_flag_parses_numeric_boolean() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_all();
        unsafe { env::set_var("DATABASE_URL", "postgres://localhost/acp") };
        unsafe { env::set_var("EXTERNAL_WRITE_KILL_SWITCH", "1") };
        let config = Config::from_env().expect("load config");
        assert!(config.external_write_kill_switch);
    }
}
