use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

fn default_stop_timeout_millis() -> u64 {
    30_000
}

fn default_command_workers_limit() -> usize {
    5
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_geometric_ratio() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_max_attempts() -> u32 {
    10
}

fn default_send_failed_reply_frequency_minutes() -> u64 {
    5
}

fn default_failed_reply_processing_limit() -> usize {
    50
}

fn default_ws_write_buffer_limit_bytes() -> usize {
    64 * 1024 - 4_000
}

fn default_ack_backoff_seconds() -> u64 {
    5
}

fn default_data_store_root() -> PathBuf {
    PathBuf::from("/var/lib/mediation-agent")
}

fn default_session_submit_retry_attempts() -> u32 {
    5
}

fn default_session_submit_retry_interval_ms() -> u64 {
    1_000
}

fn default_audit_log_interval_seconds() -> u64 {
    60
}

/// Layered configuration, assembled by the embedding host from defaults, a
/// config file, and environment overrides via the `config` crate — the core
/// crate itself only defines the shape and its defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub mgs: MgsConfig,
    pub mds: MdsConfig,
    pub agent: AgentRuntimeConfig,
    pub retry: RetryConfig,
    pub durability: DurabilityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mgs: MgsConfig::default(),
            mds: MdsConfig::default(),
            agent: AgentRuntimeConfig::default(),
            retry: RetryConfig::default(),
            durability: DurabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MgsConfig {
    pub region: String,
    pub endpoint: Option<String>,
    #[serde(default = "default_stop_timeout_millis")]
    pub stop_timeout_millis: u64,
}

impl Default for MgsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            stop_timeout_millis: default_stop_timeout_millis(),
        }
    }
}

impl MgsConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MdsConfig {
    /// Reply-worker concurrency ceiling (§6 `Mds.CommandWorkersLimit`,
    /// §4.4's `replyQueueLimit`) — the only knob that sizes the reply
    /// pipeline's worker pool.
    #[serde(default = "default_command_workers_limit")]
    pub command_workers_limit: usize,
}

impl Default for MdsConfig {
    fn default() -> Self {
        Self {
            command_workers_limit: default_command_workers_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentRuntimeConfig {
    pub container_mode: bool,
    #[serde(default = "default_session_submit_retry_attempts")]
    pub session_submit_retry_attempts: u32,
    #[serde(default = "default_session_submit_retry_interval_ms")]
    pub session_submit_retry_interval_ms: u64,
    /// Cadence of the control channel's audit-log scheduler (§4.3), started
    /// once the `OpenControlChannel` handshake completes.
    #[serde(default = "default_audit_log_interval_seconds")]
    pub audit_log_interval_seconds: u64,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            container_mode: false,
            session_submit_retry_attempts: default_session_submit_retry_attempts(),
            session_submit_retry_interval_ms: default_session_submit_retry_interval_ms(),
            audit_log_interval_seconds: default_audit_log_interval_seconds(),
        }
    }
}

impl AgentRuntimeConfig {
    pub fn session_submit_retry_interval(&self) -> Duration {
        Duration::from_millis(self.session_submit_retry_interval_ms)
    }

    pub fn audit_log_interval(&self) -> Duration {
        Duration::from_secs(self.audit_log_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_geometric_ratio")]
    pub geometric_ratio: f64,
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            geometric_ratio: default_geometric_ratio(),
            jitter_ratio: default_jitter_ratio(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DurabilityConfig {
    #[serde(default = "default_send_failed_reply_frequency_minutes")]
    pub send_failed_reply_frequency_minutes: u64,
    #[serde(default = "default_failed_reply_processing_limit")]
    pub failed_reply_processing_limit: usize,
    #[serde(default = "default_ws_write_buffer_limit_bytes")]
    pub ws_write_buffer_limit_bytes: usize,
    /// How long a reply worker awaits an ack before retrying or giving up
    /// (§4.4 step 4, `backOffSeconds`).
    #[serde(default = "default_ack_backoff_seconds")]
    pub ack_backoff_seconds: u64,
    /// Root of the embedding host's data store; the failed-reply directory
    /// lives at `<data_store_root>/<short-instance-id>/replies-mgs/` (§6).
    #[serde(default = "default_data_store_root")]
    pub data_store_root: PathBuf,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            send_failed_reply_frequency_minutes: default_send_failed_reply_frequency_minutes(),
            failed_reply_processing_limit: default_failed_reply_processing_limit(),
            ws_write_buffer_limit_bytes: default_ws_write_buffer_limit_bytes(),
            ack_backoff_seconds: default_ack_backoff_seconds(),
            data_store_root: default_data_store_root(),
        }
    }
}

impl DurabilityConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.send_failed_reply_frequency_minutes * 60)
    }

    pub fn ack_backoff(&self) -> Duration {
        Duration::from_secs(self.ack_backoff_seconds)
    }

    /// `<data_store_root>/<short-instance-id>/replies-mgs/` (§6 Persisted
    /// state layout).
    pub fn failed_reply_dir(&self, short_instance_id: &str) -> PathBuf {
        self.data_store_root.join(short_instance_id).join("replies-mgs")
    }
}

/// Loads configuration the way the host process does: defaults, then an
/// optional file, then environment variables prefixed `AGENT_` with `__`
/// as the nesting separator (e.g. `AGENT_MGS__REGION`).
pub fn load(config_file: Option<&str>) -> anyhow::Result<AgentConfig> {
    let mut builder = ::config::Config::builder().add_source(::config::Config::try_from(&AgentConfig::default())?);
    if let Some(path) = config_file {
        builder = builder.add_source(::config::File::with_name(path));
    }
    builder = builder.add_source(::config::Environment::with_prefix("AGENT").separator("__"));
    let settings = builder.build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_provide_bounded_values() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.mgs.region, "us-east-1");
        assert_eq!(cfg.mds.command_workers_limit, 5);
        assert_eq!(cfg.retry.max_attempts, 10);
        assert!(!cfg.agent.container_mode);
    }

    #[test]
    fn ws_write_buffer_limit_leaves_safety_margin() {
        let cfg = DurabilityConfig::default();
        assert_eq!(cfg.ws_write_buffer_limit_bytes, 64 * 1024 - 4_000);
    }

    #[test]
    fn failed_reply_dir_is_scoped_by_instance_id() {
        let cfg = DurabilityConfig::default();
        let dir = cfg.failed_reply_dir("mi-0123456789abcdef0");
        assert_eq!(dir, cfg.data_store_root.join("mi-0123456789abcdef0").join("replies-mgs"));
    }

    #[test]
    fn session_submit_retry_defaults_match_spec() {
        let cfg = AgentRuntimeConfig::default();
        assert_eq!(cfg.session_submit_retry_attempts, 5);
        assert_eq!(cfg.session_submit_retry_interval(), Duration::from_secs(1));
    }
}
