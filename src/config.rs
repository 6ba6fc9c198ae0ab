use std::path::PathBuf;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
    // Future: PostgreSQL, etc.
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./uptime.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to ./uptime.db)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub checker: CheckerConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_scheduler_tick")]
    pub tick_secs: u64,

    /// Grace window absorbing timer jitter, so a slightly-early tick
    /// does not skip monitors
    #[serde(default = "default_grace")]
    pub grace_secs: u64,

    /// Monitors per queue message
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_scheduler_tick(),
            grace_secs: default_grace(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_scheduler_tick() -> u64 {
    60
}

fn default_grace() -> u64 {
    30
}

fn default_batch_size() -> usize {
    4
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckerConfig {
    /// Seconds between queue polls
    #[serde(default = "default_poll")]
    pub poll_secs: u64,

    /// Messages pulled per poll
    #[serde(default = "default_receive_limit")]
    pub receive_limit: usize,

    /// Per-probe deadline covering the whole redirect chain
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Fixed wait before the single retry of a transient failure
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Maximum redirect hops before giving up
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// TTL for buffered check-result batches
    #[serde(default = "default_batch_ttl")]
    pub batch_ttl_secs: u64,

    /// Soft per-message deadline; exceeded time is logged, in-flight
    /// probes are not cancelled
    #[serde(default = "default_message_timeout")]
    pub message_timeout_secs: u64,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll(),
            receive_limit: default_receive_limit(),
            probe_timeout_secs: default_probe_timeout(),
            retry_backoff_secs: default_retry_backoff(),
            max_redirects: default_max_redirects(),
            batch_ttl_secs: default_batch_ttl(),
            message_timeout_secs: default_message_timeout(),
        }
    }
}

fn default_poll() -> u64 {
    1
}

fn default_receive_limit() -> usize {
    16
}

fn default_probe_timeout() -> u64 {
    15
}

fn default_retry_backoff() -> u64 {
    20
}

fn default_max_redirects() -> usize {
    8
}

fn default_batch_ttl() -> u64 {
    300
}

fn default_message_timeout() -> u64 {
    45
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AggregatorConfig {
    /// Seconds between aggregator ticks; kept shorter than the scheduler
    /// tick so the ephemeral-store backlog stays small
    #[serde(default = "default_aggregator_tick")]
    pub tick_secs: u64,

    /// Minimum age of an alert marker before recovery evidence may
    /// clear it
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_minutes: i64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_aggregator_tick(),
            alert_cooldown_minutes: default_alert_cooldown(),
        }
    }
}

fn default_aggregator_tick() -> u64 {
    30
}

fn default_alert_cooldown() -> i64 {
    120
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the mail provider (Resend-compatible)
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,

    /// From header for alert mail
    #[serde(default = "default_mail_from")]
    pub from: String,

    /// Link target for the "view history" button in alert mail
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    /// Mails sent concurrently per batch
    #[serde(default = "default_mail_batch_size")]
    pub batch_size: usize,

    /// Pause between batches, respecting provider rate limits
    #[serde(default = "default_mail_pacing")]
    pub pacing_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: default_mail_api_url(),
            from: default_mail_from(),
            dashboard_url: default_dashboard_url(),
            batch_size: default_mail_batch_size(),
            pacing_ms: default_mail_pacing(),
        }
    }
}

fn default_mail_api_url() -> String {
    String::from("https://api.resend.com/emails")
}

fn default_mail_from() -> String {
    String::from("Uptime Monitoring <notifications@localhost>")
}

fn default_dashboard_url() -> String {
    String::from("http://localhost:3000/dashboard")
}

fn default_mail_batch_size() -> usize {
    2
}

fn default_mail_pacing() -> u64 {
    1000
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
