use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::Deserialize;

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { hostname: default_hostname(), log_level: default_log_level() }
    }
}

/// Window and classifier settings, fixed for the lifetime of a monitor
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: usize,
    #[serde(default = "default_brute_force_threshold")]
    pub brute_force_threshold: usize,
    #[serde(default = "default_suspicious_ip_count")]
    pub suspicious_ip_count: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_minutes: 5,
            error_threshold: 5,
            brute_force_threshold: 10,
            suspicious_ip_count: 5,
        }
    }
}

impl DetectorConfig {
    pub fn window(&self) -> Duration {
        Duration::minutes(i64::from(self.window_minutes))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    /// Also watch the standard system logs that exist on this host
    #[serde(default)]
    pub all: bool,
    /// Read existing file content instead of starting at the end
    #[serde(default)]
    pub from_start: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            paths: vec![],
            all: false,
            from_start: false,
            poll_interval_ms: 1000,
            stats_interval_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertingConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    pub export_path: Option<String>,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub firewall: Option<FirewallConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            history_limit: 1000,
            export_path: None,
            console: ConsoleConfig::default(),
            webhook: None,
            firewall: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub severity_filter: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true, severity_filter: vec![] }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    #[serde(default = "default_post")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub severity_filter: Vec<String>,
}

/// Automatic blocking of brute-force sources
#[derive(Debug, Deserialize, Clone)]
pub struct FirewallConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_firewall_command")]
    pub command: String,
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_firewall_command(),
            chain: default_chain(),
            dry_run: false,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        // Expand environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if d.window_minutes == 0 {
            bail!("detector.window_minutes must be at least 1");
        }
        if d.error_threshold == 0 || d.brute_force_threshold == 0 || d.suspicious_ip_count == 0 {
            bail!("detector thresholds must be at least 1");
        }
        if self.sources.poll_interval_ms == 0 || self.sources.stats_interval_secs == 0 {
            bail!("sources intervals must be non-zero");
        }
        if self.alerting.history_limit == 0 {
            bail!("alerting.history_limit must be at least 1");
        }
        if let Some(ref wh) = self.alerting.webhook {
            if wh.enabled && wh.url.is_empty() {
                bail!("alerting.webhook.url is required when the webhook is enabled");
            }
        }
        Ok(())
    }
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .context("Failed to compile env var pattern")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string())
}

// Default value functions
fn default_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
fn default_log_level() -> String { "info".to_string() }
fn default_window_minutes() -> u32 { 5 }
fn default_error_threshold() -> usize { 5 }
fn default_brute_force_threshold() -> usize { 10 }
fn default_suspicious_ip_count() -> usize { 5 }
fn default_poll_interval() -> u64 { 1000 }
fn default_stats_interval() -> u64 { 30 }
fn default_history_limit() -> usize { 1000 }
fn default_true() -> bool { true }
fn default_post() -> String { "POST".to_string() }
fn default_firewall_command() -> String { "iptables".to_string() }
fn default_chain() -> String { "INPUT".to_string() }
