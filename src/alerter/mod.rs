pub mod console;
pub mod firewall;
pub mod webhook;

use std::collections::VecDeque;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use smallvec::{smallvec, SmallVec};

use crate::config::AlertingConfig;
use crate::types::{Alert, Finding, Label, Severity};

/// Trait for alert delivery channels
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Send a single alert
    async fn send(&self, alert: &Alert) -> Result<()>;

    /// Check if this channel accepts the given severity
    fn accepts_severity(&self, severity: &Severity) -> bool;

    /// Check if this channel wants the alert at all
    fn accepts(&self, alert: &Alert) -> bool {
        self.accepts_severity(&alert.severity)
    }
}

/// Parse `severity_filter` entries, ignoring unknown names
pub(crate) fn parse_severity_filter(filter: &[String]) -> Vec<Severity> {
    filter.iter()
        .filter_map(|s| match s.to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warn" => Some(Severity::Warn),
            "critical" => Some(Severity::Critical),
            _ => None,
        })
        .collect()
}

impl Alert {
    /// Build the alert for one finding raised on `source`
    pub fn from_finding(finding: Finding, source: &str, hostname: &str) -> Self {
        let labels: SmallVec<[Label; 4]> = match &finding {
            Finding::BruteForce { ip, .. } => smallvec![Label::new("ip", ip.as_str())],
            Finding::SuspiciousUser { user, .. } => smallvec![Label::new("user", user.as_str())],
            _ => smallvec![],
        };

        Self {
            timestamp: Utc::now(),
            severity: finding.severity(),
            kind: finding.kind(),
            message: describe(&finding),
            finding,
            source: source.to_string(),
            hostname: hostname.to_string(),
            labels,
        }
    }
}

fn describe(finding: &Finding) -> String {
    match finding {
        Finding::ErrorThreshold { count, threshold } => format!(
            "Error threshold exceeded: {} errors in window (threshold: {}). Investigate system errors",
            count, threshold
        ),
        Finding::BruteForce { ip, failed_attempts, threshold } => format!(
            "Brute force attack from {}: {} failed attempts (threshold: {}). Consider blocking {}",
            ip, failed_attempts, threshold, ip
        ),
        Finding::SuspiciousUser { user, failed_attempts } => format!(
            "Suspicious activity for user {}: {} failed attempts",
            user, failed_attempts
        ),
        Finding::DistributedAttack { unique_ips, total_errors } => format!(
            "Distributed attack: {} unique ips, {} total errors. Review firewall rules and consider rate limiting",
            unique_ips, total_errors
        ),
    }
}

/// Manages alert dispatch and keeps a bounded history of every alert seen.
///
/// Repeated alerts are delivered every time; there is no deduplication.
pub struct AlertManager {
    channels: Vec<Box<dyn AlertChannel>>,
    history: VecDeque<Alert>,
    history_limit: usize,
}

impl AlertManager {
    pub fn new(config: &AlertingConfig) -> Result<Self> {
        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();

        if config.console.enabled {
            channels.push(Box::new(console::ConsoleChannel::new(&config.console)));
        }

        if let Some(ref wc) = config.webhook {
            if wc.enabled {
                channels.push(Box::new(webhook::WebhookChannel::new(wc)?));
            }
        }

        if let Some(ref fc) = config.firewall {
            if fc.enabled {
                channels.push(Box::new(firewall::FirewallChannel::new(fc)));
            }
        }

        tracing::info!(channels = channels.len(), "Initialized alert channels");

        Ok(Self::with_channels(channels, config.history_limit))
    }

    pub fn with_channels(channels: Vec<Box<dyn AlertChannel>>, history_limit: usize) -> Self {
        Self {
            channels,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Record the alert and send it to every accepting channel.
    ///
    /// Channel failures are logged and do not stop delivery to the others.
    pub async fn dispatch(&mut self, alert: Alert) -> Result<()> {
        for channel in &self.channels {
            if channel.accepts(&alert) {
                if let Err(e) = channel.send(&alert).await {
                    tracing::error!(
                        channel = channel.name(),
                        kind = %alert.kind,
                        error = %e,
                        "Failed to send alert"
                    );
                }
            }
        }

        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(alert);

        Ok(())
    }

    /// The newest `limit` alerts, oldest first
    pub fn recent(&self, limit: usize) -> Vec<&Alert> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Write the alert history as pretty-printed JSON
    pub async fn export(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.history)
            .context("Failed to serialize alert history")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to export alerts to {}", path))?;
        Ok(())
    }
}
