use anyhow::Result;
use async_trait::async_trait;

use crate::config::ConsoleConfig;
use crate::types::{Alert, AnomalyKind, Severity};
use super::{parse_severity_filter, AlertChannel};

const RESET: &str = "\x1b[0m";

/// Prints alerts to stdout, coloured by anomaly kind
pub struct ConsoleChannel {
    severity_filter: Vec<Severity>,
}

impl ConsoleChannel {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self { severity_filter: parse_severity_filter(&config.severity_filter) }
    }

    fn kind_color(kind: AnomalyKind) -> &'static str {
        match kind {
            AnomalyKind::BruteForce | AnomalyKind::SuspiciousUser => "\x1b[91m",
            AnomalyKind::DistributedAttack => "\x1b[95m",
            AnomalyKind::ErrorThreshold => "\x1b[93m",
        }
    }

    fn render(alert: &Alert) -> String {
        format!(
            "{}[{}] {} {} on {} ({})\n  {}{}",
            Self::kind_color(alert.kind),
            alert.severity,
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            alert.kind,
            alert.hostname,
            alert.source,
            alert.message,
            RESET,
        )
    }
}

#[async_trait]
impl AlertChannel for ConsoleChannel {
    fn name(&self) -> &str { "console" }

    fn accepts_severity(&self, severity: &Severity) -> bool {
        self.severity_filter.is_empty() || self.severity_filter.contains(severity)
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        println!("{}", Self::render(alert));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Finding;

    #[test]
    fn renders_kind_source_and_message() {
        let alert = Alert::from_finding(
            Finding::DistributedAttack { unique_ips: 6, total_errors: 14 },
            "/var/log/secure",
            "gw-1",
        );
        let text = ConsoleChannel::render(&alert);
        assert!(text.starts_with("\x1b[95m[CRITICAL]"));
        assert!(text.contains("distributed_attack on gw-1 (/var/log/secure)"));
        assert!(text.contains("6 unique ips, 14 total errors"));
        assert!(text.ends_with(RESET));
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let all = ConsoleChannel::new(&ConsoleConfig::default());
        assert!(all.accepts_severity(&Severity::Info));
        assert!(all.accepts_severity(&Severity::Critical));

        let critical_only = ConsoleChannel::new(&ConsoleConfig {
            enabled: true,
            severity_filter: vec!["critical".into()],
        });
        assert!(!critical_only.accepts_severity(&Severity::Warn));
        assert!(critical_only.accepts_severity(&Severity::Critical));
    }
}
