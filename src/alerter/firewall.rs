use std::net::Ipv4Addr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::FirewallConfig;
use crate::types::{Alert, AnomalyKind, Finding, Severity};
use super::AlertChannel;

/// Blocks brute-force source addresses with an iptables DROP rule
pub struct FirewallChannel {
    command: String,
    chain: String,
    dry_run: bool,
}

impl FirewallChannel {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            command: config.command.clone(),
            chain: config.chain.clone(),
            dry_run: config.dry_run,
        }
    }

    fn rule_args<'a>(&'a self, op: &'a str, ip: &'a str) -> [&'a str; 6] {
        [op, self.chain.as_str(), "-s", ip, "-j", "DROP"]
    }

    async fn run(&self, op: &str, ip: &str) -> Result<std::process::Output> {
        tokio::process::Command::new(&self.command)
            .args(self.rule_args(op, ip))
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.command))
    }
}

#[async_trait]
impl AlertChannel for FirewallChannel {
    fn name(&self) -> &str { "firewall" }

    fn accepts_severity(&self, _severity: &Severity) -> bool { true }

    fn accepts(&self, alert: &Alert) -> bool {
        alert.kind == AnomalyKind::BruteForce
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let Finding::BruteForce { ref ip, .. } = alert.finding else {
            return Ok(());
        };
        // The extractor does not range check octets
        if ip.parse::<Ipv4Addr>().is_err() {
            bail!("Refusing to block malformed address {}", ip);
        }

        if self.dry_run {
            tracing::info!(ip = %ip, chain = %self.chain, "Dry run: would block address");
            return Ok(());
        }

        if self.run("-C", ip).await?.status.success() {
            tracing::info!(ip = %ip, "Address already blocked");
            return Ok(());
        }

        let output = self.run("-A", ip).await?;
        if !output.status.success() {
            bail!(
                "{} failed to block {}: {}",
                self.command,
                ip,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        tracing::warn!(ip = %ip, chain = %self.chain, "Blocked address");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(command: &str, dry_run: bool) -> FirewallChannel {
        FirewallChannel::new(&FirewallConfig {
            enabled: true,
            command: command.into(),
            chain: "INPUT".into(),
            dry_run,
        })
    }

    fn brute_force(ip: &str) -> Alert {
        Alert::from_finding(
            Finding::BruteForce { ip: ip.into(), failed_attempts: 12, threshold: 10 },
            "/var/log/auth.log",
            "host-a",
        )
    }

    #[test]
    fn only_brute_force_is_accepted() {
        let fw = channel("iptables", true);
        assert!(fw.accepts(&brute_force("10.0.0.5")));
        let other = Alert::from_finding(
            Finding::DistributedAttack { unique_ips: 5, total_errors: 10 },
            "/var/log/auth.log",
            "host-a",
        );
        assert!(!fw.accepts(&other));
    }

    #[test]
    fn builds_drop_rule() {
        let fw = channel("iptables", false);
        assert_eq!(fw.rule_args("-A", "10.0.0.5"), ["-A", "INPUT", "-s", "10.0.0.5", "-j", "DROP"]);
    }

    #[tokio::test]
    async fn dry_run_does_not_execute() {
        let fw = channel("/nonexistent/iptables", true);
        fw.send(&brute_force("10.0.0.5")).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_malformed_address() {
        let fw = channel("/nonexistent/iptables", true);
        assert!(fw.send(&brute_force("999.1.1.1")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_rule_is_left_alone() {
        // `true` succeeds on the -C check
        let fw = channel("true", false);
        fw.send(&brute_force("10.0.0.5")).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_block_is_reported() {
        let fw = channel("false", false);
        assert!(fw.send(&brute_force("10.0.0.5")).await.is_err());
    }
}
