use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::WebhookConfig;
use crate::types::{Alert, Severity};
use super::{parse_severity_filter, AlertChannel};

/// Custom webhook alert channel
pub struct WebhookChannel {
    url: String,
    method: reqwest::Method,
    headers: std::collections::HashMap<String, String>,
    severity_filter: Vec<Severity>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let method = reqwest::Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid webhook method: {}", config.method))?;

        Ok(Self {
            url: config.url.clone(),
            method,
            headers: config.headers.clone(),
            severity_filter: parse_severity_filter(&config.severity_filter),
            client: reqwest::Client::new(),
        })
    }

    fn payload(alert: &Alert) -> serde_json::Value {
        json!({
            "hostname": &alert.hostname,
            "source": &alert.source,
            "kind": alert.kind.to_string(),
            "severity": alert.severity.to_string(),
            "message": &alert.message,
            "details": &alert.finding,
            "labels": &alert.labels,
            "timestamp": alert.timestamp.to_rfc3339(),
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str { "webhook" }

    fn accepts_severity(&self, severity: &Severity) -> bool {
        self.severity_filter.is_empty() || self.severity_filter.contains(severity)
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let mut req = self.client
            .request(self.method.clone(), &self.url)
            .json(&Self::payload(alert));
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        req.send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Finding;

    fn config(method: &str) -> WebhookConfig {
        WebhookConfig {
            enabled: true,
            url: "http://127.0.0.1:9/hook".into(),
            method: method.into(),
            headers: Default::default(),
            severity_filter: vec![],
        }
    }

    #[test]
    fn payload_includes_finding_details() {
        let alert = Alert::from_finding(
            Finding::SuspiciousUser { user: "root".into(), failed_attempts: 4 },
            "/var/log/auth.log",
            "host-a",
        );
        let payload = WebhookChannel::payload(&alert);
        assert_eq!(payload["kind"], "suspicious_user");
        assert_eq!(payload["severity"], "WARN");
        assert_eq!(payload["details"]["user"], "root");
        assert_eq!(payload["details"]["failed_attempts"], 4);
        assert_eq!(payload["labels"][0]["value"], "root");
    }

    #[test]
    fn method_is_normalized() {
        let channel = WebhookChannel::new(&config("put")).unwrap();
        assert_eq!(channel.method, reqwest::Method::PUT);
        assert!(WebhookChannel::new(&config("BAD METHOD")).is_err());
    }
}
