use anyhow::{Context, Result};
use regex::Regex;

use crate::types::Metadata;

/// Strategy for pulling ip/user/service/pid out of a free-text message.
///
/// Extraction is best effort: a miss leaves the field empty and never
/// prevents the event from being counted.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, message: &str) -> Metadata;
}

/// Regex heuristics tuned for authentication log phrasing
pub struct RegexExtractor {
    ip: Regex,
    users: Vec<Regex>,
    service: Regex,
}

impl RegexExtractor {
    pub fn new() -> Result<Self> {
        // Dotted quad only, octets are not range checked
        let ip = Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b")
            .context("Failed to compile ip pattern")?;

        // Tried in order, first hit wins
        let users = [r"user (\w+)", r"for (\w+) from", r"(\w+)@"]
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Failed to compile user pattern {}", p)))
            .collect::<Result<Vec<_>>>()?;

        let service = Regex::new(r"(\w+)\[(\d+)\]")
            .context("Failed to compile service pattern")?;

        Ok(Self { ip, users, service })
    }
}

impl MetadataExtractor for RegexExtractor {
    fn extract(&self, message: &str) -> Metadata {
        let mut metadata = Metadata::default();

        if let Some(m) = self.ip.find(message) {
            metadata.ip = Some(m.as_str().to_string());
        }

        metadata.user = self.users.iter()
            .find_map(|re| re.captures(message))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        if let Some(caps) = self.service.captures(message) {
            if let (Some(name), Some(pid)) = (caps.get(1), caps.get(2)) {
                metadata.service = Some(name.as_str().to_string());
                metadata.pid = Some(pid.as_str().to_string());
            }
        }

        metadata
    }
}
