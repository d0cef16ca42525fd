pub mod threshold;
pub mod brute_force;
pub mod distributed;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::DetectorConfig;
use crate::types::{AnomalyKind, Finding};
use crate::window::{KeyIndex, SlidingWindow};

/// Failed attempts per user that mark it suspicious
pub const SUSPICIOUS_USER_ERRORS: usize = 3;

/// Aggregate failures across all tracked ips needed for a distributed attack
pub const DISTRIBUTED_ATTACK_TOTAL_ERRORS: usize = 10;

/// A single classification rule.
///
/// Rules are pure: they read the window and return findings, nothing else.
pub trait Rule: Send + Sync {
    /// Human-readable name for this rule
    fn name(&self) -> &str;

    /// Evaluate the window, returning one finding per qualifying subject
    fn evaluate(&self, window: &SlidingWindow) -> Vec<Finding>;
}

/// Findings of one classification pass, grouped by kind.
///
/// A kind is present only if its rule fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Findings {
    by_kind: BTreeMap<AnomalyKind, Vec<Finding>>,
}

impl Findings {
    pub fn push(&mut self, finding: Finding) {
        self.by_kind.entry(finding.kind()).or_default().push(finding);
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Total number of findings across kinds
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn contains(&self, kind: AnomalyKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn get(&self, kind: AnomalyKind) -> &[Finding] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = AnomalyKind> + '_ {
        self.by_kind.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.by_kind.values().flatten()
    }
}

impl IntoIterator for Findings {
    type Item = Finding;
    type IntoIter = std::iter::Flatten<std::collections::btree_map::IntoValues<AnomalyKind, Vec<Finding>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_kind.into_values().flatten()
    }
}

/// Runs every configured rule against a window
pub struct Classifier {
    rules: Vec<Box<dyn Rule>>,
}

impl Classifier {
    pub fn new(config: &DetectorConfig) -> Self {
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(threshold::ErrorThresholdRule::new(config.error_threshold)),
            Box::new(brute_force::BruteForceRule::new(config.brute_force_threshold)),
            Box::new(brute_force::SuspiciousUserRule::new(SUSPICIOUS_USER_ERRORS)),
            Box::new(distributed::DistributedAttackRule::new(
                config.suspicious_ip_count,
                DISTRIBUTED_ATTACK_TOTAL_ERRORS,
            )),
        ];

        tracing::debug!(
            rules = ?rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            "Initialized classifier"
        );
        Self { rules }
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Evaluate all rules. Calling this twice without an intervening add
    /// returns identical results.
    pub fn check(&self, window: &SlidingWindow) -> Findings {
        let mut findings = Findings::default();
        for rule in &self.rules {
            for finding in rule.evaluate(window) {
                findings.push(finding);
            }
        }
        findings
    }
}

/// ERROR entries per key, sorted by key
pub(crate) fn error_counts(index: &KeyIndex) -> Vec<(&str, usize)> {
    let mut counts: Vec<(&str, usize)> = index.iter()
        .map(|(key, entries)| (key.as_str(), entries.iter().filter(|e| e.is_error()).count()))
        .collect();
    counts.sort_unstable_by(|a, b| a.0.cmp(b.0));
    counts
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Event, Metadata};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    pub(crate) fn error_from(secs: i64, ip: Option<&str>, user: Option<&str>) -> Event {
        Event::new(at(secs), "ERROR", Metadata {
            ip: ip.map(String::from),
            user: user.map(String::from),
            ..Default::default()
        })
    }

    fn window() -> SlidingWindow {
        SlidingWindow::new(Duration::minutes(5))
    }

    #[test]
    fn empty_window_has_no_findings() {
        let classifier = Classifier::new(&DetectorConfig::default());
        assert!(classifier.check(&window()).is_empty());
    }

    #[test]
    fn error_threshold_boundary() {
        let classifier = Classifier::new(&DetectorConfig::default());
        let mut w = window();
        for i in 0..4 {
            w.add(error_from(i, None, None));
        }
        assert!(!classifier.check(&w).contains(AnomalyKind::ErrorThreshold));

        w.add(error_from(4, None, None));
        let findings = classifier.check(&w);
        assert_eq!(
            findings.get(AnomalyKind::ErrorThreshold),
            &[Finding::ErrorThreshold { count: 5, threshold: 5 }]
        );
    }

    #[test]
    fn check_is_idempotent() {
        let classifier = Classifier::new(&DetectorConfig::default());
        let mut w = window();
        for i in 0..12 {
            let ip = format!("10.0.0.{}", i % 6);
            w.add(error_from(i, Some(ip.as_str()), Some("root")));
        }
        let first = classifier.check(&w);
        let second = classifier.check(&w);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn multiple_kinds_fire_together() {
        let classifier = Classifier::new(&DetectorConfig::default());
        let mut w = window();
        for i in 0..10 {
            w.add(error_from(i, Some("10.0.0.5"), Some("admin")));
        }
        let findings = classifier.check(&w);
        let kinds: Vec<_> = findings.kinds().collect();
        assert_eq!(kinds, vec![
            AnomalyKind::ErrorThreshold,
            AnomalyKind::BruteForce,
            AnomalyKind::SuspiciousUser,
        ]);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings.clone().into_iter().count(), 3);
    }

    #[test]
    fn non_error_levels_do_not_count() {
        let classifier = Classifier::new(&DetectorConfig::default());
        let mut w = window();
        for i in 0..20 {
            w.add(Event::new(at(i), "WARN", Metadata {
                ip: Some("10.0.0.1".into()),
                user: Some("root".into()),
                ..Default::default()
            }));
        }
        assert!(classifier.check(&w).is_empty());
    }

    #[test]
    fn custom_rule_set() {
        struct Always;
        impl Rule for Always {
            fn name(&self) -> &str { "always" }
            fn evaluate(&self, _: &SlidingWindow) -> Vec<Finding> {
                vec![Finding::DistributedAttack { unique_ips: 0, total_errors: 0 }]
            }
        }
        let classifier = Classifier::with_rules(vec![Box::new(Always)]);
        assert!(classifier.check(&window()).contains(AnomalyKind::DistributedAttack));
    }
}
