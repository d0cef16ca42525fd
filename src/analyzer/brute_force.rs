use crate::types::Finding;
use crate::window::SlidingWindow;
use super::{error_counts, Rule};

/// Fires once for every ip whose windowed ERROR count reaches the threshold.
pub struct BruteForceRule {
    threshold: usize,
}

impl BruteForceRule {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl Rule for BruteForceRule {
    fn name(&self) -> &str { "brute_force" }

    fn evaluate(&self, window: &SlidingWindow) -> Vec<Finding> {
        error_counts(window.ip_index())
            .into_iter()
            .filter(|&(_, failed)| failed >= self.threshold)
            .map(|(ip, failed)| Finding::BruteForce {
                ip: ip.to_string(),
                failed_attempts: failed,
                threshold: self.threshold,
            })
            .collect()
    }
}

/// Fires once for every user with too many failures in the window.
pub struct SuspiciousUserRule {
    min_failures: usize,
}

impl SuspiciousUserRule {
    pub fn new(min_failures: usize) -> Self {
        Self { min_failures }
    }
}

impl Rule for SuspiciousUserRule {
    fn name(&self) -> &str { "suspicious_user" }

    fn evaluate(&self, window: &SlidingWindow) -> Vec<Finding> {
        error_counts(window.user_index())
            .into_iter()
            .filter(|&(_, failed)| failed >= self.min_failures)
            .map(|(user, failed)| Finding::SuspiciousUser {
                user: user.to_string(),
                failed_attempts: failed,
            })
            .collect()
    }
}
