use crate::types::Finding;
use crate::window::SlidingWindow;
use super::Rule;

/// Many distinct ips failing at once.
///
/// Fires when the number of tracked ips reaches `min_ips` and the ERROR
/// entries summed over all of them reach `min_total_errors`. Ips with no
/// errors still count toward `min_ips`.
pub struct DistributedAttackRule {
    min_ips: usize,
    min_total_errors: usize,
}

impl DistributedAttackRule {
    pub fn new(min_ips: usize, min_total_errors: usize) -> Self {
        Self { min_ips, min_total_errors }
    }
}

impl Rule for DistributedAttackRule {
    fn name(&self) -> &str { "distributed_attack" }

    fn evaluate(&self, window: &SlidingWindow) -> Vec<Finding> {
        let index = window.ip_index();
        let unique_ips = index.len();
        if unique_ips < self.min_ips {
            return Vec::new();
        }

        let total_errors: usize = index.values()
            .map(|entries| entries.iter().filter(|e| e.is_error()).count())
            .sum();
        if total_errors < self.min_total_errors {
            return Vec::new();
        }

        vec![Finding::DistributedAttack { unique_ips, total_errors }]
    }
}
