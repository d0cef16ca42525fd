use crate::types::Finding;
use crate::window::SlidingWindow;
use super::Rule;

/// Fires when the global ERROR count in the window reaches the threshold.
pub struct ErrorThresholdRule {
    threshold: usize,
}

impl ErrorThresholdRule {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl Rule for ErrorThresholdRule {
    fn name(&self) -> &str { "error_threshold" }

    fn evaluate(&self, window: &SlidingWindow) -> Vec<Finding> {
        let count = window.error_count();
        if count < self.threshold {
            return Vec::new();
        }

        vec![Finding::ErrorThreshold { count, threshold: self.threshold }]
    }
}
