use std::collections::BTreeMap;

use serde::Serialize;

use crate::window::SlidingWindow;

/// Point-in-time view of a window, for logs and telemetry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub total_events: usize,
    pub level_counts: BTreeMap<String, usize>,
    pub distinct_ips: usize,
    pub distinct_users: usize,
    pub window_minutes: f64,
}

impl WindowStats {
    /// Read the window without modifying it
    pub fn capture(window: &SlidingWindow) -> Self {
        Self {
            total_events: window.len(),
            level_counts: window.level_counts()
                .iter()
                .map(|(level, count)| (level.clone(), *count))
                .collect(),
            distinct_ips: window.ip_index().len(),
            distinct_users: window.user_index().len(),
            window_minutes: window.window().num_seconds() as f64 / 60.0,
        }
    }
}
