pub mod parser;
pub mod window;
pub mod analyzer;
pub mod stats;
pub mod monitor;
pub mod tailer;
pub mod alerter;
pub mod config;

/// Common types used across modules
pub mod types {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    pub const LEVEL_ERROR: &str = "ERROR";
    pub const LEVEL_INFO: &str = "INFO";
    pub const LEVEL_DEBUG: &str = "DEBUG";

    /// Fields pulled out of a message. Each one is independently optional.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Metadata {
        pub ip: Option<String>,
        pub user: Option<String>,
        pub service: Option<String>,
        pub pid: Option<String>,
    }

    /// A single log event admitted to a window. Never mutated after creation.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct Event {
        pub timestamp: DateTime<Utc>,
        /// Free-form severity token, e.g. "ERROR" or whatever the producer emits.
        pub level: String,
        pub metadata: Metadata,
    }

    impl Event {
        pub fn new(timestamp: DateTime<Utc>, level: impl Into<String>, metadata: Metadata) -> Self {
            Self { timestamp, level: level.into(), metadata }
        }

        pub fn is_error(&self) -> bool {
            self.level == LEVEL_ERROR
        }
    }

    /// Output of the line parser: the event plus the message it was built from
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ParsedEvent {
        pub event: Event,
        pub message: String,
    }

    /// A label key-value pair
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Label {
        pub key: String,
        pub value: String,
    }

    impl Label {
        pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
            Self { key: key.into(), value: value.into() }
        }
    }

    /// Alert severity levels
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Severity {
        Info,
        Warn,
        Critical,
    }

    /// Anomaly rule identifiers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AnomalyKind {
        ErrorThreshold,
        BruteForce,
        SuspiciousUser,
        DistributedAttack,
    }

    /// One named result of a classification pass.
    ///
    /// Per-key kinds (`BruteForce`, `SuspiciousUser`) produce one finding for
    /// every qualifying ip or user.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum Finding {
        ErrorThreshold { count: usize, threshold: usize },
        BruteForce { ip: String, failed_attempts: usize, threshold: usize },
        SuspiciousUser { user: String, failed_attempts: usize },
        DistributedAttack { unique_ips: usize, total_errors: usize },
    }

    impl Finding {
        pub fn kind(&self) -> AnomalyKind {
            match self {
                Finding::ErrorThreshold { .. } => AnomalyKind::ErrorThreshold,
                Finding::BruteForce { .. } => AnomalyKind::BruteForce,
                Finding::SuspiciousUser { .. } => AnomalyKind::SuspiciousUser,
                Finding::DistributedAttack { .. } => AnomalyKind::DistributedAttack,
            }
        }

        pub fn severity(&self) -> Severity {
            match self {
                Finding::ErrorThreshold { .. } | Finding::SuspiciousUser { .. } => Severity::Warn,
                Finding::BruteForce { .. } | Finding::DistributedAttack { .. } => Severity::Critical,
            }
        }
    }

    /// An alert to be dispatched
    #[derive(Debug, Clone, Serialize)]
    pub struct Alert {
        pub timestamp: DateTime<Utc>,
        pub severity: Severity,
        pub kind: AnomalyKind,
        pub finding: Finding,
        /// Log source the finding was raised for
        pub source: String,
        pub hostname: String,
        pub message: String,
        pub labels: SmallVec<[Label; 4]>,
    }

    impl std::fmt::Display for Severity {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Severity::Info => write!(f, "INFO"),
                Severity::Warn => write!(f, "WARN"),
                Severity::Critical => write!(f, "CRITICAL"),
            }
        }
    }

    impl std::fmt::Display for AnomalyKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                AnomalyKind::ErrorThreshold => "error_threshold",
                AnomalyKind::BruteForce => "brute_force",
                AnomalyKind::SuspiciousUser => "suspicious_user",
                AnomalyKind::DistributedAttack => "distributed_attack",
            };
            write!(f, "{}", s)
        }
    }
}
