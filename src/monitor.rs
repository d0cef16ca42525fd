use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::analyzer::{Classifier, Findings};
use crate::config::DetectorConfig;
use crate::parser::LineParser;
use crate::stats::WindowStats;
use crate::types::{Event, ParsedEvent};
use crate::window::SlidingWindow;

/// Detection pipeline for one log source: parse, admit, classify.
///
/// Each source gets its own monitor, so windows are never shared between
/// sources.
pub struct Monitor {
    source: String,
    parser: LineParser,
    window: SlidingWindow,
    classifier: Classifier,
    lines_seen: u64,
    events_admitted: u64,
}

impl Monitor {
    pub fn new(source: impl Into<String>, config: &DetectorConfig) -> Result<Self> {
        Ok(Self::with_parser(source, config, LineParser::new()?))
    }

    pub fn with_parser(source: impl Into<String>, config: &DetectorConfig, parser: LineParser) -> Self {
        Self {
            source: source.into(),
            parser,
            window: SlidingWindow::new(config.window()),
            classifier: Classifier::new(config),
            lines_seen: 0,
            events_admitted: 0,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Feed one raw line. Lines that do not parse produce no findings and
    /// leave the window untouched.
    pub fn ingest(&mut self, line: &str) -> Findings {
        self.ingest_at(line, Utc::now())
    }

    /// Like [`Monitor::ingest`], with an explicit clock.
    ///
    /// Events dated more than a day after `reference` are dropped so a bad
    /// timestamp cannot drag the window anchor into the future.
    pub fn ingest_at(&mut self, line: &str, reference: DateTime<Utc>) -> Findings {
        self.lines_seen += 1;
        let Some(parsed) = self.parser.parse_at(line, reference) else {
            return Findings::default();
        };
        if parsed.event.timestamp - reference > Duration::days(1) {
            warn!(
                source = %self.source,
                timestamp = %parsed.event.timestamp,
                "Dropping event dated in the future"
            );
            return Findings::default();
        }
        self.log_event(&parsed);
        self.add_event(parsed.event)
    }

    /// Admit an already-built event and classify the window
    pub fn add_event(&mut self, event: Event) -> Findings {
        if !self.window.add(event) {
            return Findings::default();
        }
        self.events_admitted += 1;

        let findings = self.classifier.check(&self.window);
        if !findings.is_empty() {
            info!(
                source = %self.source,
                kinds = ?findings.kinds().collect::<Vec<_>>(),
                "Anomaly detected"
            );
        }
        findings
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn statistics(&self) -> WindowStats {
        WindowStats::capture(&self.window)
    }

    pub fn lines_seen(&self) -> u64 {
        self.lines_seen
    }

    pub fn events_admitted(&self) -> u64 {
        self.events_admitted
    }

    fn log_event(&self, parsed: &ParsedEvent) {
        let ip = parsed.event.metadata.ip.as_deref().unwrap_or("-");
        let msg = parsed.message.as_str();
        if msg.contains("Failed") || msg.contains("Invalid") {
            warn!(source = %self.source, ip, text = msg, "Authentication failure");
        } else if msg.contains("Accepted") || msg.contains("session opened") {
            info!(source = %self.source, ip, text = msg, "Authentication success");
        } else {
            debug!(source = %self.source, level = %parsed.event.level, text = msg, "Event");
        }
    }
}
