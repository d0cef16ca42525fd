pub mod metadata;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::types::{Event, ParsedEvent, LEVEL_DEBUG, LEVEL_ERROR, LEVEL_INFO};
use self::metadata::{MetadataExtractor, RegexExtractor};

/// Turns raw log lines into events.
///
/// Two line shapes are recognized, tried in order:
///
/// * `2024-01-15 10:30:45 LEVEL message` (structured application logs)
/// * `Jan 15 10:30:45 host sshd[123]: message` (syslog sshd lines, no year)
///
/// Anything else yields `None`.
pub struct LineParser {
    structured: Regex,
    syslog: Regex,
    extractor: Box<dyn MetadataExtractor>,
}

impl LineParser {
    pub fn new() -> Result<Self> {
        Self::with_extractor(Box::new(RegexExtractor::new()?))
    }

    pub fn with_extractor(extractor: Box<dyn MetadataExtractor>) -> Result<Self> {
        let structured = Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (\S+) (.*)$")
            .context("Failed to compile structured line pattern")?;
        let syslog = Regex::new(r"^([A-Z][a-z]{2}) +(\d{1,2}) (\d{2}:\d{2}:\d{2}) (\S+) (.*?sshd.*?): (.*)$")
            .context("Failed to compile syslog line pattern")?;

        Ok(Self { structured, syslog, extractor })
    }

    /// Parse a line, substituting the current year for syslog timestamps
    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        self.parse_at(line, Utc::now())
    }

    /// Parse a line, taking the syslog year from `reference`.
    ///
    /// A syslog timestamp that would land more than a day after `reference`
    /// is placed in the previous year instead.
    pub fn parse_at(&self, line: &str, reference: DateTime<Utc>) -> Option<ParsedEvent> {
        self.parse_structured(line)
            .or_else(|| self.parse_syslog(line, reference))
    }

    fn parse_structured(&self, line: &str) -> Option<ParsedEvent> {
        let caps = self.structured.captures(line)?;
        let naive = NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d %H:%M:%S").ok()?;
        let level = caps.get(2)?.as_str();
        let message = caps.get(3)?.as_str();

        let metadata = self.extractor.extract(message);
        Some(ParsedEvent {
            event: Event::new(Utc.from_utc_datetime(&naive), level, metadata),
            message: message.to_string(),
        })
    }

    fn parse_syslog(&self, line: &str, reference: DateTime<Utc>) -> Option<ParsedEvent> {
        let caps = self.syslog.captures(line)?;
        let (month, day, time) = (caps.get(1)?.as_str(), caps.get(2)?.as_str(), caps.get(3)?.as_str());
        let stamp = |year: i32| {
            let text = format!("{} {} {:0>2} {}", year, month, day, time);
            NaiveDateTime::parse_from_str(&text, "%Y %b %d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        };

        let mut timestamp = stamp(reference.year())?;
        // December lines read after New Year belong to the previous year
        if timestamp - reference > Duration::days(1) {
            timestamp = stamp(reference.year() - 1)?;
        }
        let tag = caps.get(5)?.as_str();
        let message = caps.get(6)?.as_str();

        let mut metadata = self.extractor.extract(message);
        if metadata.service.is_none() {
            // Program tag, e.g. "sshd[1234]"
            let from_tag = self.extractor.extract(tag);
            metadata.service = from_tag.service;
            metadata.pid = from_tag.pid;
        }

        Some(ParsedEvent {
            event: Event::new(timestamp, auth_level(message), metadata),
            message: message.to_string(),
        })
    }
}

/// Derive a level for sshd messages, which carry none of their own
fn auth_level(message: &str) -> &'static str {
    if message.contains("Failed") || message.contains("Invalid") {
        LEVEL_ERROR
    } else if message.contains("Accepted") || message.contains("session opened") {
        LEVEL_INFO
    } else {
        LEVEL_DEBUG
    }
}
