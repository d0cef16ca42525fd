use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::SourcesConfig;

/// Standard Linux log locations watched with `--all`
pub const DEFAULT_SOURCES: &[&str] = &[
    "/var/log/auth.log",
    "/var/log/syslog",
    "/var/log/messages",
    "/var/log/secure",
    "/var/log/faillog",
    "/var/log/kern.log",
    "/var/log/cron",
    "/var/log/dmesg",
];

/// Upper bound on bytes consumed by one `read_lines` call
pub const DEFAULT_READ_LIMIT: u64 = 1024 * 1024;

/// Follows a file for appended lines by polling its length.
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
    read_limit: u64,
}

impl LogTailer {
    /// Open `path`, starting at its current end unless `from_start` is set
    pub async fn open(path: impl AsRef<Path>, from_start: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Cannot open {}", path.display()))?;

        let offset = if from_start { 0 } else { meta.len() };
        Ok(Self { path, offset, partial: Vec::new(), read_limit: DEFAULT_READ_LIMIT })
    }

    /// Cap how many bytes a single poll reads; the rest waits for later polls
    pub fn with_read_limit(mut self, limit: u64) -> Self {
        self.read_limit = limit.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines appended since the previous call.
    ///
    /// A trailing line without a newline is held back until it is finished,
    /// so multi-byte characters split across writes decode intact. At most
    /// the read limit is consumed per call. Blank lines are dropped.
    pub async fn read_lines(&mut self) -> Result<Vec<String>> {
        let len = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("Failed to stat {}", self.path.display()))?
            .len();

        if len < self.offset {
            tracing::warn!(path = %self.path.display(), "Log file truncated or rotated, rereading from start");
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let n = file.take(self.read_limit).read_to_end(&mut self.partial).await?;
        self.offset += n as u64;

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        Ok(complete
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).trim_end_matches('\r').to_string())
            .filter(|l| !l.trim().is_empty())
            .collect())
    }
}

/// Standard log files that exist as regular files on this host
pub fn existing_default_sources() -> Vec<PathBuf> {
    DEFAULT_SOURCES.iter()
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .collect()
}

/// Resolve the configured source list, skipping paths that are not files
pub fn resolve_sources(config: &SourcesConfig) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = Vec::new();

    for path in config.paths.iter().map(PathBuf::from) {
        if path.is_file() {
            sources.push(path);
        } else {
            tracing::warn!(path = %path.display(), "Skipping source: does not exist or is not a file");
        }
    }

    if config.all {
        for path in existing_default_sources() {
            if !sources.contains(&path) {
                sources.push(path);
            }
        }
    }

    sources
}
