use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::types::{Event, LEVEL_ERROR};

/// A `(timestamp, level)` entry kept per ip or user key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
}

impl IndexEntry {
    pub fn is_error(&self) -> bool {
        self.level == LEVEL_ERROR
    }
}

pub type KeyIndex = HashMap<String, VecDeque<IndexEntry>>;

/// Events seen during a trailing time window, indexed by level, ip and user.
///
/// Eviction is anchored to the newest admitted timestamp, never to the wall
/// clock: if nothing new arrives, nothing expires unless [`evict`] is called
/// explicitly. The store has no internal locking; one writer at a time.
///
/// [`evict`]: SlidingWindow::evict
#[derive(Debug)]
pub struct SlidingWindow {
    window: Duration,
    events: VecDeque<Event>,
    level_counts: HashMap<String, usize>,
    ip_index: KeyIndex,
    user_index: KeyIndex,
    anchor: Option<DateTime<Utc>>,
}

impl SlidingWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: VecDeque::new(),
            level_counts: HashMap::new(),
            ip_index: HashMap::new(),
            user_index: HashMap::new(),
            anchor: None,
        }
    }

    /// Admit an event and evict whatever it pushes out of the window.
    ///
    /// Events older than the current anchor are placed at their ordered
    /// position. Returns `false` without touching the store when the event is
    /// already outside the window relative to the anchor.
    pub fn add(&mut self, event: Event) -> bool {
        let ts = event.timestamp;
        let anchor = match self.anchor {
            Some(anchor) if ts < anchor => {
                if anchor - ts > self.window {
                    tracing::debug!(timestamp = %ts, anchor = %anchor, "Rejected event older than window");
                    return false;
                }
                anchor
            }
            _ => ts,
        };

        if let Some(ref ip) = event.metadata.ip {
            insert_ordered(self.ip_index.entry(ip.clone()).or_default(), IndexEntry {
                timestamp: ts,
                level: event.level.clone(),
            });
        }
        if let Some(ref user) = event.metadata.user {
            insert_ordered(self.user_index.entry(user.clone()).or_default(), IndexEntry {
                timestamp: ts,
                level: event.level.clone(),
            });
        }
        *self.level_counts.entry(event.level.clone()).or_insert(0) += 1;

        let pos = self.events.partition_point(|e| e.timestamp <= ts);
        self.events.insert(pos, event);

        self.evict(anchor);
        true
    }

    /// Drop every event older than `current - window`.
    ///
    /// `current` never moves the anchor backwards. Callers wanting wall-clock
    /// expiry for an idle source can pass `Utc::now()` here.
    pub fn evict(&mut self, current: DateTime<Utc>) {
        let current = match self.anchor {
            Some(anchor) if anchor > current => anchor,
            _ => current,
        };
        self.anchor = Some(current);

        let mut touched_ips = HashSet::new();
        let mut touched_users = HashSet::new();

        while self.events.front().is_some_and(|e| current - e.timestamp > self.window) {
            let Some(old) = self.events.pop_front() else { break };

            if let Some(count) = self.level_counts.get_mut(&old.level) {
                *count -= 1;
                if *count == 0 {
                    self.level_counts.remove(&old.level);
                }
            }
            if let Some(ip) = old.metadata.ip {
                touched_ips.insert(ip);
            }
            if let Some(user) = old.metadata.user {
                touched_users.insert(user);
            }
        }

        prune_keys(&mut self.ip_index, touched_ips, current, self.window);
        prune_keys(&mut self.user_index, touched_users, current, self.window);
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Timestamp eviction is currently anchored at
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.anchor
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in timestamp order, oldest first
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn level_count(&self, level: &str) -> usize {
        self.level_counts.get(level).copied().unwrap_or(0)
    }

    pub fn error_count(&self) -> usize {
        self.level_count(LEVEL_ERROR)
    }

    pub fn level_counts(&self) -> &HashMap<String, usize> {
        &self.level_counts
    }

    pub fn ip_index(&self) -> &KeyIndex {
        &self.ip_index
    }

    pub fn user_index(&self) -> &KeyIndex {
        &self.user_index
    }
}

fn insert_ordered(entries: &mut VecDeque<IndexEntry>, entry: IndexEntry) {
    let pos = entries.partition_point(|e| e.timestamp <= entry.timestamp);
    entries.insert(pos, entry);
}

/// Trim stale entries off the front of each touched key, removing keys left empty
fn prune_keys(index: &mut KeyIndex, keys: HashSet<String>, current: DateTime<Utc>, window: Duration) {
    for key in keys {
        let emptied = match index.get_mut(&key) {
            Some(entries) => {
                while entries.front().is_some_and(|e| current - e.timestamp > window) {
                    entries.pop_front();
                }
                entries.is_empty()
            }
            None => false,
        };
        if emptied {
            index.remove(&key);
        }
    }
}
