//! Sliding time window of signal observations
//!
//! Entries older than the window are evicted lazily on every insert and read,
//! so after any call no retained entry satisfies `now - timestamp >= window`.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::inbound::GrpcSource;

/// One timestamped numeric observation with an optional tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: i64,
    pub tag: Option<GrpcSource>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: i64) -> Self {
        Self {
            timestamp,
            value,
            tag: None,
        }
    }

    pub fn tagged(mut self, tag: GrpcSource) -> Self {
        self.tag = Some(tag);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    timestamp: DateTime<Utc>,
    value: Option<i64>,
    tag: Option<GrpcSource>,
}

/// Contents of the window at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSnapshot {
    /// No numeric observation is inside the window
    Empty,
    Data(WindowData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowData {
    /// Numeric values in timestamp order
    pub values: Vec<i64>,
    pub frequencies: BTreeMap<i64, usize>,
    pub tag_counts: BTreeMap<GrpcSource, usize>,
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

/// Time-bounded store of observations and tag counts
#[derive(Debug, Clone)]
pub struct EventWindow {
    duration: Duration,
    records: VecDeque<Record>,
    tag_counts: BTreeMap<GrpcSource, usize>,
}

impl EventWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            records: VecDeque::new(),
            tag_counts: BTreeMap::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Insert an observation, evicting stale entries as of `now`
    pub fn append_at(&mut self, observation: Observation, now: DateTime<Utc>) {
        self.insert(
            Record {
                timestamp: observation.timestamp,
                value: Some(observation.value),
                tag: observation.tag,
            },
            now,
        );
    }

    /// Record a tag seen without a numeric value
    pub fn append_tag_at(&mut self, timestamp: DateTime<Utc>, tag: GrpcSource, now: DateTime<Utc>) {
        self.insert(
            Record {
                timestamp,
                value: None,
                tag: Some(tag),
            },
            now,
        );
    }

    pub fn append(&mut self, observation: Observation) {
        self.append_at(observation, Utc::now());
    }

    fn insert(&mut self, record: Record, now: DateTime<Utc>) {
        self.evict(now);
        if !self.is_live(record.timestamp, now) {
            return;
        }
        if let Some(tag) = record.tag {
            *self.tag_counts.entry(tag).or_insert(0) += 1;
        }
        // history replays arrive in order; late pushes are placed by timestamp
        match self.records.back() {
            Some(last) if last.timestamp > record.timestamp => {
                let idx = self
                    .records
                    .partition_point(|r| r.timestamp <= record.timestamp);
                self.records.insert(idx, record);
            }
            _ => self.records.push_back(record),
        }
    }

    fn is_live(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - timestamp < self.duration
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.records.front() {
            if self.is_live(front.timestamp, now) {
                break;
            }
            if let Some(tag) = front.tag {
                if let Some(count) = self.tag_counts.get_mut(&tag) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.tag_counts.remove(&tag);
                    }
                }
            }
            self.records.pop_front();
        }
    }

    /// Evict stale entries and return what remains
    pub fn snapshot_at(&mut self, now: DateTime<Utc>) -> WindowSnapshot {
        self.evict(now);

        let values: Vec<(DateTime<Utc>, i64)> = self
            .records
            .iter()
            .filter_map(|r| r.value.map(|v| (r.timestamp, v)))
            .collect();

        let (Some(first), Some(last)) = (values.first(), values.last()) else {
            return WindowSnapshot::Empty;
        };
        let (oldest, newest) = (first.0, last.0);

        let mut frequencies = BTreeMap::new();
        for (_, value) in &values {
            *frequencies.entry(*value).or_insert(0) += 1;
        }

        WindowSnapshot::Data(WindowData {
            values: values.into_iter().map(|(_, v)| v).collect(),
            frequencies,
            tag_counts: self.tag_counts.clone(),
            oldest,
            newest,
        })
    }

    pub fn snapshot(&mut self) -> WindowSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Drop everything, used before a history rescan
    pub fn reset(&mut self) {
        self.records.clear();
        self.tag_counts.clear();
    }

    /// Number of retained entries, including tag-only ones
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Timestamp of the oldest retained entry
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.records.front().map(|r| r.timestamp)
    }
}

/// Window shared between the mailbox handler and the history poller
///
/// Every method takes the lock for the duration of one window operation only.
#[derive(Debug, Clone)]
pub struct SharedWindow {
    inner: Arc<Mutex<EventWindow>>,
}

impl SharedWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventWindow::new(duration))),
        }
    }

    pub async fn append_at(&self, observation: Observation, now: DateTime<Utc>) {
        self.inner.lock().await.append_at(observation, now);
    }

    pub async fn append_tag_at(&self, timestamp: DateTime<Utc>, tag: GrpcSource, now: DateTime<Utc>) {
        self.inner.lock().await.append_tag_at(timestamp, tag, now);
    }

    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> WindowSnapshot {
        self.inner.lock().await.snapshot_at(now)
    }

    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
