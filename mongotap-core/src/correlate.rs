//! Request/reply correlation.
//!
//! Every request-class frame opens a [`PendingRequest`] keyed by its
//! `requestID`. A reply whose `responseTo` matches closes it. Entries that
//! never see a reply are removed by a periodic sweep once they are older
//! than the retention threshold, or by the capacity cap when too many are
//! outstanding.
//!
//! ```text
//!   absent ──insert──▶ pending ──reply──▶ matched
//!                         │
//!                         └──sweep / cap / drain──▶ evicted
//! ```
//!
//! All times are capture timestamps in microseconds.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;

/// A request awaiting its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: i32,
    pub collection: String,
    /// Rendered statement, without the trailing `;`
    pub statement: String,
    pub start_us: i64,
    /// Requesting endpoint, when the capture source knows it
    pub client: Option<SocketAddr>,
}

impl PendingRequest {
    /// Age at `now_us`, clamped to zero.
    pub fn elapsed_us(&self, now_us: i64) -> i64 {
        now_us.saturating_sub(self.start_us).max(0)
    }
}

/// An entry pushed out by [`CorrelationTable::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Displaced {
    /// Same `request_id` was already pending; the old entry is dropped
    Replaced(PendingRequest),
    /// Capacity exceeded; the oldest entry is evicted
    Evicted(PendingRequest),
}

/// Ordering key: start time, then insertion sequence.
type AgeKey = (i64, u64);

/// Pending requests owned by a single writer.
#[derive(Debug)]
pub struct CorrelationTable {
    entries: HashMap<i32, (AgeKey, PendingRequest)>,
    by_age: BTreeMap<AgeKey, i32>,
    next_seq: u64,
    retention_us: i64,
    sweep_interval_us: i64,
    max_pending: usize,
    last_sweep_us: Option<i64>,
}

impl CorrelationTable {
    pub fn new(retention: Duration, sweep_interval: Duration, max_pending: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_age: BTreeMap::new(),
            next_seq: 0,
            retention_us: duration_us(retention),
            sweep_interval_us: duration_us(sweep_interval),
            max_pending: max_pending.max(1),
            last_sweep_us: None,
        }
    }

    /// Record a new pending request.
    ///
    /// Last write wins on a duplicate `request_id`. When the table is full
    /// the oldest entry is evicted to make room.
    pub fn insert(&mut self, request: PendingRequest) -> Option<Displaced> {
        let key = (request.start_us, self.next_seq);
        self.next_seq += 1;
        let request_id = request.request_id;

        if let Some((old_key, old)) = self.entries.insert(request_id, (key, request)) {
            self.by_age.remove(&old_key);
            self.by_age.insert(key, request_id);
            debug!(request_id, "duplicate request id, replacing pending entry");
            return Some(Displaced::Replaced(old));
        }
        self.by_age.insert(key, request_id);

        if self.entries.len() > self.max_pending {
            return self.pop_oldest().map(Displaced::Evicted);
        }
        None
    }

    /// Remove and return the request answered by `response_to`.
    pub fn complete(&mut self, response_to: i32) -> Option<PendingRequest> {
        let (key, request) = self.entries.remove(&response_to)?;
        self.by_age.remove(&key);
        Some(request)
    }

    /// Run [`expire`](Self::expire) if a sweep interval has passed since the last one.
    pub fn sweep(&mut self, now_us: i64) -> Vec<PendingRequest> {
        match self.last_sweep_us {
            Some(last) if now_us.saturating_sub(last) < self.sweep_interval_us => Vec::new(),
            _ => {
                self.last_sweep_us = Some(now_us);
                self.expire(now_us)
            }
        }
    }

    /// Remove every entry older than the retention threshold, oldest first.
    pub fn expire(&mut self, now_us: i64) -> Vec<PendingRequest> {
        let mut expired = Vec::new();
        while let Some((&(start_us, _), _)) = self.by_age.first_key_value() {
            if now_us.saturating_sub(start_us) <= self.retention_us {
                break;
            }
            if let Some(request) = self.pop_oldest() {
                expired.push(request);
            }
        }
        expired
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(request) = self.pop_oldest() {
            drained.push(request);
        }
        drained
    }

    pub fn contains(&self, request_id: i32) -> bool {
        self.entries.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pop_oldest(&mut self) -> Option<PendingRequest> {
        let (_, request_id) = self.by_age.pop_first()?;
        self.entries.remove(&request_id).map(|(_, request)| request)
    }
}

fn duration_us(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}
