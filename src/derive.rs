//! Derived fields computed on the write path
//!
//! Two pure helpers run inside every relevant mutation: [`content_hash`] for
//! chunk text and [`touch`] for modification timestamps. Time comes from an
//! injected [`Clock`] so callers (and tests) control it.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};

/// SHA-256 digest of a chunk's text, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already computed hex digest (e.g. a query parameter)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash chunk text. Equal text always yields an equal digest.
pub fn content_hash(text: &str) -> ContentHash {
    ContentHash(hex::encode(Sha256::digest(text.as_bytes())))
}

/// Source of "now" for timestamp assignment
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Clock that advances by a fixed step on every reading.
///
/// The first reading returns `start`; each subsequent reading is one step later.
#[derive(Debug)]
pub struct StepClock {
    start: DateTime<Utc>,
    step: Duration,
    ticks: AtomicI64,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            start,
            step,
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst);
        // Readings saturate instead of wrapping back before `start`
        let n = i32::try_from(n).unwrap_or(i32::MAX);
        self.step
            .checked_mul(n)
            .and_then(|offset| self.start.checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Records carrying a modification timestamp
pub trait Timestamped {
    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

/// Stamp `record` with the clock's current time and return that time
pub fn touch<T: Timestamped>(record: &mut T, clock: &dyn Clock) -> DateTime<Utc> {
    let now = clock.now();
    record.set_updated_at(now);
    now
}
