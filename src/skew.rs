use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

use crate::util::{lock_unpoisoned, read_unpoisoned, write_unpoisoned};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock_unpoisoned(&self.now) = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = lock_unpoisoned(&self.now);
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock_unpoisoned(&self.now)
    }
}

/// Per-endpoint corrections between the local clock and service clocks.
///
/// Read on every signing operation, written only when a skew is detected.
pub struct ClockSkewCache {
    clock: Arc<dyn Clock>,
    corrections: RwLock<HashMap<String, TimeDelta>>,
}

impl ClockSkewCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            corrections: RwLock::new(HashMap::new()),
        }
    }

    pub fn real_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn correction_for(&self, endpoint: &str) -> TimeDelta {
        read_unpoisoned(&self.corrections)
            .get(endpoint)
            .copied()
            .unwrap_or_else(TimeDelta::zero)
    }

    pub fn corrected_now(&self, endpoint: &str) -> DateTime<Utc> {
        self.real_now() + self.correction_for(endpoint)
    }

    pub fn set_correction(&self, endpoint: &str, correction: TimeDelta) {
        write_unpoisoned(&self.corrections).insert(endpoint.to_owned(), correction);
    }

    pub fn len(&self) -> usize {
        read_unpoisoned(&self.corrections).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClockSkewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClockSkewCache {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClockSkewCache")
            .field("entries", &self.len())
            .finish()
    }
}
