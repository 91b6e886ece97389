//! Abstractions for time access to enable testing.
//!
//! "Predict for now" depends on the wall clock; injecting a `Clock` keeps
//! that path deterministic in tests.

use chrono::{DateTime, Utc};

/// Trait for abstracting time access.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing, frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    utc_time: DateTime<Utc>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { utc_time: time }
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.utc_time
    }
}
