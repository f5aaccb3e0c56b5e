//! Time and entropy sources, and the transaction identifier generator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};

/// Length of the random suffix of a transaction id.
pub const SUFFIX_LEN: usize = 8;

/// Source of the current time, used for ids and `created_at` stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of the random part of transaction ids.
pub trait RandomSource: Send + Sync {
    /// Returns `len` alphanumeric characters.
    fn alphanumeric(&self, len: usize) -> String;
}

/// Thread-local RNG; nothing is shared between callers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn alphanumeric(&self, len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

/// Produces `<unix-nanos>-<random>` transaction identifiers.
///
/// Unique with very high probability inside one process. Nothing enforces
/// uniqueness across processes; a collision surfaces as a failed insert.
#[derive(Clone)]
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl IdGenerator {
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// A fresh transaction id stamped with `at`.
    pub fn transaction_id(&self, at: DateTime<Utc>) -> String {
        // Out of range only after the year 2262.
        let nanos = at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000));
        format!("{nanos}-{}", self.random.alphanumeric(SUFFIX_LEN))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(ThreadRandom))
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}
