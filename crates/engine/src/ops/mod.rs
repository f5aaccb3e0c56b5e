use std::{sync::Arc, time::Duration};

use rand::Rng;
use sea_orm::DatabaseConnection;

use crate::{
    Clock, EngineError, IdGenerator, IntegrityKey, RandomSource, ResultEngine, SystemClock,
    ThreadRandom,
    store::{LedgerStore, OrmStore},
};

mod accounts;
mod transactions;
mod users;

/// Attempts per operation when not configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

const BACKOFF_BASE_MS: u64 = 2;
const BACKOFF_MAX_EXP: u32 = 7;

/// Run a block inside one unit of work, committing on success and rolling
/// back on error.
///
/// A conflict reported by the store (while reading, writing or committing)
/// rolls the unit back and re-runs the whole block from a fresh read, after
/// a jittered backoff, until `max_attempts` is reached. Any other error is
/// returned as is. Persistence failures get `$context` attached.
macro_rules! with_unit {
    ($self:expr, $context:expr, |$unit:ident| $body:expr) => {{
        let context = $context;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome: $crate::ResultEngine<_> = async {
                let mut unit = $self.store.begin().await?;
                let result = async {
                    let $unit = &mut unit;
                    let value: $crate::ResultEngine<_> = $body;
                    value
                }
                .await;
                match result {
                    Ok(value) => {
                        unit.commit().await?;
                        Ok(value)
                    }
                    Err(err) => {
                        // A failed rollback is not reported: the original error
                        // is what the caller needs, and dropping the underlying
                        // transaction rolls it back as well.
                        let _ = unit.rollback().await;
                        Err(err)
                    }
                }
            }
            .await;

            match outcome {
                Err(err) if err.is_conflict() && attempt < $self.max_attempts => {
                    tokio::time::sleep($crate::ops::backoff_delay(attempt)).await;
                }
                other => break other.map_err(|err| err.with_context(&context)),
            }
        }
    }};
}

pub(crate) use with_unit;

/// Jittered exponential delay before retry number `attempt`.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let ceiling = BACKOFF_BASE_MS << attempt.min(BACKOFF_MAX_EXP);
    let millis = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
    Duration::from_millis(millis)
}

/// The ledger engine.
///
/// Stateless apart from its configuration: all mutable state lives in the
/// store, so one `Engine` can be shared (`Arc<Engine>`) across tasks.
#[derive(Debug)]
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    integrity: IntegrityKey,
    ids: IdGenerator,
    max_attempts: u32,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn LedgerStore>>,
    secret: Option<Vec<u8>>,
    clock: Option<Arc<dyn Clock>>,
    random: Option<Arc<dyn RandomSource>>,
    max_attempts: Option<u32>,
}

impl EngineBuilder {
    /// Pass the required database. Accounts are persisted through
    /// [`OrmStore`].
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.store = Some(Arc::new(OrmStore::new(db)));
        self
    }

    /// Use a specific store backend instead of [`database`](Self::database).
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> EngineBuilder {
        self.store = Some(store);
        self
    }

    /// Pass the required integrity secret.
    pub fn secret(mut self, secret: impl AsRef<[u8]>) -> EngineBuilder {
        self.secret = Some(secret.as_ref().to_vec());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> EngineBuilder {
        self.clock = Some(clock);
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> EngineBuilder {
        self.random = Some(random);
        self
    }

    /// How many times an operation runs before a conflict is reported.
    pub fn max_attempts(mut self, attempts: u32) -> EngineBuilder {
        self.max_attempts = Some(attempts);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let store = self
            .store
            .ok_or_else(|| EngineError::Validation("no database configured".to_string()))?;
        let secret = self
            .secret
            .ok_or_else(|| EngineError::Validation("no integrity secret configured".to_string()))?;
        let ids = IdGenerator::new(
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.random.unwrap_or_else(|| Arc::new(ThreadRandom)),
        );

        Ok(Engine {
            store,
            integrity: IntegrityKey::new(&secret)?,
            ids,
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
        })
    }
}
