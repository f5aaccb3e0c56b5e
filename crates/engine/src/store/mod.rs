//! Persistence abstraction used by the engine.
//!
//! A [`LedgerStore`] hands out [`UnitOfWork`]s. Every read and write of one
//! engine operation goes through a single unit, which is either committed as
//! a whole or rolled back as a whole. Dropping a unit without committing
//! rolls it back.
//!
//! Two backends are provided, both over a `sea_orm::DatabaseConnection`:
//!
//! - [`OrmStore`] uses the sea-orm entities.
//! - [`SqlStore`] uses hand-written SQL statements.
//!
//! Updates of the same account serialize through a compare-and-swap in
//! [`AccountRepository::save`]: the row is only written if it still holds the
//! balance and tag that were read. A lost race is reported as
//! [`StoreError::Conflict`] and the engine re-runs the operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::{Account, AccountId, Transaction, User, UserId};

pub use orm::OrmStore;
pub use sql::SqlStore;

mod orm;
mod sql;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures. None of them leave partial state behind.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another unit of work changed or locked the same rows.
    #[error("concurrent modification: {0}")]
    Conflict(String),
    /// A unique key already holds the inserted value.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    /// A stored row could not be mapped back to a domain value.
    #[error("malformed row: {0}")]
    Decode(String),
    #[error(transparent)]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        if is_contention(&err) {
            Self::Conflict(err.to_string())
        } else if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            Self::Duplicate(detail)
        } else {
            Self::Database(err)
        }
    }
}

/// SQLite reports lock contention as plain errors; they are safe to retry.
fn is_contention(err: &DbErr) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    ["database is locked", "table is locked", "database is busy", "sqlite_busy"]
        .iter()
        .any(|needle| message.contains(needle))
}

fn account_id(value: u64) -> StoreResult<AccountId> {
    AccountId::try_from(value).map_err(|_| StoreError::Decode(format!("id out of range: {value}")))
}

#[async_trait]
pub trait AccountRepository: Send {
    /// Fetch an account only if it belongs to `owner_id`.
    async fn find_by_id_and_owner(
        &mut self,
        id: AccountId,
        owner_id: UserId,
    ) -> StoreResult<Option<Account>>;

    async fn find_by_id(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Accounts of `owner_id`, ascending by id.
    async fn find_by_owner(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>>;

    /// Every account, ascending by id.
    async fn find_all(&mut self) -> StoreResult<Vec<Account>>;

    /// Insert an account with a zero balance and an empty tag. The caller
    /// tags it through [`save`](Self::save) once the id is known.
    async fn insert_account(
        &mut self,
        owner_id: UserId,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Account>;

    /// Write `updated`'s balance and tag, provided the row still holds
    /// `previous`'s. Otherwise fails with [`StoreError::Conflict`].
    async fn save(&mut self, previous: &Account, updated: &Account) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionRepository: Send {
    async fn insert_transaction(&mut self, tx: &Transaction) -> StoreResult<()>;

    /// Transactions debiting or crediting `account_id`, oldest first.
    async fn find_for_account(&mut self, account_id: AccountId) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait UserRepository: Send {
    async fn insert_user(
        &mut self,
        username: &str,
        password: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<User>;

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>>;
}

/// One all-or-nothing scope of repository calls.
#[async_trait]
pub trait UnitOfWork: AccountRepository + TransactionRepository + UserRepository {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}
