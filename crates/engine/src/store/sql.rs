use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, QueryResult, Statement,
    TransactionTrait, Value,
};

use crate::{Account, AccountId, MoneyCents, Transaction, TransactionKind, User, UserId};
use crate::transactions::TransactionStatus;

use super::{
    AccountRepository, LedgerStore, StoreError, StoreResult, TransactionRepository, UnitOfWork,
    UserRepository, account_id,
};

const ACCOUNT_COLUMNS: &str = "id, owner_id, balance, integrity_tag, created_at";
const TRANSACTION_COLUMNS: &str =
    "id, from_account_id, to_account_id, amount, kind, status, created_at";

/// Ledger store issuing plain SQL through the connection.
///
/// Functionally interchangeable with [`OrmStore`](super::OrmStore); the
/// schema is the one created by the `migration` crate.
#[derive(Clone, Debug)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl LedgerStore for SqlStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.database.begin().await?;
        Ok(Box::new(SqlUnit { tx }))
    }
}

struct SqlUnit {
    tx: DatabaseTransaction,
}

impl SqlUnit {
    fn statement(&self, sql: &str, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(self.tx.get_database_backend(), sql, values)
    }

    async fn query_accounts(&self, sql: &str, values: Vec<Value>) -> StoreResult<Vec<Account>> {
        let rows = self.tx.query_all(self.statement(sql, values)).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn query_account(&self, sql: &str, values: Vec<Value>) -> StoreResult<Option<Account>> {
        let row = self.tx.query_one(self.statement(sql, values)).await?;
        row.as_ref().map(account_from_row).transpose()
    }
}

fn account_from_row(row: &QueryResult) -> StoreResult<Account> {
    Ok(Account::from_parts(
        row.try_get("", "id")?,
        row.try_get("", "owner_id")?,
        MoneyCents::new(row.try_get("", "balance")?),
        row.try_get("", "integrity_tag")?,
        row.try_get("", "created_at")?,
    ))
}

fn transaction_from_row(row: &QueryResult) -> StoreResult<Transaction> {
    let kind: String = row.try_get("", "kind")?;
    let status: String = row.try_get("", "status")?;
    let decode = |err: crate::EngineError| StoreError::Decode(err.to_string());

    Ok(Transaction {
        id: row.try_get("", "id")?,
        from_account_id: row.try_get("", "from_account_id")?,
        to_account_id: row.try_get("", "to_account_id")?,
        amount: MoneyCents::new(row.try_get("", "amount")?),
        kind: TransactionKind::try_from(kind.as_str()).map_err(decode)?,
        status: TransactionStatus::try_from(status.as_str()).map_err(decode)?,
        created_at: row.try_get("", "created_at")?,
    })
}

fn user_from_row(row: &QueryResult) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("", "id")?,
        username: row.try_get("", "username")?,
        created_at: row.try_get("", "created_at")?,
    })
}

#[async_trait]
impl AccountRepository for SqlUnit {
    async fn find_by_id_and_owner(
        &mut self,
        id: AccountId,
        owner_id: UserId,
    ) -> StoreResult<Option<Account>> {
        self.query_account(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ? AND owner_id = ?"),
            vec![id.into(), owner_id.into()],
        )
        .await
    }

    async fn find_by_id(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.query_account(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
            vec![id.into()],
        )
        .await
    }

    async fn find_by_owner(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        self.query_accounts(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = ? ORDER BY id"),
            vec![owner_id.into()],
        )
        .await
    }

    async fn find_all(&mut self) -> StoreResult<Vec<Account>> {
        self.query_accounts(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"),
            Vec::new(),
        )
        .await
    }

    async fn insert_account(
        &mut self,
        owner_id: UserId,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let result = self
            .tx
            .execute(self.statement(
                "INSERT INTO accounts (owner_id, balance, integrity_tag, created_at) \
                 VALUES (?, 0, '', ?)",
                vec![owner_id.into(), created_at.into()],
            ))
            .await?;
        let id = account_id(result.last_insert_id())?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::Decode(format!("inserted account {id} not readable")))
    }

    async fn save(&mut self, previous: &Account, updated: &Account) -> StoreResult<()> {
        let result = self
            .tx
            .execute(self.statement(
                "UPDATE accounts SET balance = ?, integrity_tag = ? \
                 WHERE id = ? AND balance = ? AND integrity_tag = ?",
                vec![
                    updated.balance.cents().into(),
                    updated.integrity_tag().into(),
                    previous.id.into(),
                    previous.balance.cents().into(),
                    previous.integrity_tag().into(),
                ],
            ))
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "account {} changed since it was read",
                previous.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for SqlUnit {
    async fn insert_transaction(&mut self, tx: &Transaction) -> StoreResult<()> {
        self.tx
            .execute(self.statement(
                &format!("INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
                vec![
                    tx.id.as_str().into(),
                    tx.from_account_id.into(),
                    tx.to_account_id.into(),
                    tx.amount.cents().into(),
                    tx.kind.as_str().into(),
                    tx.status.as_str().into(),
                    tx.created_at.into(),
                ],
            ))
            .await?;
        Ok(())
    }

    async fn find_for_account(&mut self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        let rows = self
            .tx
            .query_all(self.statement(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions \
                     WHERE from_account_id = ? OR to_account_id = ? \
                     ORDER BY created_at, id"
                ),
                vec![account_id.into(), account_id.into()],
            ))
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl UserRepository for SqlUnit {
    async fn insert_user(
        &mut self,
        username: &str,
        password: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<User> {
        self.tx
            .execute(self.statement(
                "INSERT INTO users (username, password, created_at) VALUES (?, ?, ?)",
                vec![username.into(), password.into(), created_at.into()],
            ))
            .await?;

        self.find_user_by_username(username)
            .await?
            .ok_or_else(|| StoreError::Decode(format!("inserted user {username} not readable")))
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        let row = self
            .tx
            .query_one(self.statement(
                "SELECT id, username, created_at FROM users WHERE username = ?",
                vec![username.into()],
            ))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl UnitOfWork for SqlUnit {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
