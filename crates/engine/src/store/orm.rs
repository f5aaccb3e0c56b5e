use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, Condition, DatabaseConnection, DatabaseTransaction, QueryFilter, QueryOrder,
    TransactionTrait, prelude::*, sea_query::Expr,
};

use crate::{Account, AccountId, Transaction, User, UserId, accounts, transactions, users};

use super::{
    AccountRepository, LedgerStore, StoreError, StoreResult, TransactionRepository, UnitOfWork,
    UserRepository,
};

/// Ledger store backed by the sea-orm entities.
#[derive(Clone, Debug)]
pub struct OrmStore {
    database: DatabaseConnection,
}

impl OrmStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl LedgerStore for OrmStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.database.begin().await?;
        Ok(Box::new(OrmUnit { tx }))
    }
}

struct OrmUnit {
    tx: DatabaseTransaction,
}

#[async_trait]
impl AccountRepository for OrmUnit {
    async fn find_by_id_and_owner(
        &mut self,
        id: AccountId,
        owner_id: UserId,
    ) -> StoreResult<Option<Account>> {
        let model = accounts::Entity::find_by_id(id)
            .filter(accounts::Column::OwnerId.eq(owner_id))
            .one(&self.tx)
            .await?;
        Ok(model.map(Account::from))
    }

    async fn find_by_id(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        let model = accounts::Entity::find_by_id(id).one(&self.tx).await?;
        Ok(model.map(Account::from))
    }

    async fn find_by_owner(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        let models = accounts::Entity::find()
            .filter(accounts::Column::OwnerId.eq(owner_id))
            .order_by_asc(accounts::Column::Id)
            .all(&self.tx)
            .await?;
        Ok(models.into_iter().map(Account::from).collect())
    }

    async fn find_all(&mut self) -> StoreResult<Vec<Account>> {
        let models = accounts::Entity::find()
            .order_by_asc(accounts::Column::Id)
            .all(&self.tx)
            .await?;
        Ok(models.into_iter().map(Account::from).collect())
    }

    async fn insert_account(
        &mut self,
        owner_id: UserId,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let model = accounts::ActiveModel {
            id: ActiveValue::NotSet,
            owner_id: ActiveValue::Set(owner_id),
            balance: ActiveValue::Set(0),
            integrity_tag: ActiveValue::Set(String::new()),
            created_at: ActiveValue::Set(created_at),
        }
        .insert(&self.tx)
        .await?;
        Ok(model.into())
    }

    async fn save(&mut self, previous: &Account, updated: &Account) -> StoreResult<()> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::value(updated.balance.cents()),
            )
            .col_expr(
                accounts::Column::IntegrityTag,
                Expr::value(updated.integrity_tag()),
            )
            .filter(accounts::Column::Id.eq(previous.id))
            .filter(accounts::Column::Balance.eq(previous.balance.cents()))
            .filter(accounts::Column::IntegrityTag.eq(previous.integrity_tag()))
            .exec(&self.tx)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::Conflict(format!(
                "account {} changed since it was read",
                previous.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for OrmUnit {
    async fn insert_transaction(&mut self, tx: &Transaction) -> StoreResult<()> {
        transactions::ActiveModel::from(tx).insert(&self.tx).await?;
        Ok(())
    }

    async fn find_for_account(&mut self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        let models = transactions::Entity::find()
            .filter(
                Condition::any()
                    .add(transactions::Column::FromAccountId.eq(account_id))
                    .add(transactions::Column::ToAccountId.eq(account_id)),
            )
            .order_by_asc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::Id)
            .all(&self.tx)
            .await?;

        models
            .into_iter()
            .map(|model| {
                Transaction::try_from(model).map_err(|err| StoreError::Decode(err.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl UserRepository for OrmUnit {
    async fn insert_user(
        &mut self,
        username: &str,
        password: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<User> {
        let model = users::ActiveModel {
            id: ActiveValue::NotSet,
            username: ActiveValue::Set(username.to_string()),
            password: ActiveValue::Set(password.to_string()),
            created_at: ActiveValue::Set(created_at),
        }
        .insert(&self.tx)
        .await?;
        Ok(model.into())
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.tx)
            .await?;
        Ok(model.map(User::from))
    }
}

#[async_trait]
impl UnitOfWork for OrmUnit {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
