use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement, TransactionTrait,
};
use tempfile::TempDir;

use engine::{
    Account, AccountId, Claims, Clock, DepositCmd, Engine, EngineBuilder, EngineError,
    ErrorKind, LedgerStore, MoneyCents, OrmStore, RandomSource, SqlStore, StoreError,
    Transaction, TransactionKind, TransferCmd, UnitOfWork, User, UserId, WithdrawCmd,
    store::{AccountRepository, StoreResult, TransactionRepository, UserRepository},
};
use migration::MigratorTrait;

const SECRET: &str = "ledger-test-secret";

#[derive(Clone, Copy, Debug)]
enum Backend {
    Orm,
    Sql,
}

const BACKENDS: [Backend; 2] = [Backend::Orm, Backend::Sql];

async fn engine_with_db(backend: Backend) -> (Arc<Engine>, DatabaseConnection) {
    engine_with(backend, |builder| builder).await
}

async fn engine_with(
    backend: Backend,
    configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
) -> (Arc<Engine>, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    engine_on(db, backend, configure).await
}

/// File-backed database behind a real pool, so units of work overlap and
/// contend for the same rows. An in-memory database has one connection.
async fn pooled_engine(
    backend: Backend,
    dir: &TempDir,
    configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
) -> (Arc<Engine>, DatabaseConnection) {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    let mut options = ConnectOptions::new(url);
    options.max_connections(8).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    engine_on(db, backend, configure).await
}

async fn engine_on(
    db: DatabaseConnection,
    backend: Backend,
    configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
) -> (Arc<Engine>, DatabaseConnection) {
    migration::Migrator::up(&db, None).await.unwrap();

    let builder = Engine::builder().secret(SECRET);
    let builder = match backend {
        Backend::Orm => builder.database(db.clone()),
        Backend::Sql => builder.store(Arc::new(SqlStore::new(db.clone()))),
    };
    let engine = configure(builder).build().await.unwrap();
    (Arc::new(engine), db)
}

async fn user(engine: &Engine, name: &str) -> (Claims, AccountId) {
    let (user_id, account) = engine.register_user(name, "password").await.unwrap();
    (Claims::new(user_id), account.id)
}

async fn funded(engine: &Engine, name: &str, cents: i64) -> (Claims, AccountId) {
    let (claims, account_id) = user(engine, name).await;
    if cents > 0 {
        engine
            .deposit(DepositCmd::new(account_id, cents, claims))
            .await
            .unwrap();
    }
    (claims, account_id)
}

async fn balance(engine: &Engine, claims: Claims, account_id: AccountId) -> i64 {
    engine
        .get_accounts(claims.user_id)
        .await
        .unwrap()
        .into_iter()
        .find(|account| account.id == account_id)
        .map(|account| account.balance.cents())
        .unwrap()
}

async fn transaction_count(db: &DatabaseConnection) -> i64 {
    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT COUNT(*) AS n FROM transactions",
        ))
        .await
        .unwrap()
        .unwrap();
    row.try_get("", "n").unwrap()
}

async fn tamper_balance(db: &DatabaseConnection, account_id: AccountId, cents: i64) {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "UPDATE accounts SET balance = ? WHERE id = ?",
        vec![cents.into(), account_id.into()],
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn deposit_credits_balance_and_records_row() {
    for backend in BACKENDS {
        let (engine, db) = engine_with_db(backend).await;
        let (claims, account_id) = user(&engine, "alice").await;

        let tx_id = engine
            .deposit(DepositCmd::new(account_id, 100, claims))
            .await
            .unwrap();

        assert_eq!(balance(&engine, claims, account_id).await, 100);
        let history = engine
            .account_transactions(account_id, claims)
            .await
            .unwrap();
        assert_eq!(history.len(), 1, "{backend:?}");
        assert_eq!(history[0].id, tx_id);
        assert_eq!(history[0].kind, TransactionKind::Deposit);
        assert_eq!(history[0].from_account_id, None);
        assert_eq!(history[0].to_account_id, Some(account_id));
        assert_eq!(history[0].amount, MoneyCents::new(100));
        assert_eq!(transaction_count(&db).await, 1);
    }
}

#[tokio::test]
async fn withdraw_beyond_balance_changes_nothing() {
    for backend in BACKENDS {
        let (engine, db) = engine_with_db(backend).await;
        let (claims, account_id) = funded(&engine, "alice", 30).await;

        let err = engine
            .withdraw(WithdrawCmd::new(account_id, 50, claims))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::InsufficientFunds {
                account_id,
                balance: MoneyCents::new(30),
                requested: MoneyCents::new(50),
            }
        );
        assert_eq!(balance(&engine, claims, account_id).await, 30);
        assert_eq!(transaction_count(&db).await, 1, "{backend:?}");
    }
}

#[tokio::test]
async fn withdraw_debits_and_records_row() {
    for backend in BACKENDS {
        let (engine, _db) = engine_with_db(backend).await;
        let (claims, account_id) = funded(&engine, "alice", 30).await;

        engine
            .withdraw(WithdrawCmd::new(account_id, 30, claims))
            .await
            .unwrap();

        assert_eq!(balance(&engine, claims, account_id).await, 0);
        let history = engine
            .account_transactions(account_id, claims)
            .await
            .unwrap();
        let withdraw = history.last().unwrap();
        assert_eq!(withdraw.kind, TransactionKind::Withdraw);
        assert_eq!(withdraw.from_account_id, Some(account_id));
        assert_eq!(withdraw.to_account_id, None);
    }
}

#[tokio::test]
async fn transfer_moves_funds_and_conserves_total() {
    for backend in BACKENDS {
        let (engine, _db) = engine_with_db(backend).await;
        let (alice, a) = funded(&engine, "alice", 100).await;
        let (bob, b) = funded(&engine, "bob", 10).await;

        engine
            .transfer(TransferCmd::new(a, b, 40, alice))
            .await
            .unwrap();

        assert_eq!(balance(&engine, alice, a).await, 60);
        assert_eq!(balance(&engine, bob, b).await, 50);
        let transfer = engine
            .account_transactions(b, bob)
            .await
            .unwrap()
            .into_iter()
            .find(|tx| tx.kind == TransactionKind::Transfer)
            .unwrap();
        assert_eq!(transfer.from_account_id, Some(a));
        assert_eq!(transfer.to_account_id, Some(b));
        assert_eq!(transfer.amount, MoneyCents::new(40));

        // Source with the higher id.
        engine
            .transfer(TransferCmd::new(b, a, 25, bob))
            .await
            .unwrap();
        assert_eq!(balance(&engine, alice, a).await, 85);
        assert_eq!(balance(&engine, bob, b).await, 25);
    }
}

#[tokio::test]
async fn transfer_overdraft_leaves_both_balances() {
    for backend in BACKENDS {
        let (engine, db) = engine_with_db(backend).await;
        let (alice, a) = funded(&engine, "alice", 20).await;
        let (bob, b) = funded(&engine, "bob", 5).await;
        let rows = transaction_count(&db).await;

        let err = engine
            .transfer(TransferCmd::new(a, b, 21, alice))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(balance(&engine, alice, a).await, 20);
        assert_eq!(balance(&engine, bob, b).await, 5);
        assert_eq!(transaction_count(&db).await, rows);
    }
}

#[tokio::test]
async fn transfer_to_same_account_fails_before_loading() {
    let (engine, _db) = engine_with_db(Backend::Orm).await;
    let (claims, _) = user(&engine, "alice").await;

    // The account does not exist: a load would report NotFound.
    let err = engine
        .transfer(TransferCmd::new(999, 999, 10, claims))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let (engine, _db) = engine_with_db(Backend::Orm).await;
    let (claims, account_id) = funded(&engine, "alice", 10).await;
    let (_, other) = user(&engine, "bob").await;

    for amount in [0, -10] {
        let deposit = engine
            .deposit(DepositCmd::new(account_id, amount, claims))
            .await;
        let withdraw = engine
            .withdraw(WithdrawCmd::new(account_id, amount, claims))
            .await;
        let transfer = engine
            .transfer(TransferCmd::new(account_id, other, amount, claims))
            .await;

        for result in [deposit, withdraw, transfer] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
        }
    }
    assert_eq!(balance(&engine, claims, account_id).await, 10);
}

#[tokio::test]
async fn foreign_or_missing_accounts_are_not_found() {
    for backend in BACKENDS {
        let (engine, _db) = engine_with_db(backend).await;
        let (alice, a) = funded(&engine, "alice", 50).await;
        let (bob, b) = funded(&engine, "bob", 50).await;

        let err = engine
            .deposit(DepositCmd::new(b, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NotFound { account_id: b });

        let err = engine
            .withdraw(WithdrawCmd::new(b, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NotFound { account_id: b });

        let err = engine
            .transfer(TransferCmd::new(b, a, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NotFound { account_id: b });

        let err = engine
            .transfer(TransferCmd::new(a, 999, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NotFound { account_id: 999 });

        let err = engine.account_transactions(a, bob).await.unwrap_err();
        assert_eq!(err, EngineError::NotFound { account_id: a });

        assert_eq!(balance(&engine, alice, a).await, 50);
        assert_eq!(balance(&engine, bob, b).await, 50);
    }
}

#[tokio::test]
async fn tampered_account_fails_every_operation() {
    for backend in BACKENDS {
        let (engine, db) = engine_with_db(backend).await;
        let (alice, a) = funded(&engine, "alice", 100).await;
        let (bob, b) = funded(&engine, "bob", 100).await;
        let rows = transaction_count(&db).await;

        tamper_balance(&db, a, 1_000_000).await;
        let tampered = EngineError::Integrity { account_id: a };

        let err = engine
            .deposit(DepositCmd::new(a, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, tampered);

        let err = engine
            .withdraw(WithdrawCmd::new(a, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, tampered);

        let err = engine
            .transfer(TransferCmd::new(a, b, 10, alice))
            .await
            .unwrap_err();
        assert_eq!(err, tampered);

        // Tampered destination aborts the whole transfer.
        let err = engine
            .transfer(TransferCmd::new(b, a, 10, bob))
            .await
            .unwrap_err();
        assert_eq!(err, tampered);

        let err = engine.get_accounts(alice.user_id).await.unwrap_err();
        assert_eq!(err, tampered);

        let err = engine.account_transactions(a, alice).await.unwrap_err();
        assert_eq!(err, tampered);

        assert_eq!(balance(&engine, bob, b).await, 100, "{backend:?}");
        assert_eq!(transaction_count(&db).await, rows);
    }
}

#[tokio::test]
async fn get_accounts_returns_every_owned_account() {
    let (engine, _db) = engine_with_db(Backend::Sql).await;
    let (alice, first) = user(&engine, "alice").await;
    let second = engine.open_account(alice.user_id).await.unwrap();
    user(&engine, "bob").await;

    let accounts = engine.get_accounts(alice.user_id).await.unwrap();

    let ids: Vec<_> = accounts.iter().map(|account| account.id).collect();
    assert_eq!(ids, vec![first, second.id]);
    assert!(accounts.iter().all(|account| account.balance == MoneyCents::ZERO));
    assert!(accounts.iter().all(|account| account.owner_id == alice.user_id));
}

#[tokio::test]
async fn opened_accounts_carry_a_valid_tag() {
    for backend in BACKENDS {
        let (engine, _db) = engine_with_db(backend).await;
        let (alice, _) = user(&engine, "alice").await;

        let account = engine.open_account(alice.user_id).await.unwrap();

        assert_eq!(account.balance, MoneyCents::ZERO);
        assert!(!account.integrity_tag().is_empty());
        assert!(engine.audit().await.unwrap().is_empty());
        engine
            .deposit(DepositCmd::new(account.id, 1, alice))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn audit_reports_tampered_accounts() {
    let (engine, db) = engine_with_db(Backend::Orm).await;
    let (_, a) = funded(&engine, "alice", 10).await;
    let (_, b) = funded(&engine, "bob", 10).await;
    let (_, c) = funded(&engine, "carol", 10).await;

    tamper_balance(&db, a, 11).await;
    tamper_balance(&db, c, 0).await;

    assert_eq!(engine.audit().await.unwrap(), vec![a, c]);
    assert!(!engine.audit().await.unwrap().contains(&b));
}

#[tokio::test]
async fn register_rejects_duplicate_and_empty_credentials() {
    for backend in BACKENDS {
        let (engine, _db) = engine_with_db(backend).await;
        user(&engine, "alice").await;

        let err = engine.register_user("alice", "other").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = engine.register_user("  ", "password").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = engine.register_user("bob", "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn store_reports_duplicate_usernames() {
    for backend in BACKENDS {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let store: Arc<dyn LedgerStore> = match backend {
            Backend::Orm => Arc::new(OrmStore::new(db)),
            Backend::Sql => Arc::new(SqlStore::new(db)),
        };

        let mut unit = store.begin().await.unwrap();
        unit.insert_user("alice", "pw", Utc::now()).await.unwrap();
        let err = unit.insert_user("alice", "pw", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)), "{backend:?}: {err}");
        unit.rollback().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_of_one_name_admit_one() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _db) = pooled_engine(backend, &dir, |builder| builder.max_attempts(64)).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            tasks.spawn(async move { engine.register_user("carol", "pw").await });
        }
        let mut registered = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => registered += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::Validation, "{backend:?}: {err}"),
            }
        }
        assert_eq!(registered, 1, "{backend:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn contended_deposits_serialize() {
    const TASKS: i64 = 30;
    const AMOUNT: i64 = 5;

    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = pooled_engine(backend, &dir, |builder| builder.max_attempts(64)).await;
        let (claims, account_id) = funded(&engine, "alice", 7).await;
        let rows = transaction_count(&db).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..TASKS {
            let engine = Arc::clone(&engine);
            tasks.spawn(async move {
                engine
                    .deposit(DepositCmd::new(account_id, AMOUNT, claims))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(
            balance(&engine, claims, account_id).await,
            7 + TASKS * AMOUNT,
            "{backend:?}"
        );
        assert_eq!(transaction_count(&db).await, rows + TASKS);
        assert!(engine.audit().await.unwrap().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn contended_opposite_transfers_conserve_total() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = pooled_engine(backend, &dir, |builder| builder.max_attempts(64)).await;
        let (alice, a) = funded(&engine, "alice", 1_000).await;
        let (bob, b) = funded(&engine, "bob", 1_000).await;
        let rows = transaction_count(&db).await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..20 {
            let engine = Arc::clone(&engine);
            tasks.spawn(async move {
                match i % 4 {
                    0 => engine.transfer(TransferCmd::new(a, b, 30, alice)).await,
                    1 => engine.transfer(TransferCmd::new(b, a, 10, bob)).await,
                    2 => engine.deposit(DepositCmd::new(a, 5, alice)).await,
                    _ => engine.withdraw(WithdrawCmd::new(b, 5, bob)).await,
                }
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let a_balance = balance(&engine, alice, a).await;
        let b_balance = balance(&engine, bob, b).await;
        assert_eq!(a_balance, 1_000 - 5 * 30 + 5 * 10 + 5 * 5, "{backend:?}");
        assert_eq!(b_balance, 1_000 + 5 * 30 - 5 * 10 - 5 * 5, "{backend:?}");
        assert_eq!(transaction_count(&db).await, rows + 20);
        assert!(engine.audit().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn locked_account_exhausts_a_single_attempt() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = pooled_engine(backend, &dir, |builder| builder.max_attempts(1)).await;
        let (claims, account_id) = funded(&engine, "alice", 100).await;
        let rows = transaction_count(&db).await;

        // Another writer holds the database until after the deposit gives up.
        let writer = db.begin().await.unwrap();
        writer
            .execute(Statement::from_sql_and_values(
                writer.get_database_backend(),
                "UPDATE accounts SET balance = balance WHERE id = ?",
                vec![account_id.into()],
            ))
            .await
            .unwrap();

        let err = engine
            .deposit(DepositCmd::new(account_id, 50, claims))
            .await
            .unwrap_err();
        writer.rollback().await.unwrap();

        assert_eq!(err.kind(), ErrorKind::Persistence, "{backend:?}");
        assert!(err.to_string().contains("concurrent modification"), "{err}");
        assert!(err.to_string().contains("during deposit"), "{err}");
        assert_eq!(balance(&engine, claims, account_id).await, 100);
        assert_eq!(transaction_count(&db).await, rows);
    }
}

/// Store whose units fail their first `conflicts` commits with a conflict,
/// rolling the work back first.
#[derive(Debug)]
struct ConflictingStore {
    inner: OrmStore,
    conflicts: u32,
    begins: Arc<AtomicU32>,
}

#[async_trait]
impl LedgerStore for ConflictingStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let attempt = self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ConflictingUnit {
            inner: self.inner.begin().await?,
            conflict: attempt < self.conflicts,
        }))
    }
}

struct ConflictingUnit {
    inner: Box<dyn UnitOfWork>,
    conflict: bool,
}

#[async_trait]
impl AccountRepository for ConflictingUnit {
    async fn find_by_id_and_owner(
        &mut self,
        id: AccountId,
        owner_id: UserId,
    ) -> StoreResult<Option<Account>> {
        self.inner.find_by_id_and_owner(id, owner_id).await
    }

    async fn find_by_id(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_owner(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        self.inner.find_by_owner(owner_id).await
    }

    async fn find_all(&mut self) -> StoreResult<Vec<Account>> {
        self.inner.find_all().await
    }

    async fn insert_account(
        &mut self,
        owner_id: UserId,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        self.inner.insert_account(owner_id, created_at).await
    }

    async fn save(&mut self, previous: &Account, updated: &Account) -> StoreResult<()> {
        self.inner.save(previous, updated).await
    }
}

#[async_trait]
impl TransactionRepository for ConflictingUnit {
    async fn insert_transaction(&mut self, tx: &Transaction) -> StoreResult<()> {
        self.inner.insert_transaction(tx).await
    }

    async fn find_for_account(&mut self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        self.inner.find_for_account(account_id).await
    }
}

#[async_trait]
impl UserRepository for ConflictingUnit {
    async fn insert_user(
        &mut self,
        username: &str,
        password: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<User> {
        self.inner.insert_user(username, password, created_at).await
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_username(username).await
    }
}

#[async_trait]
impl UnitOfWork for ConflictingUnit {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.conflict {
            self.inner.rollback().await?;
            return Err(StoreError::Conflict("injected".to_string()));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

/// Engine over a shared in-memory database; only its deposit goes through
/// the conflicting store.
async fn conflicting_engine(
    conflicts: u32,
    max_attempts: u32,
) -> (Arc<Engine>, Arc<Engine>, Arc<AtomicU32>, DatabaseConnection) {
    let (plain, db) = engine_with_db(Backend::Orm).await;
    let begins = Arc::new(AtomicU32::new(0));
    let store = ConflictingStore {
        inner: OrmStore::new(db.clone()),
        conflicts,
        begins: Arc::clone(&begins),
    };
    let engine = Engine::builder()
        .store(Arc::new(store))
        .secret(SECRET)
        .max_attempts(max_attempts)
        .build()
        .await
        .unwrap();
    (plain, Arc::new(engine), begins, db)
}

#[tokio::test]
async fn conflicts_rerun_the_operation_from_a_fresh_read() {
    let (plain, engine, begins, db) = conflicting_engine(3, 16).await;
    let (claims, account_id) = funded(&plain, "alice", 100).await;
    let rows = transaction_count(&db).await;

    engine
        .deposit(DepositCmd::new(account_id, 25, claims))
        .await
        .unwrap();

    assert_eq!(begins.load(Ordering::SeqCst), 4);
    assert_eq!(balance(&plain, claims, account_id).await, 125);
    assert_eq!(transaction_count(&db).await, rows + 1);
}

#[tokio::test]
async fn conflicts_beyond_max_attempts_leave_no_trace() {
    let (plain, engine, begins, db) = conflicting_engine(u32::MAX, 1).await;
    let (claims, account_id) = funded(&plain, "alice", 100).await;
    let rows = transaction_count(&db).await;

    let err = engine
        .withdraw(WithdrawCmd::new(account_id, 25, claims))
        .await
        .unwrap_err();

    assert_eq!(begins.load(Ordering::SeqCst), 1);
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(err.to_string().contains("during withdraw"));
    assert_eq!(balance(&plain, claims, account_id).await, 100);
    assert_eq!(transaction_count(&db).await, rows);
}

#[tokio::test]
async fn business_errors_are_not_retried() {
    let (plain, engine, begins, _db) = conflicting_engine(u32::MAX, 16).await;
    let (claims, account_id) = funded(&plain, "alice", 10).await;

    let err = engine
        .withdraw(WithdrawCmd::new(account_id, 25, claims))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(begins.load(Ordering::SeqCst), 1);
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct FixedRandom;

impl RandomSource for FixedRandom {
    fn alphanumeric(&self, len: usize) -> String {
        "z".repeat(len)
    }
}

#[tokio::test]
async fn failed_record_insert_rolls_back_balance() {
    for backend in BACKENDS {
        let (engine, db) = engine_with(backend, |builder| {
            builder
                .clock(Arc::new(FixedClock(
                    Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
                )))
                .random(Arc::new(FixedRandom))
        })
        .await;
        let (claims, account_id) = funded(&engine, "alice", 100).await;

        // Same clock and entropy: the second id collides with the first.
        let err = engine
            .withdraw(WithdrawCmd::new(account_id, 40, claims))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Persistence, "{backend:?}");
        assert!(err.to_string().contains("during withdraw"));
        assert_eq!(balance(&engine, claims, account_id).await, 100);
        assert_eq!(transaction_count(&db).await, 1);
        assert!(engine.audit().await.unwrap().is_empty());
    }
}
