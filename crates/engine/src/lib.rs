pub use accounts::Account;
pub use commands::{Claims, DepositCmd, TransferCmd, WithdrawCmd};
pub use error::{EngineError, ErrorKind, OpContext};
pub use ids::{Clock, IdGenerator, RandomSource, SystemClock, ThreadRandom};
pub use integrity::IntegrityKey;
pub use money::MoneyCents;
pub use ops::{Engine, EngineBuilder};
pub use store::{LedgerStore, OrmStore, SqlStore, StoreError, UnitOfWork};
pub use transactions::{Transaction, TransactionKind, TransactionStatus};
pub use users::User;

pub mod accounts;
mod commands;
mod error;
mod ids;
mod integrity;
mod money;
mod ops;
pub mod store;
pub mod transactions;
pub mod users;

pub type AccountId = i64;
pub type UserId = i64;

type ResultEngine<T> = Result<T, EngineError>;
