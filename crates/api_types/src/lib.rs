use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod user {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserNew {
        pub username: String,
        pub password: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserCreated {
        pub user_id: i64,
        /// The default account opened with the user.
        pub account_id: i64,
    }
}

pub mod account {
    use super::*;

    /// Public view of an account. The integrity tag is never exposed.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountView {
        pub id: i64,
        pub owner_id: i64,
        pub balance_minor: i64,
        pub created_at: DateTime<Utc>,
    }
}

pub mod transaction {
    use super::*;

    /// Body of `POST /deposit/{id}` and `POST /withdraw/{id}`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct AmountNew {
        pub amount_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransferNew {
        pub from_id: i64,
        pub to_id: i64,
        pub amount_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionCreated {
        pub transaction_id: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionKind {
        Deposit,
        Withdraw,
        Transfer,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: String,
        pub from_account_id: Option<i64>,
        pub to_account_id: Option<i64>,
        pub amount_minor: i64,
        pub kind: TransactionKind,
        pub status: String,
        pub created_at: DateTime<Utc>,
    }
}
