//! Command structs for engine operations.
//!
//! These types group parameters for the balance-mutating operations
//! (deposit/withdraw/transfer), keeping call sites readable.

use crate::{AccountId, MoneyCents, UserId};

/// The caller's verified identity. Authorization scope is "accounts owned
/// by `user_id`".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Claims {
    pub user_id: UserId,
}

impl Claims {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Credit an owned account.
#[derive(Clone, Debug)]
pub struct DepositCmd {
    pub account_id: AccountId,
    pub amount: MoneyCents,
    pub claims: Claims,
}

impl DepositCmd {
    #[must_use]
    pub fn new(account_id: AccountId, amount: impl Into<MoneyCents>, claims: Claims) -> Self {
        Self {
            account_id,
            amount: amount.into(),
            claims,
        }
    }
}

/// Debit an owned account.
#[derive(Clone, Debug)]
pub struct WithdrawCmd {
    pub account_id: AccountId,
    pub amount: MoneyCents,
    pub claims: Claims,
}

impl WithdrawCmd {
    #[must_use]
    pub fn new(account_id: AccountId, amount: impl Into<MoneyCents>, claims: Claims) -> Self {
        Self {
            account_id,
            amount: amount.into(),
            claims,
        }
    }
}

/// Move funds from an owned account to any existing account.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MoneyCents,
    pub claims: Claims,
}

impl TransferCmd {
    #[must_use]
    pub fn new(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: impl Into<MoneyCents>,
        claims: Claims,
    ) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount: amount.into(),
            claims,
        }
    }
}
