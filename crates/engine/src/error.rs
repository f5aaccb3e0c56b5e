//! The module contains the errors the engine can return.
//!
//! The set is closed: every failure is one of the [`ErrorKind`]s and carries
//! structured context (account id, amounts) instead of a formatted message.
//! Transport layers map the kind to their own status codes.
//!
//! Neither the integrity secret nor any stored tag is ever placed in an error.
use std::fmt;

use thiserror::Error;

use crate::{AccountId, MoneyCents, store::StoreError};

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller supplied invalid input (non-positive amount, same-account transfer).
    Validation,
    /// Account missing or not owned by the caller.
    NotFound,
    /// Requested amount exceeds the available balance.
    InsufficientFunds,
    /// Stored balance does not match its integrity tag.
    Integrity,
    /// Store I/O, constraint or commit failure. Nothing was written.
    Persistence,
}

/// Operation context attached to persistence failures for diagnosis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpContext {
    pub operation: &'static str,
    pub account_id: Option<AccountId>,
    pub amount: Option<MoneyCents>,
}

impl OpContext {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operation.is_empty() {
            return Ok(());
        }
        write!(f, " during {}", self.operation)?;
        if let Some(account_id) = self.account_id {
            write!(f, " (account_id: {account_id}")?;
            if let Some(amount) = self.amount {
                write!(f, ", amount: {amount}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("account {account_id} not found or access denied")]
    NotFound { account_id: AccountId },
    #[error(
        "insufficient funds in account {account_id}: balance {balance}, requested {requested}"
    )]
    InsufficientFunds {
        account_id: AccountId,
        balance: MoneyCents,
        requested: MoneyCents,
    },
    #[error("balance integrity check failed for account {account_id}")]
    Integrity { account_id: AccountId },
    #[error("persistence failure{context}: {source}")]
    Persistence {
        context: OpContext,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// `true` when the failure came from concurrent modification and the
    /// whole operation may be re-run from a fresh read.
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Persistence {
                source: StoreError::Conflict(_),
                ..
            }
        )
    }

    /// Attach the operation context to a persistence failure.
    pub(crate) fn with_context(self, context: &OpContext) -> Self {
        match self {
            Self::Persistence { source, .. } => Self::Persistence {
                context: context.clone(),
                source,
            },
            other => other,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(source: StoreError) -> Self {
        Self::Persistence {
            context: OpContext::default(),
            source,
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::NotFound { account_id: a }, Self::NotFound { account_id: b }) => a == b,
            (
                Self::InsufficientFunds {
                    account_id: a,
                    balance: ab,
                    requested: ar,
                },
                Self::InsufficientFunds {
                    account_id: b,
                    balance: bb,
                    requested: br,
                },
            ) => a == b && ab == bb && ar == br,
            (Self::Integrity { account_id: a }, Self::Integrity { account_id: b }) => a == b,
            (
                Self::Persistence {
                    context: ac,
                    source: a,
                },
                Self::Persistence {
                    context: bc,
                    source: b,
                },
            ) => ac == bc && a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
