//! Keyed integrity tag binding an account's balance to its identity.
//!
//! The tag is an HMAC-SHA256 over `"<balance>:<account id>"`, hex encoded.
//! It only binds the *current* balance to the account id: a stale snapshot
//! that was correctly tagged at the time still verifies.

use ring::hmac;

use crate::{Account, AccountId, EngineError, MoneyCents, ResultEngine};

/// The shared secret used to compute and verify integrity tags.
///
/// Read-only after construction; cloning is cheap and shares nothing mutable.
#[derive(Clone, Debug)]
pub struct IntegrityKey {
    key: hmac::Key,
}

impl IntegrityKey {
    /// Build a key from the configured secret. An empty secret is rejected.
    pub fn new(secret: &[u8]) -> ResultEngine<Self> {
        if secret.is_empty() {
            return Err(EngineError::Validation(
                "integrity secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    /// Compute the tag for `balance` on `account_id`.
    #[must_use]
    pub fn tag(&self, balance: MoneyCents, account_id: AccountId) -> String {
        let tag = hmac::sign(&self.key, message(balance, account_id).as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Recompute the tag of `account` and compare it with the stored one.
    #[must_use]
    pub fn verify(&self, account: &Account) -> bool {
        let Ok(stored) = hex::decode(account.integrity_tag()) else {
            return false;
        };
        hmac::verify(
            &self.key,
            message(account.balance, account.id).as_bytes(),
            &stored,
        )
        .is_ok()
    }

    /// Like [`verify`](Self::verify) but turns a mismatch into
    /// [`EngineError::Integrity`].
    pub fn ensure(&self, account: &Account) -> ResultEngine<()> {
        if self.verify(account) {
            Ok(())
        } else {
            Err(EngineError::Integrity {
                account_id: account.id,
            })
        }
    }
}

fn message(balance: MoneyCents, account_id: AccountId) -> String {
    format!("{balance}:{account_id}")
}
