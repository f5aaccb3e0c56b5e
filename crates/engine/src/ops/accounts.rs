use crate::{
    Account, AccountId, Claims, OpContext, ResultEngine, Transaction, UserId,
    store::UnitOfWork,
};

use super::{Engine, with_unit};

impl Engine {
    /// All accounts of `user_id`, ascending by id.
    ///
    /// Every tag is verified before anything is returned: one tampered
    /// account fails the whole call.
    pub async fn get_accounts(&self, user_id: UserId) -> ResultEngine<Vec<Account>> {
        with_unit!(self, OpContext::new("get_accounts"), |unit| {
            let accounts = unit.find_by_owner(user_id).await?;
            for account in &accounts {
                self.integrity.ensure(account)?;
            }
            Ok(accounts)
        })
    }

    /// Open an empty account for `owner_id`.
    pub async fn open_account(&self, owner_id: UserId) -> ResultEngine<Account> {
        with_unit!(self, OpContext::new("open_account"), |unit| {
            self.open_in(unit, owner_id).await
        })
    }

    /// History of an account owned by the caller, oldest first.
    pub async fn account_transactions(
        &self,
        account_id: AccountId,
        claims: Claims,
    ) -> ResultEngine<Vec<Transaction>> {
        let context = OpContext::new("account_transactions").account(account_id);
        with_unit!(self, context, |unit| {
            self.load_owned(unit, account_id, claims.user_id).await?;
            Ok(unit.find_for_account(account_id).await?)
        })
    }

    /// Ids of every account whose stored balance does not match its tag.
    ///
    /// Read-only; meant for operational alerting.
    pub async fn audit(&self) -> ResultEngine<Vec<AccountId>> {
        with_unit!(self, OpContext::new("audit"), |unit| {
            let accounts = unit.find_all().await?;
            Ok(accounts
                .iter()
                .filter(|account| !self.integrity.verify(account))
                .map(|account| account.id)
                .collect())
        })
    }

    /// Insert a zero-balance account and tag it. The tag binds the id, so it
    /// can only be computed once the row exists.
    pub(super) async fn open_in(
        &self,
        unit: &mut Box<dyn UnitOfWork>,
        owner_id: UserId,
    ) -> ResultEngine<Account> {
        let inserted = unit.insert_account(owner_id, self.ids.now()).await?;
        let tag = self.integrity.tag(inserted.balance, inserted.id);
        let account = inserted.rebalanced(inserted.balance, tag);
        unit.save(&inserted, &account).await?;
        Ok(account)
    }
}
