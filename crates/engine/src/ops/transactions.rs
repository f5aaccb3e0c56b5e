use crate::{
    Account, AccountId, DepositCmd, EngineError, MoneyCents, OpContext, ResultEngine,
    Transaction, TransactionKind, TransferCmd, UserId, WithdrawCmd,
    store::UnitOfWork,
};

use super::{Engine, with_unit};

fn ensure_positive(amount: MoneyCents) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::Validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn overflow(account_id: AccountId) -> EngineError {
    EngineError::Validation(format!("balance of account {account_id} would overflow"))
}

impl Engine {
    /// Credit `cmd.amount` to an account owned by the caller.
    ///
    /// Returns the id of the recorded `deposit` transaction.
    pub async fn deposit(&self, cmd: DepositCmd) -> ResultEngine<String> {
        ensure_positive(cmd.amount)?;
        let context = OpContext::new("deposit")
            .account(cmd.account_id)
            .amount(cmd.amount);

        with_unit!(self, context, |unit| {
            let account = self
                .load_owned(unit, cmd.account_id, cmd.claims.user_id)
                .await?;
            let balance = account
                .balance
                .checked_add(cmd.amount)
                .ok_or_else(|| overflow(account.id))?;

            self.store_balance(unit, &account, balance).await?;
            self.record(
                unit,
                TransactionKind::Deposit,
                None,
                Some(account.id),
                cmd.amount,
            )
            .await
        })
    }

    /// Debit `cmd.amount` from an account owned by the caller.
    ///
    /// Fails with [`EngineError::InsufficientFunds`] before anything is
    /// written when the balance does not cover the amount.
    pub async fn withdraw(&self, cmd: WithdrawCmd) -> ResultEngine<String> {
        ensure_positive(cmd.amount)?;
        let context = OpContext::new("withdraw")
            .account(cmd.account_id)
            .amount(cmd.amount);

        with_unit!(self, context, |unit| {
            let account = self
                .load_owned(unit, cmd.account_id, cmd.claims.user_id)
                .await?;
            let balance = debit(&account, cmd.amount)?;

            self.store_balance(unit, &account, balance).await?;
            self.record(
                unit,
                TransactionKind::Withdraw,
                Some(account.id),
                None,
                cmd.amount,
            )
            .await
        })
    }

    /// Move `cmd.amount` from an account owned by the caller to any other
    /// existing account.
    ///
    /// Both accounts are read and written in ascending id order, whichever
    /// is the source. Both tags are verified before any write.
    pub async fn transfer(&self, cmd: TransferCmd) -> ResultEngine<String> {
        ensure_positive(cmd.amount)?;
        if cmd.from_account_id == cmd.to_account_id {
            return Err(EngineError::Validation(
                "cannot transfer to the same account".to_string(),
            ));
        }
        let context = OpContext::new("transfer")
            .account(cmd.from_account_id)
            .amount(cmd.amount);

        with_unit!(self, context, |unit| {
            let source_first = cmd.from_account_id < cmd.to_account_id;
            let (from, from_balance, to) = if source_first {
                let from = self
                    .load_owned(unit, cmd.from_account_id, cmd.claims.user_id)
                    .await?;
                let from_balance = debit(&from, cmd.amount)?;
                let to = self.load_any(unit, cmd.to_account_id).await?;
                (from, from_balance, to)
            } else {
                // Read the destination first; it is checked after the source.
                let to = unit.find_by_id(cmd.to_account_id).await?;
                let from = self
                    .load_owned(unit, cmd.from_account_id, cmd.claims.user_id)
                    .await?;
                let from_balance = debit(&from, cmd.amount)?;
                let to = to.ok_or(EngineError::NotFound {
                    account_id: cmd.to_account_id,
                })?;
                self.integrity.ensure(&to)?;
                (from, from_balance, to)
            };
            let to_balance = to
                .balance
                .checked_add(cmd.amount)
                .ok_or_else(|| overflow(to.id))?;

            if source_first {
                self.store_balance(unit, &from, from_balance).await?;
                self.store_balance(unit, &to, to_balance).await?;
            } else {
                self.store_balance(unit, &to, to_balance).await?;
                self.store_balance(unit, &from, from_balance).await?;
            }
            self.record(
                unit,
                TransactionKind::Transfer,
                Some(from.id),
                Some(to.id),
                cmd.amount,
            )
            .await
        })
    }

    /// Load an account the caller owns and verify its tag.
    pub(super) async fn load_owned(
        &self,
        unit: &mut Box<dyn UnitOfWork>,
        account_id: AccountId,
        owner_id: UserId,
    ) -> ResultEngine<Account> {
        let account = unit
            .find_by_id_and_owner(account_id, owner_id)
            .await?
            .ok_or(EngineError::NotFound { account_id })?;
        self.integrity.ensure(&account)?;
        Ok(account)
    }

    async fn load_any(
        &self,
        unit: &mut Box<dyn UnitOfWork>,
        account_id: AccountId,
    ) -> ResultEngine<Account> {
        let account = unit
            .find_by_id(account_id)
            .await?
            .ok_or(EngineError::NotFound { account_id })?;
        self.integrity.ensure(&account)?;
        Ok(account)
    }

    /// Write a new balance together with its freshly computed tag.
    pub(super) async fn store_balance(
        &self,
        unit: &mut Box<dyn UnitOfWork>,
        account: &Account,
        balance: MoneyCents,
    ) -> ResultEngine<()> {
        let updated = account.rebalanced(balance, self.integrity.tag(balance, account.id));
        unit.save(account, &updated).await?;
        Ok(())
    }

    async fn record(
        &self,
        unit: &mut Box<dyn UnitOfWork>,
        kind: TransactionKind,
        from_account_id: Option<AccountId>,
        to_account_id: Option<AccountId>,
        amount: MoneyCents,
    ) -> ResultEngine<String> {
        let now = self.ids.now();
        let transaction = Transaction::completed(
            self.ids.transaction_id(now),
            kind,
            from_account_id,
            to_account_id,
            amount,
            now,
        );
        unit.insert_transaction(&transaction).await?;
        Ok(transaction.id)
    }
}

/// Balance left after taking `amount` out of `account`.
fn debit(account: &Account, amount: MoneyCents) -> ResultEngine<MoneyCents> {
    if account.balance < amount {
        return Err(EngineError::InsufficientFunds {
            account_id: account.id,
            balance: account.balance,
            requested: amount,
        });
    }
    account
        .balance
        .checked_sub(amount)
        .ok_or_else(|| overflow(account.id))
}
