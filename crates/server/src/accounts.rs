//! Account read endpoints.

use api_types::{
    account::AccountView,
    transaction::{TransactionKind as ApiKind, TransactionView},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use engine::Claims;

use crate::{ServerError, server::ServerState};

fn map_kind(kind: engine::TransactionKind) -> ApiKind {
    match kind {
        engine::TransactionKind::Deposit => ApiKind::Deposit,
        engine::TransactionKind::Withdraw => ApiKind::Withdraw,
        engine::TransactionKind::Transfer => ApiKind::Transfer,
    }
}

pub async fn list(
    Extension(claims): Extension<Claims>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<AccountView>>, ServerError> {
    let accounts = state.engine.get_accounts(claims.user_id).await?;

    Ok(Json(
        accounts
            .into_iter()
            .map(|account| AccountView {
                id: account.id,
                owner_id: account.owner_id,
                balance_minor: account.balance.cents(),
                created_at: account.created_at,
            })
            .collect(),
    ))
}

pub async fn transactions(
    Extension(claims): Extension<Claims>,
    State(state): State<ServerState>,
    Path(account_id): Path<i64>,
) -> Result<Json<Vec<TransactionView>>, ServerError> {
    let txs = state.engine.account_transactions(account_id, claims).await?;

    Ok(Json(
        txs.into_iter()
            .map(|tx| TransactionView {
                kind: map_kind(tx.kind),
                status: tx.status.as_str().to_string(),
                id: tx.id,
                from_account_id: tx.from_account_id,
                to_account_id: tx.to_account_id,
                amount_minor: tx.amount.cents(),
                created_at: tx.created_at,
            })
            .collect(),
    ))
}
