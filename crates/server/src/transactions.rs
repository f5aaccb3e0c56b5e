//! Balance-mutating endpoints.

use api_types::transaction::{AmountNew, TransactionCreated, TransferNew};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{Claims, DepositCmd, TransferCmd, WithdrawCmd};

use crate::{ServerError, server::ServerState};

pub async fn deposit(
    Extension(claims): Extension<Claims>,
    State(state): State<ServerState>,
    Path(account_id): Path<i64>,
    Json(payload): Json<AmountNew>,
) -> Result<(StatusCode, Json<TransactionCreated>), ServerError> {
    let transaction_id = state
        .engine
        .deposit(DepositCmd::new(account_id, payload.amount_minor, claims))
        .await?;

    Ok((StatusCode::CREATED, Json(TransactionCreated { transaction_id })))
}

pub async fn withdraw(
    Extension(claims): Extension<Claims>,
    State(state): State<ServerState>,
    Path(account_id): Path<i64>,
    Json(payload): Json<AmountNew>,
) -> Result<(StatusCode, Json<TransactionCreated>), ServerError> {
    let transaction_id = state
        .engine
        .withdraw(WithdrawCmd::new(account_id, payload.amount_minor, claims))
        .await?;

    Ok((StatusCode::CREATED, Json(TransactionCreated { transaction_id })))
}

pub async fn transfer(
    Extension(claims): Extension<Claims>,
    State(state): State<ServerState>,
    Json(payload): Json<TransferNew>,
) -> Result<(StatusCode, Json<TransactionCreated>), ServerError> {
    let transaction_id = state
        .engine
        .transfer(TransferCmd::new(
            payload.from_id,
            payload.to_id,
            payload.amount_minor,
            claims,
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(TransactionCreated { transaction_id })))
}
