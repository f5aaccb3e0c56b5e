//! Registration endpoint.

use api_types::user::{UserCreated, UserNew};
use axum::{Json, extract::State, http::StatusCode};

use crate::{ServerError, server::ServerState};

/// Register a user and open its default account.
pub async fn register(
    State(state): State<ServerState>,
    Json(payload): Json<UserNew>,
) -> Result<(StatusCode, Json<UserCreated>), ServerError> {
    let (user_id, account) = state
        .engine
        .register_user(&payload.username, &payload.password)
        .await?;
    tracing::info!(user_id, account_id = account.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(UserCreated {
            user_id,
            account_id: account.id,
        }),
    ))
}
