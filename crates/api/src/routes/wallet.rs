//! Internal wallet endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::UserId;
use domain::Money;
use event_bus::EventBus;
use event_store::EventStore;
use serde::Serialize;
use wallet::{RefundReceipt, RefundRequest};

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WalletBalanceResponse {
    pub user_id: UserId,
    pub balance: Money,
    pub available_balance: Money,
}

/// GET /internal/wallet/{user_id} — current wallet balances.
#[tracing::instrument(skip(state))]
pub async fn balance<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(user_id): Path<String>,
) -> Result<Json<WalletBalanceResponse>, ApiError>
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    let user_id = UserId::new(user_id);
    let wallet = state.wallet.wallet_balance(&user_id).await?;

    Ok(Json(WalletBalanceResponse {
        user_id,
        balance: wallet.balance(),
        available_balance: wallet.available_balance(),
    }))
}

/// POST /internal/wallet/refund — credit a refund back to a wallet.
#[tracing::instrument(skip(state, payload))]
pub async fn refund<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Json<RefundReceipt>, ApiError>
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let receipt = state.wallet.process_refund(request).await?;
    Ok(Json(receipt))
}
