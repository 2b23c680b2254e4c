//! Public payment creation and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::PaymentId;
use event_bus::EventBus;
use event_store::EventStore;
use orchestrator::{
    CreateExternalPaymentRequest, CreateWalletPaymentRequest, PaymentResponse, PaymentStatus,
};

use crate::AppState;
use crate::error::ApiError;

/// POST /api/payments/wallet — create a wallet-funded payment.
#[tracing::instrument(skip(state, payload))]
pub async fn create_wallet<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    payload: Result<Json<CreateWalletPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError>
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let response = state.orchestrator.create_wallet_payment(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/payments/creditcard — create a card-funded payment.
#[tracing::instrument(skip(state, payload))]
pub async fn create_creditcard<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    payload: Result<Json<CreateExternalPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError>
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let response = state.orchestrator.create_external_payment(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/payments/{id} — fold a payment's history into its status.
#[tracing::instrument(skip(state))]
pub async fn status<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatus>, ApiError>
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    // Anything that is not a payment id cannot have events either.
    let payment_id = uuid::Uuid::parse_str(&id)
        .map(PaymentId::from_uuid)
        .map_err(|_| ApiError::NotFound(format!("payment not found: {id}")))?;

    let status = state.orchestrator.get_payment_status(payment_id).await?;
    Ok(Json(status))
}
