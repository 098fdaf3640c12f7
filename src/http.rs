// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # HTTP Surface
//!
//! Health and readiness checks plus the endpoint that sends an order to
//! payment. The listener outlives the consumer subsystem: it only starts its
//! own graceful shutdown once the `ShutdownCoordinator` released it, and
//! open connections get `SERVER_TIMEOUT` to finish before being dropped.

use crate::{
    broker::Broker,
    payment::{request_payment, Order, OrderRepository, PaymentRequestError},
    publisher::Publisher,
    shutdown::ShutdownCoordinator,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::IntoFuture, io, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers.
pub struct AppState {
    pub coordinator: Arc<ShutdownCoordinator>,
    pub broker: Arc<dyn Broker>,
    pub orders: Arc<dyn OrderRepository>,
    pub publisher: Arc<Publisher>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub version: String,
    pub broker_connected: bool,
    pub accepting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub queues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrderRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/payment-order", post(payment_order))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        version: state.version.clone(),
        broker_connected: state.broker.is_connected().await,
        accepting: !state.coordinator.is_stopping(),
    })
}

/// 503 once shutdown began or while the broker connection is down.
async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let ready = !state.coordinator.is_stopping() && state.broker.is_connected().await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            queues: state.coordinator.bound_queues(),
        }),
    )
}

async fn payment_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PaymentOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let correlation_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        order_id = %request.order_id,
        request_id = %correlation_id,
        "payment requested"
    );

    request_payment(
        &*state.orders,
        &state.publisher,
        &request.order_id,
        &correlation_id,
    )
    .await
    .map(Json)
    .map_err(|err| {
        let status = match &err {
            PaymentRequestError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            PaymentRequestError::InvalidStatus(..) => StatusCode::CONFLICT,
            PaymentRequestError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PaymentRequestError::Publish(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        warn!(error = err.to_string(), request_id = %correlation_id, "payment request rejected");

        (
            status,
            Json(ErrorResponse {
                message: err.to_string(),
            }),
        )
    })
}

/// Serves `app` until the coordinator releases the listener, then gives open
/// connections `timeout` to complete.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    coordinator: Arc<ShutdownCoordinator>,
    timeout: Duration,
) -> io::Result<()> {
    let released = coordinator.released_token();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { released.cancelled().await })
            .into_future(),
    );

    tokio::select! {
        result = &mut server => return joined(result),
        _ = coordinator.released() => {}
    }

    info!(timeout = ?timeout, "http server shutting down");
    match tokio::time::timeout(timeout, &mut server).await {
        Ok(result) => joined(result),
        Err(_) => {
            warn!("open connections after server timeout, closing them");
            server.abort();
            Ok(())
        }
    }
}

fn joined(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    result.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
}
