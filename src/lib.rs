#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires the production collaborators from configuration.
    pub fn from_config(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> Result<Self, errors::ServiceError> {
        let collaborators = handlers::Collaborators::from_config(db.clone(), &config)?;
        let services = handlers::AppServices::new(collaborators, &config);
        Ok(Self {
            db,
            config,
            services,
        })
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::checkout::checkout_routes())
        .merge(handlers::payment_webhooks::webhook_routes())
}

async fn metrics_text() -> impl IntoResponse {
    match crate::metrics::metrics_handler().await {
        Ok(body) => (StatusCode::OK, body),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("metrics error"),
        ),
    }
}

async fn metrics_json() -> impl IntoResponse {
    match crate::metrics::metrics_json_handler().await {
        Ok(json) => (StatusCode::OK, Json(json)),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "metrics error"})),
        ),
    }
}

/// Full application router with tracing and request-id layers.
pub fn build_router(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/", get(|| async { "booking-checkout-api up" }))
        .route("/metrics", get(metrics_text))
        .route("/metrics/json", get(metrics_json))
        .merge(handlers::health::health_routes())
        .merge(openapi::openapi_routes())
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
