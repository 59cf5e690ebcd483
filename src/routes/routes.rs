//! Defines the routes of the decrypter service.
//!
//! ## Structure
//! - `POST /events`  — receive a batch of blob notification events
//! - `GET  /healthz` — liveness
//! - `GET  /readyz`  — readiness (scratch-directory probe)

use crate::{
    handlers::{
        event_handlers::receive_events,
        health_handlers::{healthz, readyz},
    },
    services::pipeline::Pipeline,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Build and return the router for the service.
///
/// The router carries the shared `Pipeline` to all handlers; everything
/// a unit of work needs (config, key material, store client) lives
/// inside it, read-only.
pub fn routes() -> Router<Arc<Pipeline>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events", post(receive_events))
}
