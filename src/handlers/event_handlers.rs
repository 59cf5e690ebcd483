//! HTTP handler for inbound notification batches.
//!
//! Each creation event in the batch becomes an independent unit of
//! work; units run concurrently and a failing object never aborts the
//! batch or the process.

use crate::errors::AppError;
use crate::models::event::{BLOB_CREATED_EVENT, BlobEvent, EventBatchResponse, EventOutcome};
use crate::services::pipeline::Pipeline;
use axum::{Json, extract::State};
use std::sync::Arc;
use tokio::task::JoinSet;

/// `POST /events` — receive a batch of blob notification events.
///
/// Non-creation events are counted as ignored. The response reports
/// the outcome per subject; a dropped object is still an answered
/// event, there is no re-delivery.
pub async fn receive_events(
    State(pipeline): State<Arc<Pipeline>>,
    Json(events): Json<Vec<BlobEvent>>,
) -> Result<Json<EventBatchResponse>, AppError> {
    if events.iter().any(|event| event.subject.is_empty()) {
        return Err(AppError::bad_request("event subject must not be empty"));
    }

    let mut ignored = 0usize;
    let mut tasks = JoinSet::new();
    for event in events {
        if event.event_type != BLOB_CREATED_EVENT {
            tracing::debug!(subject = %event.subject, event_type = %event.event_type, "ignoring event");
            ignored += 1;
            continue;
        }
        let pipeline = pipeline.clone();
        tasks.spawn(async move { pipeline.handle(event).await });
    }

    let mut outcomes: Vec<EventOutcome> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                // A panicked or cancelled unit of work; its workspace
                // guard has already cleaned up.
                tracing::error!(%err, "unit of work did not complete");
            }
        }
    }

    let handled = outcomes.len();
    Ok(Json(EventBatchResponse {
        handled,
        ignored,
        outcomes,
    }))
}
