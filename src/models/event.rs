//! Inbound notification event payloads and the per-event outcome
//! reported back to the caller.

use serde::{Deserialize, Serialize};

/// Event type emitted when a new object lands in the store. Events of
/// any other type are ignored.
pub const BLOB_CREATED_EVENT: &str = "Microsoft.Storage.BlobCreated";

/// One notification event out of an inbound batch.
#[derive(Clone, Debug, Deserialize)]
pub struct BlobEvent {
    /// Resource locator of the object the event refers to.
    pub subject: String,

    /// Coarse discriminator; only creation events are processed.
    #[serde(rename = "eventType")]
    pub event_type: String,
}

/// What happened to one event of a batch.
#[derive(Clone, Debug, Serialize)]
pub struct EventOutcome {
    pub subject: String,
    pub handled: bool,
    pub detail: String,
}

/// Response body for a processed batch.
#[derive(Debug, Serialize)]
pub struct EventBatchResponse {
    pub handled: usize,
    pub ignored: usize,
    pub outcomes: Vec<EventOutcome>,
}
