//! The blob descriptor — one instance per object in flight.
//!
//! A descriptor is created when a notification event arrives, threaded
//! through every pipeline stage, and dropped once local cleanup has run.
//! Nothing here is persisted; all state is re-derived from the object
//! store and the filesystem on each event.

use crate::models::report::ReportMetaData;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Sentinel used when a legacy object name omits the batch-service
/// chunk segment.
pub const BATCH_CHUNK_PLACEHOLDER: &str = "00";

/// The closed set of applications an object can resolve to.
///
/// Resolution is driven by the container prefix and the object-name
/// prefix together; any pair outside the lookup table is `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Application {
    /// Aggregate transaction exports (`ade` containers, `ADE.` blobs).
    Aggregates,
    /// Raw transaction exports (`rtd` containers, `CSTAR.` blobs).
    Transactions,
    /// Contract export files (`wallet` containers, `WALLET.` blobs).
    Contracts,
    /// Anything that did not match the lookup table.
    Unknown,
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Application::Aggregates => "aggregates",
            Application::Transactions => "transactions",
            Application::Contracts => "contracts",
            Application::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Lifecycle status of a blob.
///
/// Moves forward only; a stage that cannot complete leaves the status
/// untouched and the driver reacts to the stall. `Deleted` is terminal
/// and reachable from anywhere via cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum BlobStatus {
    Init,
    Received,
    Downloaded,
    Decrypted,
    Split,
    Verified,
    Uploaded,
    Enriched,
    Deleted,
}

/// A single object (or chunk of an object) moving through the pipeline.
#[derive(Clone, Debug)]
pub struct BlobDescriptor {
    /// The resource locator carried by the notification event.
    pub uri: String,

    /// Source container, extracted from the locator.
    pub container: String,

    /// Object name within the container. For chunks this is the
    /// computed chunk name, not the source name.
    pub name: String,

    /// Name of the object this descriptor descends from. Equal to
    /// `name` for top-level objects.
    pub original_name: String,

    /// Resolved application, `Unknown` until resolution succeeds.
    pub application: Application,

    /// Destination container, chosen per application from config.
    pub target_container: String,

    /// Current lifecycle status.
    pub status: BlobStatus,

    /// Sender code parsed positionally from the object name.
    pub sender_code: String,

    /// File creation date segment (`yyyyMMdd`) from the object name.
    pub file_creation_date: String,

    /// File creation time segment (`HHmmss`) from the object name.
    pub file_creation_time: String,

    /// Flow sequence number segment from the object name.
    pub flow_number: String,

    /// Two-digit batch-service chunk segment, or the placeholder when
    /// the legacy name format omits it.
    pub batch_chunk: String,

    /// Zero-based index of this chunk within its parent, 0 for
    /// top-level objects.
    pub chunk_index: usize,

    /// Total number of chunks the parent was split into. Back-filled
    /// onto every chunk once splitting completes.
    pub chunk_total: usize,

    /// Scratch directory holding every local artifact for this object.
    pub workdir: PathBuf,

    /// Summary statistics gathered while scanning records, attached on
    /// the enrichment path for aggregate exports.
    pub report: Option<ReportMetaData>,
}

impl BlobDescriptor {
    /// Create a descriptor in `Init` for the given locator.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            container: String::new(),
            name: String::new(),
            original_name: String::new(),
            application: Application::Unknown,
            target_container: String::new(),
            status: BlobStatus::Init,
            sender_code: String::new(),
            file_creation_date: String::new(),
            file_creation_time: String::new(),
            flow_number: String::new(),
            batch_chunk: BATCH_CHUNK_PLACEHOLDER.to_string(),
            chunk_index: 0,
            chunk_total: 0,
            workdir: PathBuf::new(),
            report: None,
        }
    }

    /// Advance the lifecycle status. Transitions never move backwards;
    /// a stage that cannot complete simply does not call this.
    pub fn advance(&mut self, next: BlobStatus) {
        debug_assert!(next >= self.status, "status must not move backwards");
        self.status = next;
    }

    /// Parse the positional segments of the object name.
    ///
    /// Expected grammar, dot-separated:
    /// `<APP>.<SENDER>.TRNLOG.<DATE>.<TIME>.<FLOW>[.<CHUNK2>]` followed
    /// by the file suffix. The two-digit chunk segment is optional; its
    /// absence is the legacy format and yields the placeholder.
    pub fn parse_name_segments(&mut self) -> Result<(), NameFormatError> {
        let parts: Vec<&str> = self.name.split('.').collect();
        if parts.len() < 6 {
            return Err(NameFormatError::new(&self.name, "too few segments"));
        }
        if parts[2] != "TRNLOG" {
            return Err(NameFormatError::new(&self.name, "missing TRNLOG segment"));
        }
        if parts[3].len() != 8 || !parts[3].bytes().all(|b| b.is_ascii_digit()) {
            return Err(NameFormatError::new(&self.name, "malformed date segment"));
        }
        if parts[4].len() != 6 || !parts[4].bytes().all(|b| b.is_ascii_digit()) {
            return Err(NameFormatError::new(&self.name, "malformed time segment"));
        }

        self.sender_code = parts[1].to_string();
        self.file_creation_date = parts[3].to_string();
        self.file_creation_time = parts[4].to_string();
        self.flow_number = parts[5].to_string();
        self.batch_chunk = match parts.get(6) {
            Some(seg) if seg.len() == 2 && seg.bytes().all(|b| b.is_ascii_digit()) => {
                seg.to_string()
            }
            _ => BATCH_CHUNK_PLACEHOLDER.to_string(),
        };
        Ok(())
    }

    /// Compute the name for chunk `index` of this object.
    ///
    /// Aggregates use a fixed-width counter appended to the batch-chunk
    /// segment; every other application appends the index and the
    /// decrypted suffix to the original name.
    pub fn chunk_name(&self, index: usize, decrypted_suffix: &str) -> String {
        match self.application {
            Application::Aggregates => format!(
                "AGGADE.{}.{}.{}.{}.{}{:03}",
                self.sender_code,
                self.file_creation_date,
                self.file_creation_time,
                self.flow_number,
                self.batch_chunk,
                index
            ),
            _ => format!("{}.{}{}", self.original_name, index, decrypted_suffix),
        }
    }

    /// Build the descendant descriptor for one chunk.
    pub fn chunk(&self, index: usize, decrypted_suffix: &str) -> BlobDescriptor {
        let mut child = self.clone();
        child.name = self.chunk_name(index, decrypted_suffix);
        child.original_name = self.original_name.clone();
        child.chunk_index = index;
        child.status = BlobStatus::Split;
        child.report = None;
        child
    }

    /// Local path of this descriptor's payload inside the workdir.
    pub fn local_path(&self) -> PathBuf {
        self.workdir.join(&self.name)
    }
}

/// The object name does not follow the positional naming convention.
#[derive(Debug, thiserror::Error)]
#[error("wrong name format for `{name}`: {reason}")]
pub struct NameFormatError {
    pub name: String,
    pub reason: &'static str,
}

impl NameFormatError {
    fn new(name: &str, reason: &'static str) -> Self {
        Self {
            name: name.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_with_name(name: &str) -> BlobDescriptor {
        let mut blob = BlobDescriptor::new(format!("/blobServices/default/containers/x/blobs/{name}"));
        blob.name = name.to_string();
        blob.original_name = name.to_string();
        blob
    }

    #[test]
    fn parses_segments_with_batch_chunk() {
        let mut blob = descriptor_with_name("ADE.12345.TRNLOG.20220503.174947.001.01.csv.pgp");
        blob.parse_name_segments().unwrap();
        assert_eq!(blob.sender_code, "12345");
        assert_eq!(blob.file_creation_date, "20220503");
        assert_eq!(blob.file_creation_time, "174947");
        assert_eq!(blob.flow_number, "001");
        assert_eq!(blob.batch_chunk, "01");
    }

    #[test]
    fn legacy_name_defaults_batch_chunk() {
        let mut blob = descriptor_with_name("ADE.99999.TRNLOG.20220101.120000.002.csv.pgp");
        blob.parse_name_segments().unwrap();
        assert_eq!(blob.batch_chunk, BATCH_CHUNK_PLACEHOLDER);
    }

    #[test]
    fn rejects_malformed_names() {
        let mut blob = descriptor_with_name("ADE.12345.csv.pgp");
        assert!(blob.parse_name_segments().is_err());

        let mut blob = descriptor_with_name("ADE.12345.TRNLOG.20AB0503.174947.001.csv.pgp");
        assert!(blob.parse_name_segments().is_err());
    }

    #[test]
    fn aggregate_chunk_names_are_fixed_width() {
        let mut blob = descriptor_with_name("ADE.12345.TRNLOG.20220503.174947.001.01.csv.pgp");
        blob.application = Application::Aggregates;
        blob.parse_name_segments().unwrap();
        assert_eq!(
            blob.chunk_name(0, ".decrypted"),
            "AGGADE.12345.20220503.174947.001.01000"
        );
        assert_eq!(
            blob.chunk_name(42, ".decrypted"),
            "AGGADE.12345.20220503.174947.001.01042"
        );
    }

    #[test]
    fn transaction_chunk_names_use_suffix() {
        let mut blob = descriptor_with_name("CSTAR.12345.TRNLOG.20220503.174947.001.csv.pgp");
        blob.application = Application::Transactions;
        blob.parse_name_segments().unwrap();
        assert_eq!(
            blob.chunk_name(2, ".decrypted"),
            "CSTAR.12345.TRNLOG.20220503.174947.001.csv.pgp.2.decrypted"
        );
    }

    #[test]
    fn status_ordering_is_monotone() {
        assert!(BlobStatus::Init < BlobStatus::Received);
        assert!(BlobStatus::Verified < BlobStatus::Uploaded);
        assert!(BlobStatus::Enriched < BlobStatus::Deleted);
    }
}
