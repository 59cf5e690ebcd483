//! The pipeline driver.
//!
//! Sequences resolve, download, decrypt, split, verify, upload, and
//! enrich for one object. Stages either advance the descriptor or
//! stall it; the driver short-circuits on the first stall, and local
//! cleanup runs exactly once on every exit path, including
//! cancellation of the surrounding task. One failed object never
//! affects other in-flight objects.

use crate::config::AppConfig;
use crate::models::blob::{Application, BlobDescriptor, BlobStatus};
use crate::models::event::{BlobEvent, EventOutcome};
use crate::models::report::ReportMetaData;
use crate::services::blob_store::{BlobStore, StoreError};
use crate::services::decrypter::{DecryptError, Decrypter};
use crate::services::resolver::Resolver;
use crate::services::splitter::{SplitError, Splitter};
use crate::services::verifier::{Verifier, VerifyError};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Why a stage could not advance the descriptor. The object is dropped
/// and cleaned up; the process and the rest of the batch continue.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("wrong name format: `{0}`")]
    WrongNameFormat(String),
    #[error("download failed: {0}")]
    Download(StoreError),
    #[error("decryption failed: {0}")]
    Decrypt(DecryptError),
    #[error("split failed: {0}")]
    Split(SplitError),
    #[error("verification failed: {0}")]
    Verify(VerifyError),
    #[error("upload failed: {0}")]
    Upload(StoreError),
    #[error("metadata enrichment failed: {0}")]
    Enrich(StoreError),
    #[error("workspace setup failed: {0}")]
    Workspace(io::Error),
}

/// Summary of one successfully processed object.
#[derive(Debug)]
pub struct ProcessReport {
    pub name: String,
    pub application: Application,
    pub chunks: usize,
}

pub struct Pipeline {
    config: Arc<AppConfig>,
    store: Arc<dyn BlobStore>,
    decrypter: Decrypter,
    splitter: Splitter,
    verifier: Verifier,
    resolver: Resolver,
}

impl Pipeline {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn BlobStore>, decrypter: Decrypter) -> Self {
        let splitter = Splitter::new(
            config.line_threshold,
            config.contract_threshold,
            config.skip_checksum,
            config.decrypted_suffix.clone(),
        );
        Self {
            config,
            store,
            decrypter,
            splitter,
            verifier: Verifier::new(),
            resolver: Resolver::new(),
        }
    }

    /// Root of the per-process scratch space, exposed for readiness
    /// probing.
    pub fn working_dir(&self) -> &std::path::Path {
        &self.config.working_dir
    }

    /// Process one notification event end to end. Failures are
    /// absorbed here: the event is always answered, never re-raised.
    pub async fn handle(&self, event: BlobEvent) -> EventOutcome {
        let subject = event.subject.clone();
        match self.process(&subject).await {
            Ok(report) => {
                tracing::info!(
                    subject = %subject,
                    application = %report.application,
                    chunks = report.chunks,
                    "object processed"
                );
                EventOutcome {
                    subject,
                    handled: true,
                    detail: format!("{} chunks uploaded", report.chunks),
                }
            }
            Err(failure) => {
                tracing::warn!(subject = %subject, %failure, "object dropped");
                EventOutcome {
                    subject,
                    handled: false,
                    detail: failure.to_string(),
                }
            }
        }
    }

    /// Run the full stage sequence for one locator.
    pub async fn process(&self, subject: &str) -> Result<ProcessReport, StageFailure> {
        let mut blob = BlobDescriptor::new(subject);
        self.resolver.resolve(&mut blob, &self.config);
        if blob.status != BlobStatus::Received {
            return Err(StageFailure::WrongNameFormat(subject.to_string()));
        }
        // Chunk naming needs the positional segments, so a recognized
        // prefix with a malformed name body still stalls here.
        if let Err(err) = blob.parse_name_segments() {
            tracing::warn!(subject, %err, "wrong name format");
            return Err(StageFailure::WrongNameFormat(subject.to_string()));
        }

        // Scratch space is per object, so identically named blobs in
        // flight at the same time cannot collide.
        blob.workdir = self.config.working_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&blob.workdir)
            .await
            .map_err(StageFailure::Workspace)?;
        let mut workspace = Workspace::new(blob.workdir.clone());

        let result = self.run_stages(&mut blob).await;
        workspace.remove();
        blob.advance(BlobStatus::Deleted);
        result
    }

    async fn run_stages(&self, blob: &mut BlobDescriptor) -> Result<ProcessReport, StageFailure> {
        let encrypted = blob.local_path();
        self.store
            .download(&blob.container, &blob.name, &encrypted)
            .await
            .map_err(StageFailure::Download)?;
        blob.advance(BlobStatus::Downloaded);

        let decrypted = blob
            .workdir
            .join(format!("{}{}", blob.name, self.config.decrypted_suffix));
        {
            // Packet parsing and decryption are CPU-bound; keep them
            // off the async workers.
            let decrypter = self.decrypter.clone();
            let src = encrypted.clone();
            let dst = decrypted.clone();
            tokio::task::spawn_blocking(move || decrypter.decrypt_file(&src, &dst))
                .await
                .map_err(|err| {
                    StageFailure::Decrypt(DecryptError::Io(io::Error::other(err)))
                })?
                .map_err(StageFailure::Decrypt)?;
        }
        blob.advance(BlobStatus::Decrypted);

        let outcome = self
            .splitter
            .split(blob, &decrypted)
            .map_err(StageFailure::Split)?;
        blob.advance(BlobStatus::Split);
        let mut chunks = outcome.chunks;
        let mut report = (blob.application == Application::Aggregates)
            .then(|| ReportMetaData::new(outcome.checksum.unwrap_or_default()));

        for chunk in &mut chunks {
            // When the checksum line was kept as data it sits at the
            // head of the first chunk and is skipped by convention.
            let skip_first = !self.config.skip_checksum && chunk.chunk_index == 0;
            self.verifier
                .verify_file(
                    &chunk.local_path(),
                    chunk.application,
                    skip_first,
                    report.as_mut(),
                )
                .map_err(StageFailure::Verify)?;
            chunk.advance(BlobStatus::Verified);
        }
        blob.advance(BlobStatus::Verified);
        blob.report = report;

        for chunk in &mut chunks {
            self.store
                .upload(
                    &chunk.target_container,
                    &chunk.name,
                    &chunk.local_path(),
                    chunk.chunk_index,
                    chunk.chunk_total,
                )
                .await
                .map_err(StageFailure::Upload)?;
            chunk.advance(BlobStatus::Uploaded);
        }
        blob.advance(BlobStatus::Uploaded);

        if let Some(report) = blob.report.as_ref() {
            for chunk in &mut chunks {
                self.store
                    .set_metadata(&chunk.target_container, &chunk.name, report)
                    .await
                    .map_err(StageFailure::Enrich)?;
                chunk.advance(BlobStatus::Enriched);
            }
            blob.advance(BlobStatus::Enriched);
        }

        Ok(ProcessReport {
            name: blob.name.clone(),
            application: blob.application,
            chunks: chunks.len(),
        })
    }
}

/// Scratch directory for one object. Removal is idempotent and also
/// runs on drop, so cancellation of the surrounding task still cleans
/// up every local artifact.
struct Workspace {
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            removed: false,
        }
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.root) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.root.display(), %err, "failed to remove workspace");
            }
        }
        self.removed = true;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
