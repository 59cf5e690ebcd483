//! Blob decryption and splitting pipeline.
//!
//! Ingests notification events referencing encrypted batch files in
//! remote object storage, and runs each referenced object through
//! decryption, size-bounded splitting, record verification, and
//! re-upload with summary metadata.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
