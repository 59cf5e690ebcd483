//! Core data models for the blob processing pipeline.
//!
//! One descriptor per object in flight, plus the record/report types
//! the splitter, verifier, and aggregator exchange.

pub mod blob;
pub mod contract;
pub mod event;
pub mod report;
