//! Pipeline services: identity resolution, decryption, splitting,
//! verification, the remote store client, and the driver tying them
//! together.

pub mod blob_store;
pub mod decrypter;
pub mod pipeline;
pub mod resolver;
pub mod splitter;
pub mod verifier;
