//! Core types and trait definitions for the finch document ingestion engine.
//!
//! This crate is deliberately free of HTTP and filesystem dependencies.
//! All other crates depend on it: it owns the artifact model, the collection
//! index and the capability traits (store, source adapter, summarizer).

pub mod artifact;
pub mod company;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod report;
pub mod source;
pub mod store;
pub mod summarize;

pub use error::{Error, Result};
