//! Concrete source adapters and the summarizer backend.
//!
//! - [`sec::SecAdapter`] pulls recent filings from the SEC EDGAR API.
//! - [`ir::IrAdapter`] scrapes a company's investor-relations page for
//!   document links.
//! - [`openai::OpenAiSummarizer`] summarizes artifact text with an
//!   OpenAI-compatible chat completions endpoint.

pub mod error;
pub mod extract;
pub mod http;
pub mod ir;
pub mod openai;
pub mod sec;

pub use error::{Error, Result};
pub use ir::{IrAdapter, IrConfig};
pub use openai::{OpenAiConfig, OpenAiSummarizer};
pub use sec::{SecAdapter, SecConfig};

#[cfg(test)]
mod test_server;
