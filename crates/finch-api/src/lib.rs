//! JSON REST API for finch.
//!
//! Exposes an axum [`Router`] over an [`Engine`]: company lookups, artifact
//! listings, on-demand collection and summarization, summaries and engine
//! status.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", finch_api::api_router(ApiState::new(engine)))
//! ```

pub mod collect;
pub mod companies;
pub mod documents;
pub mod error;
pub mod status;
pub mod summarize;


use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use finch_core::{company::CikDirectory, store::ArtifactStore};
use finch_ingest::Engine;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared handler state.
pub struct ApiState<S> {
  pub engine: Arc<Engine<S>>,
  /// Where `POST /companies/refresh-ciks` fetches the ticker map from.
  pub ciks:   Option<Arc<dyn CikDirectory>>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self { Self { engine: self.engine.clone(), ciks: self.ciks.clone() } }
}

impl<S> ApiState<S> {
  pub fn new(engine: Arc<Engine<S>>) -> Self { Self { engine, ciks: None } }

  pub fn with_cik_directory(mut self, directory: Arc<dyn CikDirectory>) -> Self {
    self.ciks = Some(directory);
    self
  }
}

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: ArtifactStore>(state: ApiState<S>) -> Router<()> {
  Router::new()
    // Companies
    .route("/companies", get(companies::list::<S>))
    .route("/companies/refresh-ciks", post(companies::refresh_ciks::<S>))
    .route("/companies/{ticker}", get(companies::get_one::<S>))
    // Documents
    .route("/documents/{ticker}", get(documents::list::<S>))
    .route("/documents/{ticker}/{source}", get(documents::list_source::<S>))
    .route("/summaries/{ticker}", get(documents::summaries::<S>))
    // Collection
    .route("/collect/{source}/{ticker}", post(collect::handler::<S>))
    .route(
      "/summarize/{ticker}/{source}/{document_type}/{*path}",
      post(summarize::handler::<S>),
    )
    // Status
    .route("/status", get(status::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
