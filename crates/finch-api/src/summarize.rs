//! `POST /summarize/:ticker/:source/:document_type/*path`: summarizes one
//! stored artifact now instead of waiting for the background worker.

use axum::{
  Json,
  extract::{Path, State},
};
use finch_core::{
  artifact::{ArtifactIdentity, DocumentType, Source, SummaryRecord},
  store::ArtifactStore,
};
use tracing::info;

use crate::{ApiState, error::ApiError};

pub async fn handler<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
  Path((ticker, source, document_type, path)): Path<(String, String, String, String)>,
) -> Result<Json<SummaryRecord>, ApiError> {
  let source: Source = source.parse()?;
  let identity = ArtifactIdentity::new(&ticker, source, DocumentType::new(document_type)?, &path)?;
  let summary = state.engine.summarize_now(&identity).await?;
  info!(identity = %identity, "on-demand summary finished");
  Ok(Json(summary))
}
