//! `POST /collect/:source/:ticker`: runs one collection on demand.
//!
//! Body (optional): `{"document_types":["10-K","8-K"]}`. An empty or absent
//! list collects the adapter's default types.

use axum::{
  Json,
  extract::{Path, State},
};
use bytes::Bytes;
use finch_core::{
  artifact::{DocumentType, Source},
  report::CollectionReport,
  source::DocumentTypeFilter,
  store::ArtifactStore,
};
use serde::Deserialize;
use tracing::info;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct CollectBody {
  #[serde(default)]
  pub document_types: Vec<String>,
}

impl CollectBody {
  fn parse(body: &[u8]) -> Result<Self, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
      return Ok(Self::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
  }

  fn filter(&self) -> Result<DocumentTypeFilter, ApiError> {
    let types = self
      .document_types
      .iter()
      .map(|t| DocumentType::new(t.as_str()))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(DocumentTypeFilter::only(types))
  }
}

pub async fn handler<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
  Path((source, ticker)): Path<(String, String)>,
  body: Bytes,
) -> Result<Json<CollectionReport>, ApiError> {
  let source: Source = source.parse()?;
  let filter = CollectBody::parse(&body)?.filter()?;
  let report = state.engine.collect(&ticker, source, &filter).await?;
  info!(
    ticker = %report.company,
    source = %source,
    created = report.created.len(),
    replaced = report.replaced.len(),
    unchanged = report.unchanged_count,
    failed = report.failed.len(),
    "on-demand collection finished"
  );
  Ok(Json(report))
}
