//! Handlers for artifact listings and summaries.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/documents/:ticker` | Optional `?source=ir\|sec&document_type=<type>` |
//! | `GET`  | `/documents/:ticker/:source` | Optional `?document_type=<type>` |
//! | `GET`  | `/summaries/:ticker` | Only summaries of current content |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use finch_core::{
  artifact::{ArtifactIdentity, ArtifactRecord, DocumentType, Source, SummaryRecord},
  index::ListFilter,
  store::ArtifactStore,
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub source:        Option<Source>,
  pub document_type: Option<String>,
}

fn filter_for(ticker: &str, source: Option<Source>, document_type: Option<&str>) -> Result<ListFilter, ApiError> {
  let mut filter = ListFilter::company(ticker);
  if let Some(source) = source {
    filter = filter.with_source(source);
  }
  if let Some(document_type) = document_type.filter(|d| !d.is_empty()) {
    filter = filter.with_document_type(DocumentType::new(document_type)?);
  }
  Ok(filter)
}

fn list_records<S: ArtifactStore>(
  state: &ApiState<S>,
  ticker: &str,
  source: Option<Source>,
  document_type: Option<&str>,
) -> Result<Vec<ArtifactRecord>, ApiError> {
  let company = state.engine.roster().get(ticker)?;
  let filter = filter_for(&company.ticker, source, document_type)?;
  Ok(state.engine.index().list(&filter))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /documents/:ticker[?source=<source>&document_type=<type>]`
pub async fn list<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
  Path(ticker): Path<String>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ArtifactRecord>>, ApiError> {
  let records = list_records(&state, &ticker, params.source, params.document_type.as_deref())?;
  Ok(Json(records))
}

/// `GET /documents/:ticker/:source[?document_type=<type>]`
pub async fn list_source<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
  Path((ticker, source)): Path<(String, String)>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ArtifactRecord>>, ApiError> {
  let source: Source = source.parse()?;
  let records = list_records(&state, &ticker, Some(source), params.document_type.as_deref())?;
  Ok(Json(records))
}

// ─── Summaries ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SummaryEntry {
  pub identity: ArtifactIdentity,
  pub summary:  SummaryRecord,
}

/// `GET /summaries/:ticker`
pub async fn summaries<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
  Path(ticker): Path<String>,
) -> Result<Json<Vec<SummaryEntry>>, ApiError> {
  let entries = list_records(&state, &ticker, None, None)?
    .into_iter()
    .filter(ArtifactRecord::has_current_summary)
    .filter_map(|r| r.summary.map(|summary| SummaryEntry { identity: r.identity, summary }))
    .collect();
  Ok(Json(entries))
}
