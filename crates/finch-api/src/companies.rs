//! Handlers for `/companies` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/companies` | Roster order |
//! | `GET`  | `/companies/:ticker` | 404 if not tracked |
//! | `POST` | `/companies/refresh-ciks` | 503 if no CIK directory is configured |

use axum::{
  Json,
  extract::{Path, State},
};
use finch_core::{
  company::{CompanyRecord, refresh_ciks as apply_refresh},
  index::ListFilter,
  store::ArtifactStore,
};
use serde::Serialize;
use tracing::info;

use crate::{ApiState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /companies`
pub async fn list<S: ArtifactStore>(State(state): State<ApiState<S>>) -> Json<Vec<CompanyRecord>> {
  Json(state.engine.roster().all())
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CompanyDetail {
  #[serde(flatten)]
  pub company:    CompanyRecord,
  pub documents:  usize,
  pub summarized: usize,
}

/// `GET /companies/:ticker`
pub async fn get_one<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
  Path(ticker): Path<String>,
) -> Result<Json<CompanyDetail>, ApiError> {
  let company = state.engine.roster().get(&ticker)?;
  let records = state.engine.index().list(&ListFilter::company(&company.ticker));
  Ok(Json(CompanyDetail {
    documents: records.len(),
    summarized: records.iter().filter(|r| r.has_current_summary()).count(),
    company,
  }))
}

// ─── Refresh CIKs ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
  pub updated: usize,
}

/// `POST /companies/refresh-ciks`
pub async fn refresh_ciks<S: ArtifactStore>(
  State(state): State<ApiState<S>>,
) -> Result<Json<RefreshResponse>, ApiError> {
  let directory = state
    .ciks
    .as_deref()
    .ok_or_else(|| ApiError::Unavailable("no CIK directory configured".into()))?;
  let updated = apply_refresh(state.engine.roster(), directory)
    .await
    .map_err(ApiError::Internal)?;
  info!(updated, "CIK refresh applied");
  Ok(Json(RefreshResponse { updated }))
}
