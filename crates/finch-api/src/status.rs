//! `GET /status`

use axum::{Json, extract::State};
use finch_core::store::ArtifactStore;
use finch_ingest::SystemStatus;

use crate::ApiState;

pub async fn handler<S: ArtifactStore>(State(state): State<ApiState<S>>) -> Json<SystemStatus> {
  Json(state.engine.status())
}
