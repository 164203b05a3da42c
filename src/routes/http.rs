//! HTTP endpoint handlers. Thin wrappers over the per-session workflow.
//!
//! The workflow itself never blocks on its collaborators; these handlers
//! optionally wait on the session's snapshot stream so plain request/response
//! clients get the settled state back. Push-style clients should use the
//! WebSocket instead.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::domain::Phase;
use crate::protocol::*;
use crate::session::Session;
use crate::state::AppState;

type HttpError = (StatusCode, String);

async fn find_session(state: &AppState, id: &str) -> Result<Arc<Session>, HttpError> {
  state
    .session(id)
    .await
    .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown sessionId: {}", id)))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_open_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let (session_id, _) = state.open_session().await;
  Json(SessionOut { session_id })
}

/// Kick off a challenge load and wait for it to settle (Active or Idle).
#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id))]
pub async fn http_new_challenge(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewChallengeIn>,
) -> Result<Json<SnapshotOut>, HttpError> {
  let session = find_session(&state, &body.session_id).await?;
  let difficulty = body.difficulty.unwrap_or_else(|| "easy".into());
  let mut sub = session.subscribe();
  session.request_challenge(difficulty.clone()).await;
  let snap = sub
    .wait_for(|s| s.phase != Phase::Loading)
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "session gone".into()))?
    .clone();
  info!(target: "challenge", %difficulty, phase = ?snap.phase, "HTTP challenge request settled");
  Ok(Json(snapshot_out(&snap)))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, text_len = body.text.len()))]
pub async fn http_edit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EditIn>,
) -> Result<Json<SnapshotOut>, HttpError> {
  let session = find_session(&state, &body.session_id).await?;
  session
    .edit(&body.text)
    .await
    .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
  Ok(Json(snapshot_out(&session.snapshot())))
}

/// Submit the current draft and wait for the verdict (or evaluation failure).
#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id))]
pub async fn http_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<SnapshotOut>, HttpError> {
  let session = find_session(&state, &body.session_id).await?;
  let mut sub = session.subscribe();
  session
    .submit()
    .await
    .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
  let snap = sub
    .wait_for(|s| s.phase != Phase::Submitting)
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "session gone".into()))?
    .clone();
  info!(target: "challenge", phase = ?snap.phase, resolved = snap.verdict.is_some(), "HTTP submit settled");
  Ok(Json(snapshot_out(&snap)))
}

#[instrument(level = "info", skip(state), fields(session_id = %q.session_id))]
pub async fn http_state(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionQuery>,
) -> Result<Json<SnapshotOut>, HttpError> {
  let session = find_session(&state, &q.session_id).await?;
  Ok(Json(snapshot_out(&session.snapshot())))
}

#[instrument(level = "info", skip(state), fields(session_id = %q.session_id))]
pub async fn http_hint(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionQuery>,
) -> Result<Json<HintOut>, HttpError> {
  let session = find_session(&state, &q.session_id).await?;
  let text = state.hint(&session).await;
  info!(target: "challenge", "HTTP hint served");
  Ok(Json(HintOut { text }))
}
