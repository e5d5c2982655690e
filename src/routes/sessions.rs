use crate::error::AppResult;
use crate::services::session_client::LiveSessionInfo;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;

/// Waiting-room lookup: session details for the join screen, proxied from the
/// platform service that owns the persisted session records.
pub async fn session_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<LiveSessionInfo>> {
    let info = state.sessions.get_session(&id).await?;
    Ok(Json(info))
}
