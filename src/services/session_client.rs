//! Thin client for the platform service that owns persisted live-session
//! records. The relay itself keeps no session state; this exists for the
//! waiting-room UI, which asks for session details before opening the socket.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSessionInfo {
    pub title: String,
    pub trainer: String,
    pub scheduled_at: DateTime<Utc>,
    pub participants: Vec<String>,
    pub max_participants: u32,
    pub meeting_link: Option<String>,
}

#[derive(Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
}

impl SessionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_session(&self, session_id: &str) -> AppResult<LiveSessionInfo> {
        let url = format!("{}/live-sessions/{}", self.base_url, session_id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "session service returned {}",
                resp.status()
            )));
        }

        resp.json::<LiveSessionInfo>()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid session payload: {e}")))
    }
}
