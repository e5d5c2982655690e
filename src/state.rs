use crate::{config::Config, services::session_client::SessionClient, websocket::ChatRelay};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: ChatRelay,
    pub sessions: SessionClient,
}
