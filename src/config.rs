use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL of the platform backend that owns persisted live-session records.
    pub session_service_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4100);
        let session_service_url = env::var("SESSION_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:5000/api".into());
        if session_service_url.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "SESSION_SERVICE_URL must not be empty".into(),
            ));
        }

        Ok(Self {
            port,
            session_service_url,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            port: 4100,
            session_service_url: "http://localhost:5000/api".into(),
        }
    }
}
