use actix_web::error;
use log::debug;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend did not respond within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl SiteError {
    pub fn validation(message: impl Into<String>) -> Self {
        SiteError::Validation(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        SiteError::Auth(message.into())
    }

    pub fn project_not_found(id: impl Into<String>) -> Self {
        SiteError::NotFound {
            entity: "Project",
            id: id.into(),
        }
    }
}

impl From<sled::Error> for SiteError {
    fn from(err: sled::Error) -> Self {
        SiteError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for SiteError {
    fn from(err: bincode::Error) -> Self {
        SiteError::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for SiteError {
    fn from(err: serde_json::Error) -> Self {
        SiteError::Encoding(err.to_string())
    }
}

impl From<reqwest::Error> for SiteError {
    fn from(err: reqwest::Error) -> Self {
        SiteError::Backend(err.to_string())
    }
}

impl From<tera::Error> for SiteError {
    fn from(err: tera::Error) -> Self {
        SiteError::Encoding(format!("{:?}", err))
    }
}

/// Logs the cause at debug level and answers with a generic 500.
pub fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}
