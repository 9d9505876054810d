use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
};

pub type ApiResult<T> = Result<T, ApiError>;

/// Request-level error taxonomy, mapped onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed request parameters.
    #[error("{0}")]
    Validation(String),

    /// The session key is already active.
    #[error("{0}")]
    Conflict(String),

    /// Unknown session, message or contact.
    #[error("{0}")]
    NotFound(String),

    /// Engine or storage failure; details stay in the logs.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({ "ok": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<zapgate_storage::Error> for ApiError {
    fn from(e: zapgate_storage::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<zapgate_supervisor::Error> for ApiError {
    fn from(e: zapgate_supervisor::Error) -> Self {
        match e {
            zapgate_supervisor::Error::Conflict(inner) => Self::Conflict(inner.to_string()),
            zapgate_supervisor::Error::NotConnected { .. } => Self::NotFound(e.to_string()),
            zapgate_supervisor::Error::Engine(inner) => Self::Internal(inner.to_string()),
        }
    }
}
