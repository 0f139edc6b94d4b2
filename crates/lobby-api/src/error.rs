use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use lobby_gateway::error::{ChatError, GENERIC_FAILURE};
use lobby_gateway::store::StoreError;
use lobby_types::api::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                GENERIC_FAILURE.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(anyhow::Error::new(e))
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Invalid(reason) => ApiError::BadRequest(reason),
            ChatError::Forbidden => ApiError::Forbidden("Admin access required".into()),
            ChatError::NotFound => ApiError::NotFound,
            ChatError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn chat_errors_map_to_status_codes() {
        let cases = [
            (ChatError::invalid("nope"), StatusCode::BAD_REQUEST),
            (ChatError::Forbidden, StatusCode::FORBIDDEN),
            (ChatError::NotFound, StatusCode::NOT_FOUND),
            (
                ChatError::Store(StoreError::Timeout(Duration::from_secs(5))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (chat, status) in cases {
            assert_eq!(ApiError::from(chat).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = ApiError::Internal(anyhow::anyhow!("disk I/O error at /var/lib/lobby.db"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
