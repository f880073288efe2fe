use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use beacon::NotificationError;
use log::error;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Notification(NotificationError),
    Internal(anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notification(e) => write!(f, "{}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl From<NotificationError> for AppError {
    fn from(e: NotificationError) -> Self {
        Self::Notification(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("{}", self);

        let message = self.to_string();
        let (status, error) = match self {
            Self::Notification(NotificationError::Credential(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "credential_unavailable")
            }
            Self::Notification(NotificationError::Api(_)) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            Self::Notification(
                NotificationError::Decode(_)
                | NotificationError::MissingMailbox
                | NotificationError::MissingCursor(_),
            ) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Notification(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
