use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not allowed to {0}")]
    Forbidden(&'static str),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not signed in")]
    Unauthenticated,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthenticated => Redirect::to("/login").into_response(),
            AppError::Store(ref err) => {
                tracing::error!(error = %format!("{err:#}"), "request failed");
                (self.status(), "internal error").into_response()
            }
            other => (other.status(), other.to_string()).into_response(),
        }
    }
}
