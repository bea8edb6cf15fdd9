//! Error type definitions for the media proxy core
//!
//! This module defines the application-wide error type, providing a small
//! hierarchy that maps directly onto the HTTP status codes the proxy's
//! handlers are allowed to return.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Top-level application error type.
///
/// Every handler in `crate::web` returns `Result<_, AppError>`; the
/// `IntoResponse` impl below is the single place that decides the wire
/// shape of an error response.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed `Range` header, malformed/expired token, oversize playlist,
    /// invalid URL.
    #[error("{0}")]
    BadRequest(String),

    /// Egress-to-local denied, or a token's `roomId`/`movieId` does not
    /// match the path it was presented on.
    #[error("{0}")]
    Forbidden(String),

    /// Outbound GET failed, read error, seek error.
    #[error("{0}")]
    Upstream(String),

    /// Cache get/set failed, signing failed, or any other programming-error
    /// class failure.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<axum::http::Error> for AppError {
    fn from(err: axum::http::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Upstream(_) | Self::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
