use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crypto::obfuscation::DecodeError;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// The connection pool could not hand out a client.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool could not be built from the configuration.
    #[error("Pool build error: {0}")]
    PoolBuild(#[from] deadpool_postgres::CreatePoolError),

    /// Transport failure talking to an upstream service.
    #[error("Upstream transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The licensing authority answered with a non-success status.
    #[error("Keys API {status}: {body}")]
    Authority { status: u16, body: String },

    /// The payment provider answered with a non-success status.
    #[error("Payment provider {status}: {body}")]
    PaymentProvider { status: u16, body: String },

    /// An obfuscated loader payload could not be decoded.
    #[error("Invalid payload: {0}")]
    Decode(#[from] DecodeError),

    /// No token was supplied with the request.
    #[error("Missing token")]
    MissingCredential,

    /// A token was supplied but is malformed, forged or expired.
    #[error("Invalid or expired token")]
    InvalidCredential,

    /// The principal is authenticated but lacks the required role.
    #[error("Insufficient role")]
    Forbidden,

    /// A webhook signature is missing or does not match the body.
    #[error("Invalid signature")]
    InvalidSignature,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required setting is absent or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Validation(report.to_string())
    }
}

impl AppError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::PoolBuild(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Http(_) | AppError::Authority { .. } | AppError::PaymentProvider { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Decode(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingCredential
            | AppError::InvalidCredential
            | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Database error".to_string()
            }

            AppError::PoolBuild(ref e) => {
                tracing::error!("Pool build error: {}", e);
                "Database error".to_string()
            }

            AppError::Http(ref e) => {
                tracing::error!("Upstream transport error: {}", e);
                "Upstream unavailable".to_string()
            }

            AppError::Authority { status, ref body } => {
                tracing::error!(status, body = %body, "Keys API returned an error");
                "Upstream error".to_string()
            }

            AppError::PaymentProvider { status, ref body } => {
                tracing::error!(status, body = %body, "Payment provider returned an error");
                "Unable to create payment.".to_string()
            }

            AppError::Decode(ref e) => {
                tracing::debug!("Loader payload rejected: {}", e);
                "invalid payload".to_string()
            }

            AppError::MissingCredential => {
                tracing::warn!("Request without token");
                "Missing token.".to_string()
            }

            AppError::InvalidCredential => {
                tracing::warn!("Invalid or expired token");
                "Invalid or expired token.".to_string()
            }

            AppError::Forbidden => {
                tracing::warn!("Role check failed");
                "Forbidden".to_string()
            }

            AppError::InvalidSignature => {
                tracing::warn!("Webhook signature rejected");
                "Invalid signature.".to_string()
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                "Resource not found".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Configuration(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                "Server misconfigured".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
