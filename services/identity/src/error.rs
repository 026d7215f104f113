//! Error type of the identity service

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{error::DatabaseError, response::ErrorBody};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{jwt::TokenError, repositories::Dependency, validation::FieldError};

/// Service-level error, one variant per failure the flows can report
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed input
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("User not found")]
    UserNotFound,

    #[error("Password is incorrect")]
    InvalidPassword,

    #[error("Old password is incorrect")]
    InvalidOldPassword,

    /// Missing, revoked or otherwise unusable credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Access denied, administrator role required")]
    Forbidden,

    #[error("Email is not verified, please check your inbox")]
    UnverifiedAccount,

    #[error("Account is banned")]
    AccountBanned,

    /// Deletion blocked by records in other services
    #[error("User cannot be deleted because it is referenced by {0}")]
    InUse(Dependency),

    #[error("The identity provider reports this email as unverified")]
    UnverifiedProviderEmail,

    /// Identity provider unreachable or misbehaving
    #[error("Identity provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::DuplicateEmail | AuthError::InUse(_) => StatusCode::CONFLICT,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Token(TokenError::Encoding(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::InvalidPassword
            | AuthError::InvalidOldPassword
            | AuthError::Unauthorized(_)
            | AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden | AuthError::UnverifiedAccount | AuthError::AccountBanned => {
                StatusCode::FORBIDDEN
            }
            AuthError::UnverifiedProviderEmail => StatusCode::BAD_REQUEST,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Database(DatabaseError::UniqueViolation(_)) => StatusCode::CONFLICT,
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors that are the server's fault; their detail stays in the logs
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AuthError::Validation(fields) => ErrorBody::new(self.to_string(), Some(json!(fields))),
            AuthError::InUse(dependency) => ErrorBody::new(
                self.to_string(),
                Some(json!({ "dependency": dependency })),
            ),
            AuthError::Database(DatabaseError::UniqueViolation(_)) => {
                ErrorBody::new("Resource already exists", None)
            }
            error if error.is_internal() => {
                error!("Request failed: {:?}", error);
                ErrorBody::new("Internal server error", None)
            }
            error => ErrorBody::new(error.to_string(), None),
        };

        body.into_response_with(status)
    }
}

fn rejected(field: &'static str, message: String) -> AuthError {
    AuthError::Validation(vec![FieldError { field, message }])
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        rejected("body", rejection.body_text())
    }
}

impl From<QueryRejection> for AuthError {
    fn from(rejection: QueryRejection) -> Self {
        rejected("query", rejection.body_text())
    }
}

impl From<PathRejection> for AuthError {
    fn from(rejection: PathRejection) -> Self {
        rejected("path", rejection.body_text())
    }
}

/// Type alias for service results
pub type AuthResult<T> = Result<T, AuthError>;
