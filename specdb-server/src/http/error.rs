//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.
//! Anonymous callers hitting a protected route are redirected to the login
//! page instead.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use specdb_core::schema::UnknownEntity;
use specdb_core::{FormErrors, ImportError, ValidationError};

use crate::db::repos::{ConstraintKind, DbError};
use crate::import::IngestError;
use crate::session::SessionError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Form or parameter validation failed (400)
    Validation(FormErrors),

    /// Malformed request (400)
    BadRequest { message: String },

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Request conflicts with current state (409)
    Conflict { message: String },

    /// Authenticated but not allowed (403)
    Forbidden { reason: String },

    /// Not logged in (303 to the login page)
    LoginRequired { location: String },

    /// Database error (500, logged)
    Database(DbError),

    /// Internal error (500)
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": errors.to_string(),
                    "fields": errors
                }),
            ),
            Self::BadRequest { message } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "bad_request",
                    "message": message
                }),
            ),
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} '{}' not found", resource, id)
                }),
            ),
            Self::Conflict { message } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "conflict",
                    "message": message
                }),
            ),
            Self::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "forbidden",
                    "message": reason
                }),
            ),
            Self::LoginRequired { location } => {
                let body = json!({
                    "error": "login_required",
                    "message": "log in to continue",
                    "location": location
                });
                return (
                    StatusCode::SEE_OTHER,
                    [(header::LOCATION, location.clone())],
                    Json(body),
                )
                    .into_response();
            }
            Self::Database(e) => {
                // Log the actual error, return generic message
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
            Self::Internal { message } => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(FormErrors::from(e))
    }
}

impl From<FormErrors> for ApiError {
    fn from(e: FormErrors) -> Self {
        Self::Validation(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::Constraint(v) if v.kind == ConstraintKind::Unique => Self::Conflict {
                message: v.to_string(),
            },
            DbError::Constraint(v) => Self::BadRequest {
                message: v.to_string(),
            },
            DbError::UnknownField { field, .. } => Self::BadRequest {
                message: format!("unknown field '{field}'"),
            },
            DbError::Sqlx(_) => Self::Database(e),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::NotValidated | ImportError::HasErrors(_) | ImportError::AlreadyCommitted => {
                Self::Conflict {
                    message: e.to_string(),
                }
            }
            _ => Self::BadRequest {
                message: e.to_string(),
            },
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Import(e) => e.into(),
            IngestError::Database(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Unknown(_) => Self::BadRequest {
                message: e.to_string(),
            },
            SessionError::Corrupt(_) => Self::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<UnknownEntity> for ApiError {
    fn from(e: UnknownEntity) -> Self {
        Self::NotFound {
            resource: "entity kind",
            id: e.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::ConstraintViolation;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn validation_error_is_400_with_fields() {
        let err = ApiError::from(ValidationError::Empty { field: "localityCode" });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "validation_error");
        assert!(json["fields"]["localityCode"].is_array());
    }

    #[tokio::test]
    async fn not_found_is_404() {
        let err = ApiError::NotFound {
            resource: "Specimen",
            id: "7".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_required_redirects() {
        let err = ApiError::LoginRequired {
            location: "/accounts/login/?next=%2Fedit%2Fspecimen%2F1".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/accounts/login/?next=%2Fedit%2Fspecimen%2F1"
        );
    }

    #[tokio::test]
    async fn unique_violation_is_409() {
        let err = ApiError::from(DbError::Constraint(ConstraintViolation {
            kind: ConstraintKind::Unique,
            target: None,
        }));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn blocked_import_is_409() {
        let err = ApiError::from(ImportError::HasErrors(3));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn forbidden_is_403() {
        let err = ApiError::Forbidden {
            reason: "admin only".into(),
        };
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
