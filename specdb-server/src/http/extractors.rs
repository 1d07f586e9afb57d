//! Custom Axum extractors

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use specdb_core::{authorize, Action, Decision, EntityKind, Principal};

use super::error::ApiError;
use super::server::AppState;
use crate::session::SESSION_HEADER;

/// Header naming the authenticated user, set by the trusted proxy.
pub const USER_HEADER: &str = "x-remote-user";
/// Comma-separated group names.
pub const GROUPS_HEADER: &str = "x-remote-groups";
/// `true` or `1` for superusers.
pub const SUPERUSER_HEADER: &str = "x-remote-superuser";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Read the principal from identity headers.
pub fn principal_from_headers(headers: &HeaderMap) -> Principal {
    let Some(username) = header_str(headers, USER_HEADER) else {
        return Principal::anonymous();
    };
    let mut principal = Principal::user(username);
    if let Some(groups) = header_str(headers, GROUPS_HEADER) {
        principal.groups = groups
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_owned)
            .collect();
    }
    principal.superuser = header_str(headers, SUPERUSER_HEADER)
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
    principal
}

/// Who is calling, their session, and where they were going.
pub struct Caller {
    pub principal: Principal,
    pub session_id: Option<String>,
    pub guest: bool,
    /// Path and query of the request, for the login redirect.
    pub target: String,
}

impl Caller {
    /// Enforce the access policy for `action` on `kind`.
    pub fn require(&self, state: &AppState, action: Action, kind: Option<EntityKind>) -> Result<(), ApiError> {
        match authorize(&self.principal, self.guest, action, kind) {
            Decision::Allowed => Ok(()),
            Decision::LoginRequired => Err(ApiError::LoginRequired {
                location: format!(
                    "{}?next={}",
                    state.config.login_url,
                    urlencoding::encode(&self.target)
                ),
            }),
            Decision::Denied => {
                tracing::info!(
                    user = self.principal.username.as_deref().unwrap_or_default(),
                    ?action,
                    "access denied"
                );
                Err(ApiError::Forbidden {
                    reason: "you do not have permission to perform this action".to_owned(),
                })
            }
        }
    }

    /// The session id, or a 400 when the client sent none.
    pub fn session(&self) -> Result<&str, ApiError> {
        self.session_id.as_deref().ok_or_else(|| ApiError::BadRequest {
            message: format!("missing {SESSION_HEADER} header"),
        })
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let principal = principal_from_headers(&parts.headers);
        let session_id = header_str(&parts.headers, SESSION_HEADER).map(str::to_owned);
        let guest = state.sessions.is_guest(session_id.as_deref()).await;
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| parts.uri.path().to_owned());

        Ok(Self {
            principal,
            session_id,
            guest,
            target,
        })
    }
}

/// Extract and validate an entity kind from the `{kind}` path segment.
pub struct Kind(pub EntityKind);

impl<S> FromRequestParts<S> for Kind
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(kind): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::BadRequest {
                message: "missing entity kind".to_owned(),
            })?;
        Ok(Self(kind.parse()?))
    }
}

/// Extract `{kind}/{id}` path segments.
pub struct KindAndId(pub EntityKind, pub i64);

impl<S> FromRequestParts<S> for KindAndId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((kind, id)): Path<(String, String)> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::BadRequest {
                message: "expected /{kind}/{id}".to_owned(),
            })?;
        let kind: EntityKind = kind.parse()?;
        let id = id.parse().map_err(|_| ApiError::NotFound {
            resource: kind.schema().label,
            id: id.clone(),
        })?;
        Ok(Self(kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn anonymous_without_user_header() {
        let headers = HeaderMap::new();
        assert_eq!(principal_from_headers(&headers), Principal::anonymous());
    }

    #[test]
    fn reads_groups_and_superuser() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("ana"));
        headers.insert(GROUPS_HEADER, HeaderValue::from_static("Researchers, Admin"));
        headers.insert(SUPERUSER_HEADER, HeaderValue::from_static("TRUE"));

        let principal = principal_from_headers(&headers);
        assert_eq!(principal.username.as_deref(), Some("ana"));
        assert_eq!(principal.groups, vec!["Researchers", "Admin"]);
        assert!(principal.superuser);
        assert!(principal.is_admin());
    }

    #[test]
    fn blank_user_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("  "));
        headers.insert(SUPERUSER_HEADER, HeaderValue::from_static("1"));
        assert!(!principal_from_headers(&headers).is_authenticated());
    }
}
