//! Bearer-token authentication and the admin role guard.
//!
//! Two middleware layers: `require_auth` maps the bearer token to a
//! [`Caller`] in the request extensions, `admin_guard` then checks the role
//! on routes that mutate state. Deny by default: no token is 401, a
//! non-admin caller on a guarded route is 403.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use quadsync_core::EngineError;

use crate::error::ApiError;

/// The authenticated caller's role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Full access, including run triggers and conflict resolution.
    Admin,
    /// Read-only access to status and dashboard projections.
    Viewer,
}

/// Authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Clone, Copy, Debug)]
pub struct Caller {
    pub role: Role,
}

/// Static token table the middleware matches against.
#[derive(Clone)]
pub struct AuthTokens {
    admin: String,
    viewer: Option<String>,
}

impl AuthTokens {
    pub fn new(admin: impl Into<String>, viewer: Option<String>) -> Self {
        Self {
            admin: admin.into(),
            viewer,
        }
    }

    fn role_for(&self, token: &str) -> Option<Role> {
        if token == self.admin {
            return Some(Role::Admin);
        }
        if self.viewer.as_deref() == Some(token) {
            return Some(Role::Viewer);
        }
        None
    }
}

/// Resolve the bearer token to a [`Caller`] or fail with 401.
pub async fn require_auth(
    State(tokens): State<Arc<AuthTokens>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;
    let role = tokens.role_for(token).ok_or(ApiError::Unauthorized)?;

    request.extensions_mut().insert(Caller { role });
    Ok(next.run(request).await)
}

/// Require the caller to hold the admin role.
///
/// Expects [`require_auth`] to have run first; a request that reaches this
/// guard without a caller is treated as unauthenticated.
pub async fn admin_guard(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let caller = request
        .extensions()
        .get::<Caller>()
        .ok_or(ApiError::Unauthorized)?;

    if caller.role != Role::Admin {
        tracing::warn!(role = ?caller.role, "admin role required; access denied");
        return Err(ApiError::Engine(EngineError::Forbidden));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::{middleware, routing::get, Router};
    use tower::util::ServiceExt;

    async fn test_handler() -> &'static str {
        "OK"
    }

    fn app() -> Router {
        let tokens = Arc::new(AuthTokens::new("admin-token", Some("viewer-token".into())));
        Router::new()
            .route("/open", get(test_handler))
            .route(
                "/guarded",
                get(test_handler).layer(middleware::from_fn(admin_guard)),
            )
            .layer(middleware::from_fn_with_state(tokens, require_auth))
    }

    fn request(path: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let response = app().oneshot(request("/open", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_token_is_401() {
        let response = app()
            .oneshot(request("/open", Some("nope")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_viewer_reads_but_cannot_pass_guard() {
        let open = app()
            .oneshot(request("/open", Some("viewer-token")))
            .await
            .unwrap();
        assert_eq!(open.status(), StatusCode::OK);

        let guarded = app()
            .oneshot(request("/guarded", Some("viewer-token")))
            .await
            .unwrap();
        assert_eq!(guarded.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_passes_guard() {
        let response = app()
            .oneshot(request("/guarded", Some("admin-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
