use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::state::AppState;
use crate::types::{Role, User};

/// The authenticated caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// The bearer token of the current request, kept for logout.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Resolves `Authorization: Bearer <token>` to an active user or answers 401.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(&req) else {
        return AppError::Unauthorized("missing or malformed bearer token".into()).into_response();
    };
    match state.accounts.authenticate(&token).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            req.extensions_mut().insert(SessionToken(token));
            next.run(req).await
        }
        Ok(None) => AppError::Unauthorized("invalid or expired session".into()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Admins and librarians only. Must run inside [`require_auth`].
pub async fn require_staff(req: Request, next: Next) -> Response {
    require_role(req, next, Role::is_staff).await
}

/// Admins only. Must run inside [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    require_role(req, next, |r| *r == Role::Admin).await
}

async fn require_role(req: Request, next: Next, allowed: impl Fn(&Role) -> bool) -> Response {
    let verdict = match req.extensions().get::<CurrentUser>() {
        Some(CurrentUser(user)) if allowed(&user.role) => Ok(()),
        Some(CurrentUser(user)) => {
            tracing::debug!(user_id = user.id, role = %user.role, path = %req.uri().path(), "Role check failed");
            Err(AppError::NotAuthorized("insufficient permissions".into()))
        }
        None => Err(AppError::Unauthorized("authentication required".into())),
    };
    match verdict {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(auth: &str) -> Request {
        Request::builder().header(header::AUTHORIZATION, auth).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&request_with("Bearer abc123")).as_deref(), Some("abc123"));
        assert_eq!(bearer_token(&request_with("bearer  abc123 ")).as_deref(), Some("abc123"));
        assert_eq!(bearer_token(&request_with("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&request_with("Bearer ")), None);
        assert_eq!(bearer_token(&Request::new(Body::empty())), None);
    }
}
