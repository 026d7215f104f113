//! Middleware for bearer authentication and access gates

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use std::{convert::Infallible, net::SocketAddr};
use tracing::debug;

use crate::{AppState, error::AuthError, service::Principal};

/// Validate the `Authorization: Bearer` access token and attach the
/// `Principal` to the request
pub async fn require_access_token(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(|| {
        AuthError::Unauthorized("Access token is required".to_string())
    })?;

    let principal = state.auth.authenticate(bearer.token()).map_err(|e| {
        debug!("Rejected access token: {}", e);
        e
    })?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Let only verified accounts through
pub async fn require_verified(
    principal: Principal,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    principal.require_verified()?;
    Ok(next.run(req).await)
}

/// Let only administrators through
pub async fn require_admin(
    principal: Principal,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    principal.require_admin()?;
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or_else(|| AuthError::Unauthorized("Access token is required".to_string()))
    }
}

/// Address of the caller, for the audit log. Prefers the first
/// `X-Forwarded-For` hop set by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(ip) = forwarded {
            return Ok(ClientIp(ip.to_string()));
        }

        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn client_ip(req: Request<()>) -> ClientIp {
        let (mut parts, _) = req.into_parts();
        ClientIp::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_client_ip_prefers_forwarded_header() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(req).await, ClientIp("203.0.113.7".to_string()));
    }

    #[tokio::test]
    async fn test_client_ip_falls_back_to_socket() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(req).await, ClientIp("192.0.2.1".to_string()));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(req).await, ClientIp("unknown".to_string()));
    }
}
