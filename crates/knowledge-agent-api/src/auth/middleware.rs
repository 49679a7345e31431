use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::utils::error::ApiError;

use super::CurrentUser;

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    upn: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Attach the delegated identity to the request. Signature validation is
/// the gateway's responsibility; an unparsable token is still a 401.
pub async fn require_user(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;

    let user = parse_user(token)
        .ok_or_else(|| ApiError::Unauthorized("invalid bearer token".to_string()))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn parse_user(token: &str) -> Option<CurrentUser> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: TokenClaims = serde_json::from_slice(&decoded).ok()?;

    let id = claims.oid.or(claims.sub)?;
    Some(CurrentUser {
        id,
        name: claims.name.unwrap_or_default(),
        email: claims
            .preferred_username
            .or(claims.upn)
            .or(claims.email)
            .unwrap_or_default(),
        bearer_token: token.to_string(),
    })
}
