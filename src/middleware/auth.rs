use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::auth::Claims;
use crate::config;
use crate::error::ApiError;
use crate::intercept::RequestContext;

impl From<Claims> for RequestContext {
    fn from(claims: Claims) -> Self {
        let ctx = RequestContext::for_user(claims.user);
        match claims.user_id {
            Some(user_id) => ctx.with_user_id(user_id),
            None => ctx,
        }
    }
}

/// Optional JWT authentication.
///
/// No Authorization header yields an anonymous [`RequestContext`]; a header
/// that is present but invalid is rejected with 401.
pub async fn jwt_context_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = match extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)? {
        Some(token) => {
            let claims = validate_jwt(&token).map_err(|msg| {
                tracing::warn!("Rejected bearer token: {}", msg);
                ApiError::unauthorized(msg)
            })?;
            RequestContext::from(claims)
        }
        None => RequestContext::anonymous(),
    };

    tracing::debug!(
        "Request {} as {}",
        ctx.request_id,
        ctx.user.as_deref().unwrap_or("anonymous")
    );
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header, if one was sent
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(auth_header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(Some(token.trim().to_string()))
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

/// Validate JWT token and extract claims
fn validate_jwt(token: &str) -> Result<Claims, String> {
    let secret = &config::config().security.jwt_secret;

    if secret.is_empty() {
        return Err("JWT secret not configured".to_string());
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| format!("Invalid JWT token: {}", e))?;

    Ok(token_data.claims)
}
