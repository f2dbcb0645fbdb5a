use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::utils::{SESSION_COOKIE, decode_session_token, error_codes, error_to_api_response};

/// Validates the session cookie and makes the decoded token available to
/// handlers as a request extension. No server-side session store exists:
/// absent or expired cookie means unauthenticated.
pub async fn auth_middleware(jar: CookieJar, mut req: Request<Body>, next: Next) -> Response {
    let token = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| decode_session_token(cookie.value()));

    match token {
        Some(token) if !token.is_expired() => {
            req.extensions_mut().insert(token);
            next.run(req).await
        }
        Some(_) => (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "Session expired".to_string()),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(
                error_codes::AUTH_FAILED,
                "Missing or invalid session".to_string(),
            ),
        )
            .into_response(),
    }
}
