use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    AppState,
    services::firebase::FirebaseClient,
    utils::{
        SESSION_COOKIE, SessionToken, encode_session_token, error_codes, error_to_api_response,
        success_to_api_response,
    },
};

use super::model::{LoginRequest, LoginResponse, LogoutResponse, SessionResponse};

/// Verifies a Firebase ID token, ensures the Firestore profile exists, and
/// sets the session cookie.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Response {
    let Some(firebase) = FirebaseClient::from_config(&state.http, &state.config) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            error_to_api_response::<()>(
                error_codes::NOT_CONFIGURED,
                "Firebase is not configured".to_string(),
            ),
        )
            .into_response();
    };

    let id_token = req.id_token.trim();
    if id_token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response::<()>(
                error_codes::VALIDATION_ERROR,
                "id_token must not be empty".to_string(),
            ),
        )
            .into_response();
    }

    let user = match firebase.verify_id_token(id_token).await {
        Ok(user) => user,
        Err(e) if e.is_rejection() => {
            tracing::warn!("rejected login: {}", e);
            return (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(
                    error_codes::AUTH_FAILED,
                    "Invalid ID token".to_string(),
                ),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("token verification failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                error_to_api_response::<()>(
                    error_codes::UPSTREAM_ERROR,
                    "Authentication service unavailable".to_string(),
                ),
            )
                .into_response();
        }
    };

    // First login creates the Firestore profile. Profile trouble is logged
    // but never locks the user out.
    match firebase.get_user_doc(&user.uid).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = firebase.upsert_user_doc(&user).await {
                tracing::warn!("failed to create user document for {}: {}", user.uid, e);
            }
        }
        Err(e) => {
            tracing::warn!("failed to load user document for {}: {}", user.uid, e);
        }
    }

    let token = SessionToken::new(&user.uid, &state.config);
    let encoded = match encode_session_token(&token) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::error!("failed to encode session token: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(
                    error_codes::INTERNAL_ERROR,
                    "Failed to create session".to_string(),
                ),
            )
                .into_response();
        }
    };

    let cookie = Cookie::build((SESSION_COOKIE, encoded))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    tracing::info!("session opened for user {}", user.uid);

    (
        jar.add(cookie),
        (
            StatusCode::OK,
            success_to_api_response(LoginResponse {
                user_id: user.uid,
                email: user.email,
                display_name: user.display_name,
                expires_at: token.expires_at,
            }),
        ),
    )
        .into_response()
}

/// Echoes the validated session. The auth middleware has already decoded
/// and expiry-checked the cookie.
#[axum::debug_handler]
pub async fn session(Extension(token): Extension<SessionToken>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(SessionResponse {
            user_id: token.user_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
        }),
    )
}

/// Clears the session cookie. Always succeeds, cookie or not.
#[axum::debug_handler]
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();

    (
        jar.remove(cookie),
        (StatusCode::OK, success_to_api_response(LogoutResponse {})),
    )
}
