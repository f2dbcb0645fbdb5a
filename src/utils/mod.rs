use axum::Json;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Cookie carrying the encoded session token.
pub const SESSION_COOKIE: &str = "journal_session";

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}

/// Stateless session token stored client-side as an httpOnly cookie.
/// Validity is decided purely by decoding and checking `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl SessionToken {
    pub fn new(user_id: &str, config: &Config) -> Self {
        let now = Utc::now().timestamp();
        Self {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + config.session_ttl().as_secs() as i64,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

pub fn encode_session_token(token: &SessionToken) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(token)?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Returns `None` for anything that is not valid base64-wrapped token JSON.
pub fn decode_session_token(raw: &str) -> Option<SessionToken> {
    let bytes = general_purpose::STANDARD.decode(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const UPSTREAM_ERROR: i32 = 1006;
    pub const NOT_CONFIGURED: i32 = 1007;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::*;

    fn test_config() -> Config {
        Config {
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            cloudinary_cloud_name: None,
            cloudinary_api_key: None,
            cloudinary_api_secret: None,
            cloudinary_base_folder: "memories".into(),
            cloudinary_api_base: "https://api.cloudinary.com".into(),
            firebase_api_key: None,
            firebase_project_id: None,
            nominatim_base_url: "https://nominatim.openstreetmap.org".into(),
            osrm_base_url: "https://router.project-osrm.org".into(),
            outbound_user_agent: "test".into(),
            session_ttl_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            rate_limit_sweep_secs: 300,
        }
    }

    #[test]
    fn session_token_round_trip() {
        let token = SessionToken::new("user-123", &test_config());
        let encoded = encode_session_token(&token).unwrap();
        let decoded = decode_session_token(&encoded).expect("token should decode");

        assert_eq!(decoded.user_id, "user-123");
        assert_eq!(decoded.created_at, token.created_at);
        assert_eq!(decoded.expires_at, token.expires_at);
        assert!(!decoded.is_expired());
    }

    #[test]
    fn expired_token_is_detected() {
        let token = SessionToken {
            user_id: "user-123".into(),
            created_at: 0,
            expires_at: Utc::now().timestamp() - 1,
        };
        assert!(token.is_expired());
    }

    #[test]
    fn garbage_input_does_not_decode() {
        assert!(decode_session_token("not base64 at all!").is_none());

        // Valid base64 but not token JSON.
        let junk = general_purpose::STANDARD.encode(b"{\"foo\": 1}");
        assert!(decode_session_token(&junk).is_none());
    }
}
