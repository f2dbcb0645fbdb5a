use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_api_secret: Option<String>,
    pub cloudinary_base_folder: String,
    pub cloudinary_api_base: String,
    pub firebase_api_key: Option<String>,
    pub firebase_project_id: Option<String>,
    pub nominatim_base_url: String,
    pub osrm_base_url: String,
    pub outbound_user_agent: String,
    pub session_ttl_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let session_ttl = env::var("SESSION_TTL")
            .unwrap_or_else(|_| "24h".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);

        Ok(Config {
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            cloudinary_cloud_name: optional_var("CLOUDINARY_CLOUD_NAME"),
            cloudinary_api_key: optional_var("CLOUDINARY_API_KEY"),
            cloudinary_api_secret: optional_var("CLOUDINARY_API_SECRET"),
            cloudinary_base_folder: env::var("CLOUDINARY_BASE_FOLDER")
                .unwrap_or_else(|_| "memories".into()),
            cloudinary_api_base: env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| "https://api.cloudinary.com".into()),
            firebase_api_key: optional_var("FIREBASE_API_KEY"),
            firebase_project_id: optional_var("FIREBASE_PROJECT_ID"),
            nominatim_base_url: env::var("NOMINATIM_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".into()),
            osrm_base_url: env::var("OSRM_BASE_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".into()),
            outbound_user_agent: env::var("OUTBOUND_USER_AGENT")
                .unwrap_or_else(|_| "memory-journal-backend/0.1".into()),
            session_ttl_secs: session_ttl * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .unwrap_or_default()
                .parse()
                .unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_default()
                .parse()
                .unwrap_or(100),
            rate_limit_sweep_secs: env::var("RATE_LIMIT_SWEEP")
                .unwrap_or_default()
                .parse()
                .unwrap_or(300),
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    // The window and sweep intervals are clamped to one second: a zero
    // period would panic the interval timer at startup.
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }

    pub fn rate_limit_sweep(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs.max(1))
    }
}

// Empty credential values count as unset so the affected routes answer 503.
fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_intervals_are_clamped_to_one_second() {
        let config = Config {
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
            nominatim_base_url: String::new(),
            osrm_base_url: String::new(),
            outbound_user_agent: "test".into(),
            session_ttl_secs: 3600,
            rate_limit_window_secs: 0,
            rate_limit_requests: 100,
            rate_limit_sweep_secs: 0,
        };

        assert_eq!(config.rate_limit_window(), Duration::from_secs(1));
        assert_eq!(config.rate_limit_sweep(), Duration::from_secs(1));
    }
}
