use std::fmt;

pub mod cloudinary;
pub mod firebase;
pub mod nominatim;
pub mod osrm;

/// Failure while talking to one of the proxied third-party APIs.
#[derive(Debug)]
pub enum UpstreamError {
    /// Transport-level failure (connect, timeout, body decode).
    Http(reqwest::Error),
    /// The upstream answered with a non-success status or an error body.
    Api { status: u16, message: String },
}

impl UpstreamError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// True when the upstream rejected the request itself rather than failing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status < 500)
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "upstream request failed: {}", e),
            Self::Api { status, message } => {
                write!(f, "upstream returned {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Turns a non-2xx response into an `UpstreamError` with a truncated body.
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message: String = body.chars().take(300).collect();
    Err(UpstreamError::api(status.as_u16(), message))
}
