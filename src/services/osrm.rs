use serde::Deserialize;

use super::{UpstreamError, check_status};
use crate::config::Config;

/// Routing proxy for an OSRM instance (driving profile).
#[derive(Clone)]
pub struct OsrmClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
pub struct OsrmRoute {
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
    pub geometry: Geometry,
}

/// GeoJSON line string: coordinates are `[lon, lat]` pairs.
#[derive(Debug, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

impl OsrmClient {
    pub fn from_config(http: &reqwest::Client, config: &Config) -> Self {
        Self {
            http: http.clone(),
            base_url: config.osrm_base_url.clone(),
        }
    }

    /// Best driving route between two points, given as (lat, lon).
    pub async fn route(
        &self,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<OsrmRoute, UpstreamError> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson&alternatives=false",
            self.base_url, from.1, from.0, to.1, to.0
        );
        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp).await?;

        let body: RouteResponse = resp.json().await?;
        if body.code != "Ok" {
            let message = body.message.unwrap_or_else(|| body.code.clone());
            return Err(UpstreamError::api(502, message));
        }

        body.routes
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::api(502, "no route between the given points"))
    }
}
