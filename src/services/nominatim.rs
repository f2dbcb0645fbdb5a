use serde::Deserialize;

use super::{UpstreamError, check_status};
use crate::config::Config;

/// Reverse-geocoding proxy for a Nominatim instance. The shared reqwest
/// client already carries the User-Agent the usage policy requires.
#[derive(Clone)]
pub struct NominatimClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReversePlace {
    pub display_name: String,
    #[serde(default)]
    pub address: ReverseAddress,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReverseAddress {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl ReverseAddress {
    /// Most specific populated locality, in Nominatim's own fallback order.
    pub fn locality(&self) -> Option<&str> {
        self.city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
            .or(self.county.as_deref())
            .or(self.state.as_deref())
    }
}

impl NominatimClient {
    pub fn from_config(http: &reqwest::Client, config: &Config) -> Self {
        Self {
            http: http.clone(),
            base_url: config.nominatim_base_url.clone(),
        }
    }

    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<ReversePlace, UpstreamError> {
        let url = format!(
            "{}/reverse?format=jsonv2&lat={}&lon={}&zoom=14&addressdetails=1",
            self.base_url, lat, lon
        );
        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp).await?;

        parse_reverse_body(resp.json().await?)
    }
}

// Nominatim reports "nothing found" as a 200 with an error body.
fn parse_reverse_body(body: serde_json::Value) -> Result<ReversePlace, UpstreamError> {
    if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
        return Err(UpstreamError::api(502, error));
    }

    serde_json::from_value(body)
        .map_err(|e| UpstreamError::api(502, format!("unexpected reverse response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_place_parses() {
        let body = r#"{
            "place_id": 1,
            "display_name": "Alexanderplatz, Mitte, Berlin, 10178, Deutschland",
            "address": {
                "road": "Alexanderplatz",
                "suburb": "Mitte",
                "city": "Berlin",
                "postcode": "10178",
                "country": "Deutschland",
                "country_code": "de"
            }
        }"#;
        let place: ReversePlace = serde_json::from_str(body).unwrap();
        assert!(place.display_name.starts_with("Alexanderplatz"));
        assert_eq!(place.address.locality(), Some("Berlin"));
        assert_eq!(place.address.country.as_deref(), Some("Deutschland"));
    }

    #[test]
    fn error_body_maps_to_upstream_error() {
        let body = serde_json::json!({"error": "Unable to geocode"});
        match parse_reverse_body(body) {
            Err(UpstreamError::Api { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "Unable to geocode");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_body_maps_to_upstream_error() {
        let body = serde_json::json!({"place_id": 1});
        assert!(matches!(
            parse_reverse_body(body),
            Err(UpstreamError::Api { status: 502, .. })
        ));
    }

    #[test]
    fn well_formed_body_parses_through_helper() {
        let body = serde_json::json!({
            "display_name": "Somewhere",
            "address": {"city": "Somewhere"}
        });
        let place = parse_reverse_body(body).unwrap();
        assert_eq!(place.display_name, "Somewhere");
    }

    #[test]
    fn locality_falls_back_through_levels() {
        let address = ReverseAddress {
            village: Some("Kleinort".into()),
            state: Some("Bayern".into()),
            ..Default::default()
        };
        assert_eq!(address.locality(), Some("Kleinort"));

        let address = ReverseAddress::default();
        assert_eq!(address.locality(), None);
    }
}
