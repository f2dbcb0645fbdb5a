use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ReverseQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
pub struct ReverseResponse {
    pub display_name: String,
    pub locality: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// `[lat, lon]` pairs along the route.
    pub geometry: Vec<[f64; 2]>,
}
