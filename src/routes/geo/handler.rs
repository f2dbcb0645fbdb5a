use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    services::{UpstreamError, nominatim::NominatimClient, osrm::OsrmClient},
    utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{ReverseQuery, ReverseResponse, RouteQuery, RouteResponse};

/// Reverse-geocodes a coordinate to a human-readable place.
#[axum::debug_handler]
pub async fn reverse_geocode(
    State(state): State<AppState>,
    Query(query): Query<ReverseQuery>,
) -> impl IntoResponse {
    if !valid_coordinate(query.lat, query.lon) {
        return invalid_coordinates();
    }

    let client = NominatimClient::from_config(&state.http, &state.config);
    match client.reverse(query.lat, query.lon).await {
        Ok(place) => (
            StatusCode::OK,
            success_to_api_response(ReverseResponse {
                locality: place.address.locality().map(str::to_string),
                country: place.address.country.clone(),
                display_name: place.display_name,
            }),
        ),
        Err(e) => upstream_error("reverse geocoding", &e),
    }
}

/// Computes a driving route between two coordinates.
#[axum::debug_handler]
pub async fn route(
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> impl IntoResponse {
    if !valid_coordinate(query.from_lat, query.from_lon)
        || !valid_coordinate(query.to_lat, query.to_lon)
    {
        return invalid_coordinates();
    }

    let client = OsrmClient::from_config(&state.http, &state.config);
    match client
        .route(
            (query.from_lat, query.from_lon),
            (query.to_lat, query.to_lon),
        )
        .await
    {
        Ok(best) => (
            StatusCode::OK,
            success_to_api_response(RouteResponse {
                distance_meters: best.distance,
                duration_seconds: best.duration,
                // OSRM hands back GeoJSON [lon, lat]; the journal map wants
                // [lat, lon].
                geometry: best
                    .geometry
                    .coordinates
                    .into_iter()
                    .map(|[lon, lat]| [lat, lon])
                    .collect(),
            }),
        ),
        Err(e) => upstream_error("routing", &e),
    }
}

fn valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

fn invalid_coordinates<T>() -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::BAD_REQUEST,
        error_to_api_response(
            error_codes::VALIDATION_ERROR,
            "Coordinates out of range".to_string(),
        ),
    )
}

fn upstream_error<T>(op: &str, e: &UpstreamError) -> (StatusCode, Json<ApiResponse<T>>) {
    tracing::error!("{} failed: {}", op, e);
    (
        StatusCode::BAD_GATEWAY,
        error_to_api_response(error_codes::UPSTREAM_ERROR, format!("{} failed", op)),
    )
}
