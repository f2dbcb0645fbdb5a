use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;

use crate::{
    AppState,
    services::{
        UpstreamError,
        cloudinary::{CloudinaryClient, encode_context, folder_expression},
    },
    utils::{
        ApiResponse, SessionToken, error_codes, error_to_api_response, success_to_api_response,
    },
};

use super::model::{
    DeleteImageRequest, DeleteImageResponse, DeleteMemoryRequest, DeleteMemoryResponse,
    ListMemoriesQuery, ListMemoriesResponse, Memory, UploadMemoryRequest, UploadMemoryResponse,
};

const LIST_PAGE_SIZE: u32 = 100;
const DELETE_BATCH_LIMIT: u32 = 500;
const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 5000;
const MAX_LOCATION_LEN: usize = 200;

/// Uploads one image into the caller's folder, with the memory fields
/// flattened into Cloudinary context metadata.
#[axum::debug_handler]
pub async fn upload_image(
    Extension(session): Extension<SessionToken>,
    State(state): State<AppState>,
    Json(req): Json<UploadMemoryRequest>,
) -> impl IntoResponse {
    let Some(client) = CloudinaryClient::from_config(&state.http, &state.config) else {
        return not_configured();
    };

    if let Some(msg) = validate_upload(&req) {
        return validation_error(msg);
    }

    let title = req.title.trim();
    let memory_id = match req.memory_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => {
            if !is_valid_memory_id(id) {
                return validation_error(
                    "memory_id may only contain letters, digits, '-' and '_'",
                );
            }
            id.to_string()
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let folder = format!("{}/{}", client.base_folder, session.user_id);
    let context = encode_context(&[
        ("memory_id", &memory_id),
        ("title", title),
        ("date", &req.date),
        ("location", req.location.as_deref().unwrap_or_default()),
        ("body", req.body.as_deref().unwrap_or_default()),
    ]);
    let tags = req
        .tags
        .iter()
        .map(|t| t.trim())
        .collect::<Vec<_>>()
        .join(",");

    match client.upload_image(&req.file, &folder, &context, &tags).await {
        Ok(image) => (
            StatusCode::OK,
            success_to_api_response(UploadMemoryResponse {
                memory_id,
                image: image.into(),
            }),
        ),
        Err(e) => upstream_error("image upload", &e),
    }
}

/// Reconstructs the caller's memories by searching their folder and grouping
/// hits on the shared `memory_id` context.
#[axum::debug_handler]
pub async fn list_memories(
    Extension(session): Extension<SessionToken>,
    State(state): State<AppState>,
    Query(query): Query<ListMemoriesQuery>,
) -> impl IntoResponse {
    let Some(client) = CloudinaryClient::from_config(&state.http, &state.config) else {
        return not_configured();
    };

    let folder = format!("{}/{}", client.base_folder, session.user_id);
    let expression = folder_expression(&folder, query.q.as_deref());

    match client
        .search(&expression, query.cursor.as_deref(), LIST_PAGE_SIZE)
        .await
    {
        Ok(page) => (
            StatusCode::OK,
            success_to_api_response(ListMemoriesResponse {
                memories: Memory::group(page.resources),
                next_cursor: page.next_cursor,
            }),
        ),
        Err(e) => upstream_error("memory search", &e),
    }
}

/// Deletes a single image. Only resources under the caller's own folder are
/// reachable.
#[axum::debug_handler]
pub async fn delete_image(
    Extension(session): Extension<SessionToken>,
    State(state): State<AppState>,
    Json(req): Json<DeleteImageRequest>,
) -> impl IntoResponse {
    let Some(client) = CloudinaryClient::from_config(&state.http, &state.config) else {
        return not_configured();
    };

    let prefix = format!("{}/{}/", client.base_folder, session.user_id);
    if !req.public_id.starts_with(&prefix) {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(
                error_codes::PERMISSION_DENIED,
                "Cannot delete images outside your own folder".to_string(),
            ),
        );
    }

    match client.destroy_image(&req.public_id).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(DeleteImageResponse { deleted: true }),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Image not found".to_string()),
        ),
        Err(e) => upstream_error("image delete", &e),
    }
}

/// Deletes every image in a memory. Per-image failures are reported, not
/// fatal to the batch.
#[axum::debug_handler]
pub async fn delete_memory(
    Extension(session): Extension<SessionToken>,
    State(state): State<AppState>,
    Json(req): Json<DeleteMemoryRequest>,
) -> impl IntoResponse {
    let Some(client) = CloudinaryClient::from_config(&state.http, &state.config) else {
        return not_configured();
    };

    let memory_id = req.memory_id.trim();
    if !is_valid_memory_id(memory_id) {
        return validation_error("memory_id may only contain letters, digits, '-' and '_'");
    }

    let folder = format!("{}/{}", client.base_folder, session.user_id);
    let expression = format!(
        "folder=\"{}\" AND context.memory_id=\"{}\"",
        folder, memory_id
    );

    // A memory can span several search pages; every page is drained before
    // the outcome is reported.
    let mut cursor: Option<String> = None;
    let mut requested = 0usize;
    let mut deleted = 0usize;
    let mut failed: Vec<String> = Vec::new();
    loop {
        let page = match client
            .search(&expression, cursor.as_deref(), DELETE_BATCH_LIMIT)
            .await
        {
            Ok(page) => page,
            Err(e) => return upstream_error("memory lookup", &e),
        };

        if requested == 0 && page.resources.is_empty() {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "Memory not found".to_string()),
            );
        }

        requested += page.resources.len();
        for resource in page.resources {
            match client.destroy_image(&resource.public_id).await {
                Ok(true) => deleted += 1,
                Ok(false) => failed.push(resource.public_id),
                Err(e) => {
                    tracing::error!("failed to delete {}: {}", resource.public_id, e);
                    failed.push(resource.public_id);
                }
            }
        }

        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    if deleted == 0 {
        tracing::error!(
            "removed none of {} images for memory {} of user {}",
            requested,
            memory_id,
            session.user_id
        );
        return (
            StatusCode::BAD_GATEWAY,
            error_to_api_response(
                error_codes::UPSTREAM_ERROR,
                "Memory delete failed upstream".to_string(),
            ),
        );
    }

    tracing::info!(
        "deleted memory {} for user {}: {}/{} images removed",
        memory_id,
        session.user_id,
        deleted,
        requested
    );

    (
        StatusCode::OK,
        success_to_api_response(DeleteMemoryResponse {
            requested,
            deleted,
            failed,
        }),
    )
}

// Field lengths count characters, not bytes.
fn validate_upload(req: &UploadMemoryRequest) -> Option<&'static str> {
    if !req.file.starts_with("data:image/") || !req.file.contains(";base64,") {
        return Some("file must be a base64 image data URI");
    }

    let title = req.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Some("title must be between 1 and 200 characters");
    }

    if NaiveDate::parse_from_str(&req.date, "%Y-%m-%d").is_err() {
        return Some("date must be formatted as YYYY-MM-DD");
    }

    if req
        .body
        .as_deref()
        .is_some_and(|b| b.chars().count() > MAX_BODY_LEN)
    {
        return Some("body must be at most 5000 characters");
    }

    if req
        .location
        .as_deref()
        .is_some_and(|l| l.chars().count() > MAX_LOCATION_LEN)
    {
        return Some("location must be at most 200 characters");
    }

    if req.tags.iter().any(|t| t.contains(',') || t.trim().is_empty()) {
        return Some("tags must be non-empty and free of commas");
    }

    None
}

fn is_valid_memory_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn not_configured<T>() -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        error_to_api_response(
            error_codes::NOT_CONFIGURED,
            "Cloudinary is not configured".to_string(),
        ),
    )
}

fn validation_error<T>(msg: &str) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::BAD_REQUEST,
        error_to_api_response(error_codes::VALIDATION_ERROR, msg.to_string()),
    )
}

fn upstream_error<T>(op: &str, e: &UpstreamError) -> (StatusCode, Json<ApiResponse<T>>) {
    tracing::error!("{} failed: {}", op, e);
    (
        StatusCode::BAD_GATEWAY,
        error_to_api_response(error_codes::UPSTREAM_ERROR, format!("{} failed", op)),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, routing::post};
    use serde_json::{Value, json};

    use super::*;
    use crate::config::Config;

    fn upload_request() -> UploadMemoryRequest {
        UploadMemoryRequest {
            file: "data:image/jpeg;base64,AAAA".into(),
            memory_id: None,
            title: "Beach day".into(),
            body: None,
            date: "2024-06-01".into(),
            location: None,
            tags: vec![],
        }
    }

    #[test]
    fn title_length_counts_characters_not_bytes() {
        let mut req = upload_request();
        // 150 CJK characters are 450 bytes but well within the limit.
        req.title = "日".repeat(150);
        assert!(validate_upload(&req).is_none());

        req.title = "日".repeat(201);
        assert!(validate_upload(&req).is_some());
    }

    #[test]
    fn body_and_location_lengths_are_bounded() {
        let mut req = upload_request();
        req.body = Some("x".repeat(MAX_BODY_LEN + 1));
        assert!(validate_upload(&req).is_some());

        let mut req = upload_request();
        req.location = Some("x".repeat(MAX_LOCATION_LEN + 1));
        assert!(validate_upload(&req).is_some());

        let mut req = upload_request();
        req.body = Some("a fine day".into());
        req.location = Some("Berlin".into());
        assert!(validate_upload(&req).is_none());
    }

    #[derive(Clone)]
    struct MockCloudinary {
        destroyed: Arc<AtomicUsize>,
        destroy_result: &'static str,
        paginate: bool,
    }

    async fn mock_search(
        State(mock): State<MockCloudinary>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let resource = |id: &str| {
            json!({
                "public_id": id,
                "secure_url": format!("https://res.example.com/{}", id),
                "created_at": "2024-06-01T12:00:00Z",
                "context": {"memory_id": "m1"}
            })
        };

        let cursor = body.get("next_cursor").and_then(|c| c.as_str());
        let page = match (mock.paginate, cursor) {
            (true, None) => json!({
                "resources": [resource("memories/u1/a"), resource("memories/u1/b")],
                "next_cursor": "batch2"
            }),
            _ => json!({ "resources": [resource("memories/u1/c")] }),
        };
        Json(page)
    }

    async fn mock_destroy(State(mock): State<MockCloudinary>) -> Json<Value> {
        mock.destroyed.fetch_add(1, Ordering::SeqCst);
        Json(json!({ "result": mock.destroy_result }))
    }

    async fn start_mock(mock: MockCloudinary) -> String {
        let app = Router::new()
            .route("/v1_1/testcloud/resources/search", post(mock_search))
            .route("/v1_1/testcloud/image/destroy", post(mock_destroy))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn test_state(api_base: &str) -> AppState {
        AppState {
            config: Config {
                server_host: "::".into(),
                server_port: 3000,
                api_base_uri: "/api".into(),
                cloudinary_cloud_name: Some("testcloud".into()),
                cloudinary_api_key: Some("key".into()),
                cloudinary_api_secret: Some("secret".into()),
                cloudinary_base_folder: "memories".into(),
                cloudinary_api_base: api_base.into(),
                firebase_api_key: None,
                firebase_project_id: None,
                nominatim_base_url: String::new(),
                osrm_base_url: String::new(),
                outbound_user_agent: "test".into(),
                session_ttl_secs: 3600,
                rate_limit_window_secs: 60,
                rate_limit_requests: 100,
                rate_limit_sweep_secs: 300,
            },
            http: reqwest::Client::new(),
        }
    }

    fn test_session() -> SessionToken {
        SessionToken {
            user_id: "u1".into(),
            created_at: 0,
            expires_at: i64::MAX,
        }
    }

    #[tokio::test]
    async fn delete_memory_follows_search_cursor() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let base = start_mock(MockCloudinary {
            destroyed: destroyed.clone(),
            destroy_result: "ok",
            paginate: true,
        })
        .await;

        let response = delete_memory(
            Extension(test_session()),
            State(test_state(&base)),
            Json(DeleteMemoryRequest {
                memory_id: "m1".into(),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        // Two images on the first page, one behind the cursor.
        assert_eq!(destroyed.load(Ordering::SeqCst), 3);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["resp_data"]["requested"], 3);
        assert_eq!(body["resp_data"]["deleted"], 3);
    }

    #[tokio::test]
    async fn delete_memory_fails_when_nothing_is_removed() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let base = start_mock(MockCloudinary {
            destroyed: destroyed.clone(),
            destroy_result: "not found",
            paginate: false,
        })
        .await;

        let response = delete_memory(
            Extension(test_session()),
            State(test_state(&base)),
            Json(DeleteMemoryRequest {
                memory_id: "m1".into(),
            }),
        )
        .await
        .into_response();

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
