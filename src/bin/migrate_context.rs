//! One-off migration: renames the legacy `memoryId` context key to
//! `memory_id` on every Cloudinary resource under the base folder.
//!
//! Usage: `migrate_context [--dry-run]`

use backend::{
    config::Config,
    services::cloudinary::{CloudinaryClient, SearchResource, encode_context},
};
use tracing_subscriber::EnvFilter;

const PAGE_SIZE: u32 = 100;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dry_run = std::env::args().any(|arg| arg == "--dry-run");
    let config = Config::from_env().expect("Failed to load configuration");
    let http = reqwest::Client::builder()
        .user_agent(config.outbound_user_agent.clone())
        .build()
        .expect("Failed to build HTTP client");
    let client = CloudinaryClient::from_config(&http, &config)
        .expect("Cloudinary credentials are not configured");

    let expression = format!(
        "folder:{}/* AND context.memoryId:*",
        client.base_folder
    );

    let mut cursor: Option<String> = None;
    let mut scanned = 0usize;
    let mut migrated = 0usize;
    let mut skipped = 0usize;

    loop {
        let page = client
            .search(&expression, cursor.as_deref(), PAGE_SIZE)
            .await
            .expect("Search request failed");
        scanned += page.resources.len();

        for resource in &page.resources {
            let Some(memory_id) = legacy_memory_id(resource) else {
                skipped += 1;
                continue;
            };

            if dry_run {
                tracing::info!(
                    "would set memory_id={} on {}",
                    memory_id,
                    resource.public_id
                );
                migrated += 1;
                continue;
            }

            let context = encode_context(&[("memory_id", memory_id)]);
            match client
                .add_context(&[resource.public_id.clone()], &context)
                .await
            {
                Ok(()) => {
                    tracing::info!("migrated {}", resource.public_id);
                    migrated += 1;
                }
                Err(e) => {
                    tracing::error!("failed to migrate {}: {}", resource.public_id, e);
                }
            }
        }

        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    tracing::info!(
        "done: {} resources scanned, {} skipped, {} {}",
        scanned,
        skipped,
        migrated,
        if dry_run { "would be migrated" } else { "migrated" }
    );
}

/// The legacy `memoryId` value, or `None` when the resource has nothing to
/// migrate. `add` cannot drop the old key, so re-runs see both keys; a
/// resource that already carries `memory_id` is done.
fn legacy_memory_id(resource: &SearchResource) -> Option<&str> {
    if resource.context.contains_key("memory_id") {
        return None;
    }
    resource.context.get("memoryId").map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(context: &[(&str, &str)]) -> SearchResource {
        SearchResource {
            public_id: "memories/u1/a".to_string(),
            secure_url: String::new(),
            created_at: String::new(),
            width: None,
            height: None,
            format: None,
            tags: Vec::new(),
            context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn legacy_key_is_picked_up() {
        let resource = resource(&[("memoryId", "m1")]);
        assert_eq!(legacy_memory_id(&resource), Some("m1"));
    }

    #[test]
    fn already_migrated_resources_are_skipped() {
        // A previous run added memory_id; the legacy key is still there.
        let resource = resource(&[("memoryId", "m1"), ("memory_id", "m1")]);
        assert_eq!(legacy_memory_id(&resource), None);
    }

    #[test]
    fn resources_without_either_key_are_skipped() {
        let resource = resource(&[("title", "Beach")]);
        assert_eq!(legacy_memory_id(&resource), None);
    }
}
