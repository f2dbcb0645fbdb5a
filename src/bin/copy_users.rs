//! One-off migration: batch-copies every Firestore document from the
//! `users` collection into a target collection, preserving fields and IDs.
//!
//! Usage: `copy_users <target-collection>`

use backend::{config::Config, services::firebase::FirebaseClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let target = std::env::args()
        .nth(1)
        .expect("Usage: copy_users <target-collection>");
    let config = Config::from_env().expect("Failed to load configuration");
    let http = reqwest::Client::builder()
        .user_agent(config.outbound_user_agent.clone())
        .build()
        .expect("Failed to build HTTP client");
    let client = FirebaseClient::from_config(&http, &config)
        .expect("Firebase configuration is missing");

    let mut page_token: Option<String> = None;
    let mut copied = 0usize;
    let mut failed = 0usize;

    loop {
        let page = client
            .list_documents("users", page_token.as_deref())
            .await
            .expect("Listing the users collection failed");

        for doc in &page.documents {
            let doc_id = doc.doc_id().to_string();
            match client.create_document(&target, &doc_id, &doc.fields).await {
                Ok(()) => {
                    tracing::info!("copied users/{} -> {}/{}", doc_id, target, doc_id);
                    copied += 1;
                }
                Err(e) => {
                    tracing::error!("failed to copy users/{}: {}", doc_id, e);
                    failed += 1;
                }
            }
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    tracing::info!("done: {} documents copied, {} failed", copied, failed);
}
