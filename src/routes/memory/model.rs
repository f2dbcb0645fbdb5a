use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::services::cloudinary::{SearchResource, UploadedImage};

#[derive(Debug, Deserialize)]
pub struct UploadMemoryRequest {
    /// Base64 data URI (`data:image/...;base64,`).
    pub file: String,
    /// Appends to an existing memory when set; a fresh ID is minted otherwise.
    pub memory_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadMemoryResponse {
    pub memory_id: String,
    pub image: MemoryImage,
}

#[derive(Debug, Serialize)]
pub struct MemoryImage {
    pub public_id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub created_at: String,
}

impl From<UploadedImage> for MemoryImage {
    fn from(image: UploadedImage) -> Self {
        Self {
            public_id: image.public_id,
            url: image.secure_url,
            width: image.width,
            height: image.height,
            format: image.format,
            created_at: image.created_at,
        }
    }
}

impl From<SearchResource> for MemoryImage {
    fn from(resource: SearchResource) -> Self {
        Self {
            public_id: resource.public_id,
            url: resource.secure_url,
            width: resource.width,
            height: resource.height,
            format: resource.format,
            created_at: resource.created_at,
        }
    }
}

/// A memory exists only as shared image metadata: it is reconstructed on
/// every read by grouping search hits on their `memory_id` context.
#[derive(Debug, Serialize)]
pub struct Memory {
    pub memory_id: String,
    pub title: String,
    pub body: Option<String>,
    pub date: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub images: Vec<MemoryImage>,
}

impl Memory {
    /// Groups newest-first search resources into memories, preserving the
    /// incoming order. The newest image's context wins for the memory
    /// fields; resources without a `memory_id` are skipped.
    pub fn group(resources: Vec<SearchResource>) -> Vec<Memory> {
        let mut memories: Vec<Memory> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();

        for resource in resources {
            let Some(memory_id) = resource.context.get("memory_id").cloned() else {
                continue;
            };

            let idx = match by_id.get(&memory_id) {
                Some(&idx) => idx,
                None => {
                    memories.push(Memory {
                        memory_id: memory_id.clone(),
                        title: resource.context.get("title").cloned().unwrap_or_default(),
                        body: resource.context.get("body").cloned(),
                        date: resource.context.get("date").cloned().unwrap_or_default(),
                        location: resource.context.get("location").cloned(),
                        tags: resource.tags.clone(),
                        images: Vec::new(),
                    });
                    by_id.insert(memory_id, memories.len() - 1);
                    memories.len() - 1
                }
            };

            memories[idx].images.push(MemoryImage::from(resource));
        }

        memories
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    pub q: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListMemoriesResponse {
    pub memories: Vec<Memory>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub public_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMemoryRequest {
    pub memory_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteMemoryResponse {
    pub requested: usize,
    pub deleted: usize,
    pub failed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(public_id: &str, context: &[(&str, &str)], tags: &[&str]) -> SearchResource {
        SearchResource {
            public_id: public_id.to_string(),
            secure_url: format!("https://res.example.com/{}", public_id),
            created_at: "2024-06-01T12:00:00Z".to_string(),
            width: Some(800),
            height: Some(600),
            format: Some("jpg".to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn grouping_collects_images_per_memory() {
        let resources = vec![
            resource(
                "memories/u1/a",
                &[("memory_id", "m1"), ("title", "Beach"), ("date", "2024-06-01")],
                &["summer"],
            ),
            resource("memories/u1/b", &[("memory_id", "m1")], &[]),
            resource(
                "memories/u1/c",
                &[("memory_id", "m2"), ("title", "Hike"), ("date", "2024-05-20")],
                &["alps"],
            ),
        ];

        let memories = Memory::group(resources);
        assert_eq!(memories.len(), 2);

        // Incoming (newest-first) order is preserved.
        assert_eq!(memories[0].memory_id, "m1");
        assert_eq!(memories[0].title, "Beach");
        assert_eq!(memories[0].tags, vec!["summer".to_string()]);
        assert_eq!(memories[0].images.len(), 2);
        assert_eq!(memories[1].memory_id, "m2");
        assert_eq!(memories[1].images.len(), 1);
    }

    #[test]
    fn newest_image_context_wins() {
        let resources = vec![
            resource(
                "memories/u1/new",
                &[("memory_id", "m1"), ("title", "Renamed trip")],
                &[],
            ),
            resource(
                "memories/u1/old",
                &[("memory_id", "m1"), ("title", "Old title")],
                &[],
            ),
        ];

        let memories = Memory::group(resources);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].title, "Renamed trip");
    }

    #[test]
    fn resources_without_memory_id_are_skipped() {
        let resources = vec![
            resource("memories/u1/stray", &[("title", "no id")], &[]),
            resource("memories/u1/kept", &[("memory_id", "m1")], &[]),
        ];

        let memories = Memory::group(resources);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].images[0].public_id, "memories/u1/kept");
    }
}
