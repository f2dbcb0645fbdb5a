use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{UpstreamError, check_status};
use crate::config::Config;

/// Thin wrapper over the Cloudinary Upload, Admin and Search REST APIs.
/// Upload/destroy/context calls are request-signed; search uses basic auth.
#[derive(Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    pub base_folder: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadedImage {
    pub public_id: String,
    #[serde(default)]
    pub secure_url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub total_count: u64,
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub resources: Vec<SearchResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResource {
    pub public_id: String,
    #[serde(default)]
    pub secure_url: String,
    #[serde(default)]
    pub created_at: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl CloudinaryClient {
    /// `None` when any of the three credentials is missing from the config.
    pub fn from_config(http: &reqwest::Client, config: &Config) -> Option<Self> {
        Some(Self {
            http: http.clone(),
            api_base: config.cloudinary_api_base.clone(),
            cloud_name: config.cloudinary_cloud_name.clone()?,
            api_key: config.cloudinary_api_key.clone()?,
            api_secret: config.cloudinary_api_secret.clone()?,
            base_folder: config.cloudinary_base_folder.clone(),
        })
    }

    /// Signed upload of a base64 data URI, with the memory fields attached
    /// as `context` metadata.
    pub async fn upload_image(
        &self,
        file: &str,
        folder: &str,
        context: &str,
        tags: &str,
    ) -> Result<UploadedImage, UpstreamError> {
        let mut params = BTreeMap::new();
        params.insert("folder", folder.to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());
        if !context.is_empty() {
            params.insert("context", context.to_string());
        }
        if !tags.is_empty() {
            params.insert("tags", tags.to_string());
        }

        let signature = sign_request(&params, &self.api_secret);
        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("file", file.to_string()));
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));

        let url = format!("{}/v1_1/{}/image/upload", self.api_base, self.cloud_name);
        let resp = self.http.post(&url).form(&form).send().await?;
        let resp = check_status(resp).await?;

        Ok(resp.json().await?)
    }

    /// Deletes a single image. Returns `false` when Cloudinary reports the
    /// public ID as unknown.
    pub async fn destroy_image(&self, public_id: &str) -> Result<bool, UpstreamError> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());

        let signature = sign_request(&params, &self.api_secret);
        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));

        let url = format!("{}/v1_1/{}/image/destroy", self.api_base, self.cloud_name);
        let resp = self.http.post(&url).form(&form).send().await?;
        let resp = check_status(resp).await?;

        let body: DestroyResponse = resp.json().await?;
        Ok(body.result == "ok")
    }

    /// Search API query. Requests `context` and `tags` with every hit so
    /// memories can be reconstructed from the metadata alone.
    pub async fn search(
        &self,
        expression: &str,
        next_cursor: Option<&str>,
        max_results: u32,
    ) -> Result<SearchPage, UpstreamError> {
        let mut body = serde_json::json!({
            "expression": expression,
            "with_field": ["context", "tags"],
            "max_results": max_results,
            "sort_by": [{"created_at": "desc"}],
        });
        if let Some(cursor) = next_cursor {
            body["next_cursor"] = serde_json::Value::String(cursor.to_string());
        }

        let url = format!("{}/v1_1/{}/resources/search", self.api_base, self.cloud_name);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        Ok(resp.json().await?)
    }

    /// Adds (or overwrites) context pairs on existing resources. Used by the
    /// metadata migration job.
    pub async fn add_context(
        &self,
        public_ids: &[String],
        context: &str,
    ) -> Result<(), UpstreamError> {
        let mut params = BTreeMap::new();
        params.insert("command", "add".to_string());
        params.insert("context", context.to_string());
        params.insert("public_ids", public_ids.join(","));
        params.insert("timestamp", Utc::now().timestamp().to_string());

        let signature = sign_request(&params, &self.api_secret);
        let mut form: Vec<(String, String)> = params
            .iter()
            .filter(|&(&k, _)| k != "public_ids")
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        for id in public_ids {
            form.push(("public_ids[]".to_string(), id.clone()));
        }
        form.push(("api_key".to_string(), self.api_key.clone()));
        form.push(("signature".to_string(), signature));

        let url = format!("{}/v1_1/{}/image/context", self.api_base, self.cloud_name);
        let resp = self.http.post(&url).form(&form).send().await?;
        check_status(resp).await?;

        Ok(())
    }
}

/// SHA-256 request signature: sorted `k=v` pairs joined with `&`, secret
/// appended. `file`, `api_key` and the signature itself never participate.
pub fn sign_request(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .filter(|(k, v)| **k != "file" && **k != "api_key" && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{}{}", to_sign, api_secret).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Flattens key/value pairs into Cloudinary's pipe-separated context format,
/// escaping `=` and `|` inside values.
pub fn encode_context(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, escape_context_value(v)))
        .collect::<Vec<_>>()
        .join("|")
}

fn escape_context_value(value: &str) -> String {
    value.replace('=', "\\=").replace('|', "\\|")
}

/// Search expression scoping results to one user's folder, optionally
/// narrowed by a free-text term over the title context and tags.
pub fn folder_expression(folder: &str, q: Option<&str>) -> String {
    let mut expr = format!("folder=\"{}\"", folder);
    if let Some(q) = q {
        let q = q.replace('"', " ");
        let q = q.trim();
        if !q.is_empty() {
            expr.push_str(&format!(
                " AND (context.title:\"{}\" OR tags:\"{}\")",
                q, q
            ));
        }
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_param_sensitive() {
        let mut params = BTreeMap::new();
        params.insert("folder", "memories/u1".to_string());
        params.insert("timestamp", "1700000000".to_string());

        let first = sign_request(&params, "secret");
        let second = sign_request(&params, "secret");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        params.insert("tags", "beach".to_string());
        assert_ne!(first, sign_request(&params, "secret"));
        assert_ne!(first, sign_request(&params, "other-secret"));
    }

    #[test]
    fn signature_ignores_file_api_key_and_empty_params() {
        let mut base = BTreeMap::new();
        base.insert("timestamp", "1700000000".to_string());

        let mut extended = base.clone();
        extended.insert("file", "data:image/png;base64,AAAA".to_string());
        extended.insert("api_key", "12345".to_string());
        extended.insert("context", String::new());

        assert_eq!(
            sign_request(&base, "secret"),
            sign_request(&extended, "secret")
        );
    }

    #[test]
    fn context_encoding_escapes_separators() {
        let context = encode_context(&[
            ("memory_id", "abc-123"),
            ("title", "sunset | day 1 = best"),
            ("location", ""),
        ]);
        assert_eq!(context, "memory_id=abc-123|title=sunset \\| day 1 \\= best");
    }

    #[test]
    fn folder_expression_scopes_and_sanitizes() {
        assert_eq!(
            folder_expression("memories/u1", None),
            "folder=\"memories/u1\""
        );
        assert_eq!(
            folder_expression("memories/u1", Some("beach\" OR folder:\"x")),
            "folder=\"memories/u1\" AND (context.title:\"beach  OR folder: x\" OR tags:\"beach  OR folder: x\")"
        );
        // Blank query terms collapse to the plain folder scope.
        assert_eq!(
            folder_expression("memories/u1", Some("  ")),
            "folder=\"memories/u1\""
        );
    }
}
