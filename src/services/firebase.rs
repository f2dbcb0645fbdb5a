use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{UpstreamError, check_status};
use crate::config::Config;

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";
const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

/// REST proxy for Firebase authentication and Firestore documents.
#[derive(Clone)]
pub struct FirebaseClient {
    http: reqwest::Client,
    api_key: String,
    project_id: String,
}

/// Identity as reported by `accounts:lookup` for a verified ID token.
#[derive(Debug, Clone)]
pub struct FirebaseUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

/// Raw Firestore document: `fields` keeps the REST API's typed-value shape.
#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Value,
}

impl FirestoreDocument {
    /// Last path segment of the full resource name.
    pub fn doc_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    #[serde(default)]
    pub documents: Vec<FirestoreDocument>,
    pub next_page_token: Option<String>,
}

impl FirebaseClient {
    pub fn from_config(http: &reqwest::Client, config: &Config) -> Option<Self> {
        Some(Self {
            http: http.clone(),
            api_key: config.firebase_api_key.clone()?,
            project_id: config.firebase_project_id.clone()?,
        })
    }

    /// Resolves a Firebase ID token to the account it was minted for.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<FirebaseUser, UpstreamError> {
        let url = format!(
            "{}/accounts:lookup?key={}",
            IDENTITY_TOOLKIT_BASE, self.api_key
        );
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "idToken": id_token }))
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let body: LookupResponse = resp.json().await?;
        let user = body
            .users
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::api(401, "token did not resolve to a user"))?;

        Ok(FirebaseUser {
            uid: user.local_id,
            email: user.email,
            display_name: user.display_name,
        })
    }

    /// Fetches `users/{uid}`; `None` when the document does not exist.
    pub async fn get_user_doc(
        &self,
        uid: &str,
    ) -> Result<Option<FirestoreDocument>, UpstreamError> {
        let url = format!("{}/users/{}?key={}", self.documents_base(), uid, self.api_key);
        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;

        Ok(Some(resp.json().await?))
    }

    /// Creates or updates `users/{uid}` with the profile carried by the
    /// verified token.
    pub async fn upsert_user_doc(&self, user: &FirebaseUser) -> Result<(), UpstreamError> {
        let mut fields = serde_json::Map::new();
        if let Some(email) = &user.email {
            fields.insert("email".into(), string_value(email));
        }
        if let Some(name) = &user.display_name {
            fields.insert("display_name".into(), string_value(name));
        }
        fields.insert(
            "created_at".into(),
            json!({ "timestampValue": Utc::now().to_rfc3339() }),
        );

        let url = format!(
            "{}/users/{}?key={}",
            self.documents_base(),
            user.uid,
            self.api_key
        );
        let resp = self
            .http
            .patch(&url)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        check_status(resp).await?;

        Ok(())
    }

    /// One page of a collection listing. Used by the batch-copy job.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_token: Option<&str>,
    ) -> Result<DocumentPage, UpstreamError> {
        let mut url = format!(
            "{}/{}?key={}&pageSize=100",
            self.documents_base(),
            collection,
            self.api_key
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", token));
        }

        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp).await?;

        Ok(resp.json().await?)
    }

    /// Creates a document with an explicit ID, preserving the given fields.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: &Value,
    ) -> Result<(), UpstreamError> {
        let url = format!(
            "{}/{}?documentId={}&key={}",
            self.documents_base(),
            collection,
            doc_id,
            self.api_key
        );
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        check_status(resp).await?;

        Ok(())
    }

    fn documents_base(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            FIRESTORE_BASE, self.project_id
        )
    }
}

fn string_value(v: &str) -> Value {
    json!({ "stringValue": v })
}
