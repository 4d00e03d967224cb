//! Object store endpoints (`/storage/v1`).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{
    BackendConfig, BackendError, BackendResult, classify_reqwest_error, error_from_response,
};

/// One row of a bucket listing. Folder placeholders come back with a null id.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ObjectEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Client for one bucket of the object store.
pub struct StorageApi {
    config: BackendConfig,
    http: reqwest::Client,
    bucket: String,
}

impl StorageApi {
    pub fn new(config: BackendConfig, http: reqwest::Client, bucket: impl Into<String>) -> Self {
        Self {
            config,
            http,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public address of `key`. Pure string derivation; the object may not exist.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, self.bucket, key
        )
    }

    /// Bearer for storage calls: the user's token when signed in, else the anon key.
    fn bearer<'a>(&'a self, access_token: Option<&'a str>) -> &'a str {
        access_token.unwrap_or(&self.config.anon_key)
    }

    /// Create-if-absent upload to `key`. Never overwrites an existing object.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure or non-2xx status.
    pub async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control_secs: u32,
        access_token: &str,
    ) -> BackendResult<()> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url, self.bucket, key
        );
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .header("content-type", content_type)
            .header("cache-control", format!("max-age={cache_control_secs}"))
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Lists the bucket root: a single page of at most `limit` entries from `offset`.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure, non-2xx status, or an
    /// unparseable body.
    pub async fn list(
        &self,
        limit: u32,
        offset: u32,
        access_token: Option<&str>,
    ) -> BackendResult<Vec<ObjectEntry>> {
        let url = format!("{}/storage/v1/object/list/{}", self.config.url, self.bucket);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer(access_token))
            .json(&json!({
                "prefix": "",
                "limit": limit,
                "offset": offset,
                "sortBy": { "column": "name", "order": "asc" },
            }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body)
            .map_err(|e| BackendError::parse(format!("Invalid list response: {e}")))
    }

    /// Removes `key` from the bucket.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure or non-2xx status.
    pub async fn remove(&self, key: &str, access_token: Option<&str>) -> BackendResult<()> {
        let url = format!("{}/storage/v1/object/{}", self.config.url, self.bucket);
        let response = self
            .http
            .delete(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer(access_token))
            .json(&json!({ "prefixes": [key] }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Downloads an object by its public URL.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure or non-2xx status.
    pub async fn fetch_public(&self, public_url: &str) -> BackendResult<Vec<u8>> {
        let response = self
            .http
            .get(public_url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        Ok(bytes.to_vec())
    }
}
