//! S3-compatible object store client.
//!
//! Document bytes never live in the database; only the object key does.
//! The store must be read-your-writes: a successful `put` is visible to
//! the next `get`.

use log::{debug, error};

use crate::configuration::BlobSettings;
use crate::errors::{ApiError, ApiResult};

pub struct BlobStore {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl BlobStore {
    pub fn new(settings: &BlobSettings) -> Self {
        BlobStore {
            http: reqwest::Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            bucket: settings.bucket.clone(),
        }
    }

    /// Key convention: `{application_id}/{document_id}/{filename}`.
    pub fn object_key(application_id: i64, document_id: i64, filename: &str) -> String {
        format!("{}/{}/{}", application_id, document_id, filename)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    pub async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ApiResult<()> {
        let url = self.object_url(key);
        debug!("Uploading {} bytes to {}", bytes.len(), url);
        let response = self
            .http
            .put(&url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("blob store unreachable: {}", e)))?;

        if !response.status().is_success() {
            error!("Blob store PUT {} returned {}", url, response.status());
            return Err(ApiError::Internal(format!(
                "blob store rejected upload: {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> ApiResult<Vec<u8>> {
        let url = self.object_url(key);
        debug!("Downloading object {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("blob store unreachable: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound("document content"));
        }
        if !response.status().is_success() {
            error!("Blob store GET {} returned {}", url, response.status());
            return Err(ApiError::Internal(format!(
                "blob store read failed: {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Internal(format!("blob store read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_follows_convention() {
        assert_eq!(BlobStore::object_key(12, 34, "w2.pdf"), "12/34/w2.pdf");
    }
}
