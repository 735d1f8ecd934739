use crate::config::B2Config;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, error, info};
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

// B2 authorization tokens live 24 hours; re-authorize an hour early.
const AUTH_CACHE_TTL: Duration = Duration::from_secs(23 * 60 * 60);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed with status {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

// Backblaze B2 API response structures
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    api_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    authorization_token: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileResponse {
    file_id: String,
    file_name: String,
    content_length: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
}

/// Where an uploaded object lives in the bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub file_id: String,
    pub file_name: String,
}

/// Backblaze B2 client holding resume binaries; caches the account authorization.
#[derive(Clone)]
pub struct B2Client {
    client: Client,
    auth: Arc<Mutex<Option<(AuthorizeAccountResponse, Instant)>>>,
    application_key_id: String,
    application_key: String,
    bucket_id: String,
}

async fn ensure_success(
    response: Response,
    operation: &'static str,
) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("B2 {} failed ({}): {}", operation, status, body);
    Err(StorageError::Api {
        operation,
        status: status.as_u16(),
        body,
    })
}

impl B2Client {
    pub fn new(config: &B2Config, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(B2Client {
            client,
            auth: Arc::new(Mutex::new(None)),
            application_key_id: config.application_key_id.clone(),
            application_key: config.application_key.clone(),
            bucket_id: config.bucket_id.clone(),
        })
    }

    async fn authorize_account(&self) -> Result<AuthorizeAccountResponse, StorageError> {
        let mut cached = self.auth.lock().await;
        if let Some((auth, at)) = cached.as_ref() {
            if at.elapsed() < AUTH_CACHE_TTL {
                debug!("Using cached B2 authorization token");
                return Ok(auth.clone());
            }
        }

        info!("Authorizing B2 account with key ID: {}", self.application_key_id);

        let credentials = STANDARD.encode(format!(
            "{}:{}",
            self.application_key_id, self.application_key
        ));
        let response = self
            .client
            .get(AUTHORIZE_URL)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .send()
            .await?;

        let auth: AuthorizeAccountResponse = ensure_success(response, "authorize_account")
            .await?
            .json()
            .await?;

        info!("B2 authorization successful. API URL: {}", auth.api_url);
        *cached = Some((auth.clone(), Instant::now()));
        Ok(auth)
    }

    async fn get_upload_url(&self) -> Result<GetUploadUrlResponse, StorageError> {
        let auth = self.authorize_account().await?;

        let response = self
            .client
            .post(format!("{}/b2api/v2/b2_get_upload_url", auth.api_url))
            .header(header::AUTHORIZATION, &auth.authorization_token)
            .json(&serde_json::json!({ "bucketId": self.bucket_id }))
            .send()
            .await?;

        Ok(ensure_success(response, "get_upload_url").await?.json().await?)
    }

    pub async fn upload_file(
        &self,
        file_data: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let upload_url = self.get_upload_url().await?;

        let sha1_hex = format!("{:x}", Sha1::digest(file_data));

        info!("Uploading {} ({} bytes) to B2", file_name, file_data.len());

        let response = self
            .client
            .post(&upload_url.upload_url)
            .header(header::AUTHORIZATION, &upload_url.authorization_token)
            .header("X-Bz-File-Name", file_name)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, file_data.len().to_string())
            .header("X-Bz-Content-Sha1", sha1_hex)
            .body(file_data.to_vec())
            .send()
            .await?;

        let uploaded: UploadFileResponse =
            ensure_success(response, "upload_file").await?.json().await?;

        info!(
            "Stored {} as {} ({} bytes)",
            uploaded.file_name, uploaded.file_id, uploaded.content_length
        );
        Ok(StoredObject {
            file_id: uploaded.file_id,
            file_name: uploaded.file_name,
        })
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let auth = self.authorize_account().await?;

        let response = self
            .client
            .get(format!("{}/b2api/v2/b2_download_file_by_id", auth.api_url))
            .header(header::AUTHORIZATION, &auth.authorization_token)
            .query(&[("fileId", file_id)])
            .send()
            .await?;

        let bytes = ensure_success(response, "download_file").await?.bytes().await?;
        debug!("Downloaded {} ({} bytes) from B2", file_id, bytes.len());
        Ok(bytes.to_vec())
    }

    pub async fn delete_file(&self, object: &StoredObject) -> Result<(), StorageError> {
        let auth = self.authorize_account().await?;

        let response = self
            .client
            .post(format!("{}/b2api/v2/b2_delete_file_version", auth.api_url))
            .header(header::AUTHORIZATION, &auth.authorization_token)
            .json(&DeleteFileRequest {
                file_name: &object.file_name,
                file_id: &object.file_id,
            })
            .send()
            .await?;

        ensure_success(response, "delete_file").await?;
        info!("Deleted {} from B2", object.file_name);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A client that is never asked to reach B2.
    pub(crate) fn offline_client() -> B2Client {
        let config = B2Config {
            application_key_id: "key-id".into(),
            application_key: "key".into(),
            bucket_id: "bucket".into(),
        };
        B2Client::new(&config, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn delete_request_uses_b2_field_names() {
        let body = serde_json::to_value(DeleteFileRequest {
            file_name: "resumes/a.pdf",
            file_id: "4_z123",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "fileName": "resumes/a.pdf", "fileId": "4_z123" })
        );
    }

    #[test]
    fn upload_response_parses_camel_case() {
        let parsed: UploadFileResponse = serde_json::from_str(
            r#"{"fileId":"4_z1","fileName":"resumes/x.pdf","contentLength":12,"bucketId":"b"}"#,
        )
        .unwrap();
        assert_eq!(parsed.file_id, "4_z1");
        assert_eq!(parsed.content_length, 12);
    }
}
