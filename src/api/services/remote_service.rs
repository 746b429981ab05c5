//! Client side of the remote service contract.
//!
//! The engine only depends on [`RemoteService`]; [`HttpRemoteService`] is the
//! production implementation speaking JSON over HTTP.

use super::error::SyncError;
use crate::config::SyncConfig;
use crate::models::{EntityKind, LibraryDocument, LibraryUpload, LibraryUploadAck};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Remote endpoints consumed by the sync engine.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// `GET /collection/{kind}`. A non-array body is `MalformedResponse`.
    async fn fetch_collection(&self, kind: EntityKind) -> Result<Vec<Value>, SyncError>;

    /// `POST /collection/{kind}` with one sanitized row (username included).
    async fn push_row(&self, kind: EntityKind, row: &Value) -> Result<(), SyncError>;

    /// `GET /user-library/{username}`. `Ok(None)` on 404.
    async fn fetch_library(&self, username: &str) -> Result<Option<LibraryDocument>, SyncError>;

    /// `PUT /user-library/{username}`.
    async fn put_library(
        &self,
        username: &str,
        upload: &LibraryUpload,
    ) -> Result<LibraryUploadAck, SyncError>;

    /// `GET /defaults/{kind}`: server-provided default rows.
    async fn fetch_defaults(&self, kind: EntityKind) -> Result<Vec<Value>, SyncError>;
}

/// reqwest-based [`RemoteService`].
pub struct HttpRemoteService {
    client: Client,
    base_url: String,
}

impl HttpRemoteService {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        Url::parse(&config.remote_url).map_err(|e| {
            SyncError::Network(format!("Invalid remote URL {:?}: {}", config.remote_url, e))
        })?;

        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.remote_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn library_url(&self, username: &str) -> String {
        self.url(&format!("user-library/{}", urlencoding::encode(username)))
    }

    async fn fetch_array(&self, url: String) -> Result<Vec<Value>, SyncError> {
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            other => Err(SyncError::MalformedResponse(format!(
                "expected a JSON array from {}, got {}",
                url,
                json_type(&other)
            ))),
        }
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn fetch_collection(&self, kind: EntityKind) -> Result<Vec<Value>, SyncError> {
        self.fetch_array(self.url(&format!("collection/{}", kind.as_str())))
            .await
    }

    async fn push_row(&self, kind: EntityKind, row: &Value) -> Result<(), SyncError> {
        let url = self.url(&format!("collection/{}", kind.as_str()));
        debug!("POST {}", url);
        let response = self.client.post(&url).json(row).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    async fn fetch_library(&self, username: &str) -> Result<Option<LibraryDocument>, SyncError> {
        let url = self.library_url(username);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body = response.json::<Value>().await?;
        if !body.is_object() {
            return Err(SyncError::MalformedResponse(format!(
                "expected a library object, got {}",
                json_type(&body)
            )));
        }
        let document = serde_json::from_value::<LibraryDocument>(body)
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        Ok(Some(document))
    }

    async fn put_library(
        &self,
        username: &str,
        upload: &LibraryUpload,
    ) -> Result<LibraryUploadAck, SyncError> {
        let url = self.library_url(username);
        debug!("PUT {}", url);
        let response = self.client.put(&url).json(upload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        // An empty or unexpected body just means the server did not echo a timestamp.
        let body = response.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn fetch_defaults(&self, kind: EntityKind) -> Result<Vec<Value>, SyncError> {
        self.fetch_array(self.url(&format!("defaults/{}", kind.as_str())))
            .await
    }
}

async fn rejection(response: Response) -> SyncError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SyncError::ServerRejection { status, body }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
