//! [`JobApi`] implementation over HTTP + SSE via `reqwest`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;

use corral_core::types::DbId;

use crate::api::{ApiError, JobApi, JobSnapshot, StreamMessage};
use crate::sse::SseParser;

/// Standard `{ "data": ... }` envelope the server wraps payloads in.
#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// HTTP client for one corral server.
#[derive(Debug, Clone)]
pub struct HttpJobApi {
    base_url: String,
    owner_id: Option<String>,
    client: reqwest::Client,
}

impl HttpJobApi {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    /// `owner_id` is sent as the `X-Owner-Id` header when present.
    pub fn new(base_url: impl Into<String>, owner_id: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            owner_id,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(owner) = &self.owner_id {
            builder = builder.header("x-owner-id", owner);
        }
        builder
    }

    /// Map error statuses onto [`ApiError`]; pass success through.
    fn check(job_id: DbId, status: StatusCode) -> Result<(), ApiError> {
        match status {
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(job_id)),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden(job_id)),
            s if s.is_success() => Ok(()),
            s => Err(ApiError::Transport(format!("Unexpected status {s}"))),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn fetch(&self, job_id: DbId) -> Result<JobSnapshot, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/v1/jobs/{job_id}"))
            .send()
            .await?;
        Self::check(job_id, response.status())?;

        let envelope: DataEnvelope<JobSnapshot> = response.json().await?;
        Ok(envelope.data)
    }

    async fn cancel(&self, job_id: DbId) -> Result<JobSnapshot, ApiError> {
        let response = self
            .request(Method::POST, &format!("/api/v1/jobs/{job_id}/cancel"))
            .send()
            .await?;
        Self::check(job_id, response.status())?;

        let envelope: DataEnvelope<JobSnapshot> = response.json().await?;
        Ok(envelope.data)
    }

    async fn delete(&self, job_id: DbId) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("/api/v1/jobs/{job_id}"))
            .send()
            .await?;
        Self::check(job_id, response.status())
    }

    async fn subscribe(
        &self,
        job_id: DbId,
    ) -> Result<BoxStream<'static, Result<StreamMessage, ApiError>>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/v1/jobs/{job_id}/stream"))
            .send()
            .await?;
        Self::check(job_id, response.status())?;

        let mut body = response.bytes_stream();
        let mut parser = SseParser::new();

        Ok(Box::pin(async_stream::stream! {
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ApiError::from(e));
                        return;
                    }
                };

                for payload in parser.feed(&chunk) {
                    match serde_json::from_str::<StreamMessage>(&payload) {
                        Ok(message) => yield Ok(message),
                        Err(e) => {
                            tracing::warn!(job_id, error = %e, "Skipping malformed stream event");
                        }
                    }
                }
            }
        }))
    }
}
