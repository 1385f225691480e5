//! HTTP client for the backend's content endpoints.

use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use super::{ContentEndpoint, GetContentResponse, SaveContentRequest, SaveContentResponse};
use crate::BoxFuture;
use crate::error::{Result, SiteSyncError};

/// Talks to `POST /api/save-content` and `GET /api/get-content`.
pub struct HttpContentEndpoint {
    client: reqwest::Client,
    base: Url,
}

impl HttpContentEndpoint {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|_| SiteSyncError::InvalidUrl(base_url.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|_| SiteSyncError::InvalidUrl(format!("{}{}", self.base, path)))
    }
}

impl ContentEndpoint for HttpContentEndpoint {
    fn save<'a>(
        &'a self,
        request: &'a SaveContentRequest,
    ) -> BoxFuture<'a, Result<SaveContentResponse>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("api/save-content")?)
                .json(request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SiteSyncError::RemoteStatus {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.json().await?)
        })
    }

    fn get(&self) -> BoxFuture<'_, Result<Option<GetContentResponse>>> {
        Box::pin(async move {
            let response = self.client.get(self.url("api/get-content")?).send().await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SiteSyncError::RemoteStatus {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(Some(response.json().await?))
        })
    }
}
