//! PostgREST-backed remote table (managed Postgres over HTTP).

use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::{RequestBuilder, Response};
use url::Url;

use super::cache_busted;
use super::table::{CachePolicy, RemoteRecord, RemoteTable};
use crate::BoxFuture;
use crate::error::{Result, SiteSyncError};

/// Remote table served by a PostgREST endpoint.
///
/// Rows are addressed at `{base_url}/rest/v1/{table}`. Writes use
/// PostgREST's upsert (`Prefer: resolution=merge-duplicates` with
/// `on_conflict=id`) so the table never grows past one row per id.
pub struct PostgrestTable {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl PostgrestTable {
    /// Create a table client. Fails on a malformed base URL.
    pub fn new(base_url: &str, table: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|_| SiteSyncError::InvalidUrl(base_url.to_string()))?;
        let endpoint = base
            .join(&format!("rest/v1/{}", table))
            .map_err(|_| SiteSyncError::InvalidUrl(format!("{}/rest/v1/{}", base_url, table)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    /// URL for a select of `id`.
    fn select_url(&self, id: &str, policy: CachePolicy) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id))
            .append_pair("select", "id,data,updated_at,version");
        match policy {
            CachePolicy::Default => url,
            CachePolicy::Bypass => cache_busted(&url, "_t"),
        }
    }

    /// URL for an upsert.
    fn upsert_url(&self, policy: CachePolicy) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("on_conflict", "id");
        match policy {
            CachePolicy::Default => url,
            CachePolicy::Bypass => cache_busted(&url, "_t"),
        }
    }

    fn authorize(&self, request: RequestBuilder, policy: CachePolicy) -> RequestBuilder {
        let request = request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key);
        match policy {
            CachePolicy::Default => request,
            CachePolicy::Bypass => request
                .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
                .header(PRAGMA, "no-cache")
                .header(EXPIRES, "0"),
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SiteSyncError::RemoteStatus {
        status: status.as_u16(),
        message,
    })
}

impl RemoteTable for PostgrestTable {
    fn name(&self) -> &str {
        "postgrest"
    }

    fn select<'a>(
        &'a self,
        id: &'a str,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<Option<RemoteRecord>>> {
        Box::pin(async move {
            let request = self
                .client
                .get(self.select_url(id, policy))
                .header("Accept", "application/json");
            let response = self.authorize(request, policy).send().await?;
            let rows: Vec<RemoteRecord> = check_status(response).await?.json().await?;
            Ok(rows.into_iter().next())
        })
    }

    fn upsert<'a>(
        &'a self,
        record: &'a RemoteRecord,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = self
                .client
                .post(self.upsert_url(policy))
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&[record]);
            let response = self.authorize(request, policy).send().await?;
            check_status(response).await?;
            Ok(())
        })
    }
}
