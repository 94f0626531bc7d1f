use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tools::{SearchHit, SearchTool, ToolCapability};
use crate::errors::Error;

const SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Google results through serper.dev
pub struct SerperSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SerperSearch {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: SERPER_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    shopping: Vec<SerperResult>,
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Deserialize)]
struct SerperResult {
    #[serde(default)]
    title: String,
    link: Option<String>,
}

impl SerperResponse {
    /// Shopping results first, they point at product pages more often
    fn into_hits(self, limit: usize) -> Vec<SearchHit> {
        self.shopping
            .into_iter()
            .chain(self.organic)
            .filter_map(|r| Some(SearchHit::new(r.title, r.link?)))
            .take(limit)
            .collect()
    }
}

#[async_trait]
impl SearchTool for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Search
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error> {
        debug!(query, "Searching with Serper");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest { q: query, num: limit })
            .send()
            .await
            .map_err(|e| Error::external(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Error::external(
                self.name(),
                format!("returned {}: {}", status, error_body),
            ));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| Error::external(self.name(), format!("unreadable response: {}", e)))?;

        Ok(parsed.into_hits(limit))
    }
}
