use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tools::{SearchHit, SearchTool, ToolCapability};
use crate::errors::Error;

const FIRECRAWL_BASE_URL: &str = "https://api.firecrawl.dev/v1";
const MAX_LINKS_PER_PAGE: usize = 25;

static MARKDOWN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s()<>\[\]"'`]+"#).unwrap());

/// Firecrawl search with markdown scraping of each result page.
///
/// Besides the result pages themselves, URLs found in the scraped content are
/// returned as hits, which is how product pages linked from a pharmacy's
/// search listing get picked up.
pub struct FirecrawlSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlSearch {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: FIRECRAWL_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    scrape_options: ScrapeOptions,
}

#[derive(Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<SearchDocument>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct SearchDocument {
    url: Option<String>,
    title: Option<String>,
    markdown: Option<String>,
}

fn hits_from_documents(documents: Vec<SearchDocument>) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for document in documents {
        let title = document.title.unwrap_or_default();
        if let Some(url) = document.url {
            hits.push(SearchHit::new(title.clone(), url));
        }
        if let Some(markdown) = document.markdown {
            hits.extend(
                links_in_markdown(&markdown)
                    .into_iter()
                    .take(MAX_LINKS_PER_PAGE)
                    .map(|url| SearchHit::new(title.clone(), url)),
            );
        }
    }
    hits
}

fn links_in_markdown(markdown: &str) -> Vec<String> {
    MARKDOWN_URL
        .find_iter(markdown)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
        .collect()
}

#[async_trait]
impl SearchTool for FirecrawlSearch {
    fn name(&self) -> &str {
        "firecrawl"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::SearchAndCrawl
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error> {
        debug!(query, "Searching with Firecrawl");

        let body = SearchRequest {
            query,
            limit,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
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

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::external(self.name(), format!("unreadable response: {}", e)))?;

        if !parsed.success {
            return Err(Error::external(
                self.name(),
                parsed.error.unwrap_or("search was not successful".to_string()),
            ));
        }

        Ok(hits_from_documents(parsed.data))
    }
}
