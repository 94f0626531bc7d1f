use std::fmt;

use async_trait::async_trait;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ToolCapability {
    Search,
    /// Search plus scraping of the result pages
    SearchAndCrawl,
}

impl fmt::Display for ToolCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::SearchAndCrawl => write!(f, "search+crawl"),
        }
    }
}

/// A single result returned by a search tool
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// Web search capability used by the researcher
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;

    fn capability(&self) -> ToolCapability;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error>;
}
