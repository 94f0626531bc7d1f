use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::tools::{SearchHit, SearchTool};
use crate::{
    config::Pharmacy,
    errors::Error,
    medicines::{Medicine, MedicineNameSet},
};

const DEFAULT_MAX_LINKS: usize = 3;
const HITS_PER_QUERY: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PurchaseLink {
    pub title: String,
    pub url: String,
    /// Pharmacy name, or the URL host when no configured pharmacy matches
    pub source: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FindingStatus {
    Found,
    NotFound,
    /// Every search for this medicine failed
    Unavailable { reason: String },
}

/// Research result for one targeted medicine
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Finding {
    pub medicine: Medicine,
    pub links: Vec<PurchaseLink>,
    pub status: FindingStatus,
}

impl Finding {
    pub fn is_found(&self) -> bool {
        matches!(self.status, FindingStatus::Found)
    }
}

/// One entry per targeted medicine, in the order they were given
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Findings {
    pub entries: Vec<Finding>,
    /// Tool limitations observed while searching
    pub limitations: Vec<String>,
}

impl Findings {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn missing(&self) -> usize {
        self.entries.iter().filter(|f| !f.is_found()).count()
    }
}

struct MedicineOutcome {
    finding: Finding,
    errors: Vec<String>,
    succeeded: bool,
}

/// Looks up purchase links for each medicine across the registered search tools
pub struct LinkResearcher {
    tools: Vec<Arc<dyn SearchTool>>,
    pharmacies: Vec<Pharmacy>,
    max_links: usize,
}

impl LinkResearcher {
    pub fn new(tools: Vec<Arc<dyn SearchTool>>, pharmacies: Vec<Pharmacy>) -> Self {
        Self {
            tools,
            pharmacies,
            max_links: DEFAULT_MAX_LINKS,
        }
    }

    pub fn with_max_links(mut self, max_links: usize) -> Self {
        self.max_links = max_links.max(1);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn query_for(&self, medicine: &Medicine) -> String {
        if self.pharmacies.is_empty() {
            return format!("buy {} online pharmacy", medicine.search_term());
        }
        let names: Vec<&str> = self.pharmacies.iter().map(|p| p.name.as_str()).collect();
        format!("buy {} online {}", medicine.search_term(), names.join(" "))
    }

    pub async fn research(&self, medicine_names: &str) -> Result<Findings, Error> {
        self.research_set(&MedicineNameSet::parse(medicine_names)).await
    }

    pub async fn research_set(&self, medicines: &MedicineNameSet) -> Result<Findings, Error> {
        if medicines.is_empty() {
            return Err(Error::input("no medicine names to search"));
        }
        if self.tools.is_empty() {
            return Err(Error::external("search", "no search tools configured"));
        }

        info!(
            targets = medicines.len(),
            tools = ?self.tool_names(),
            "Researching purchase links"
        );

        let mut findings = Findings::default();
        let mut any_succeeded = false;

        for medicine in medicines {
            let outcome = self.research_one(medicine).await;
            any_succeeded |= outcome.succeeded;
            findings.limitations.extend(outcome.errors);
            findings.entries.push(outcome.finding);
        }

        if !any_succeeded {
            return Err(Error::external(
                "search",
                format!("every search failed: {}", findings.limitations.join("; ")),
            ));
        }

        info!(
            targets = findings.len(),
            missing = findings.missing(),
            "Research complete"
        );
        Ok(findings)
    }

    async fn research_one(&self, medicine: &Medicine) -> MedicineOutcome {
        let query = self.query_for(medicine);
        let mut hits = Vec::new();
        let mut errors = Vec::new();

        for tool in &self.tools {
            match tool.search(&query, HITS_PER_QUERY).await {
                Ok(found) => hits.extend(found),
                Err(e) => {
                    warn!(
                        medicine = %medicine.name,
                        tool = tool.name(),
                        capability = %tool.capability(),
                        error = %e,
                        "Search failed"
                    );
                    errors.push(format!("{} could not search for {}: {}", tool.name(), medicine.name, e));
                }
            }
        }

        let succeeded = errors.len() < self.tools.len();
        let links = self.purchase_links(hits);
        let status = if !links.is_empty() {
            FindingStatus::Found
        } else if succeeded {
            FindingStatus::NotFound
        } else {
            FindingStatus::Unavailable {
                reason: "search tools were unavailable".to_string(),
            }
        };

        MedicineOutcome {
            finding: Finding {
                medicine: medicine.clone(),
                links,
                status,
            },
            errors,
            succeeded,
        }
    }

    fn purchase_links(&self, hits: Vec<SearchHit>) -> Vec<PurchaseLink> {
        let mut seen = HashSet::new();
        hits.into_iter()
            .filter_map(|hit| self.purchase_link(hit))
            .filter(|link| seen.insert(link.url.clone()))
            .take(self.max_links)
            .collect()
    }

    fn purchase_link(&self, hit: SearchHit) -> Option<PurchaseLink> {
        let parsed = Url::parse(&hit.url).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let host = parsed.host_str()?;

        let source = match self.pharmacies.iter().find(|p| p.matches_host(host)) {
            Some(pharmacy) => pharmacy.name.clone(),
            None if self.pharmacies.is_empty() => host.trim_start_matches("www.").to_string(),
            None => return None,
        };

        let title = if hit.title.trim().is_empty() {
            source.clone()
        } else {
            hit.title.trim().to_string()
        };

        Some(PurchaseLink {
            title,
            url: parsed.to_string(),
            source,
        })
    }
}
