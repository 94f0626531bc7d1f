use std::{env, path::PathBuf, str::FromStr, time::Duration};

use derive_new::new;

use crate::errors::Error;

pub const DEFAULT_REPORT_FILE_NAME: &str = "Links.md";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-001";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Online pharmacy that purchase links are searched on
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct Pharmacy {
    pub name: String,
    pub domain: String,
}

impl Pharmacy {
    /// True when `host` is the pharmacy domain or one of its subdomains
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        let domain = self.domain.to_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

pub fn default_pharmacies() -> Vec<Pharmacy> {
    vec![
        Pharmacy::new("1mg".to_string(), "1mg.com".to_string()),
        Pharmacy::new("Apollo Pharmacy".to_string(), "apollopharmacy.in".to_string()),
        Pharmacy::new("Netmeds".to_string(), "netmeds.com".to_string()),
    ]
}

/// Parses `Name=domain;Name=domain`
pub fn parse_pharmacies(raw: &str) -> Result<Vec<Pharmacy>, Error> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, domain) = entry.split_once('=').ok_or_else(|| Error::Config {
                message: format!("PHARMACIES entry '{}' is not Name=domain", entry),
            })?;
            let (name, domain) = (name.trim(), domain.trim().trim_start_matches("www."));
            if name.is_empty() || domain.is_empty() {
                return Err(Error::Config {
                    message: format!("PHARMACIES entry '{}' is incomplete", entry),
                });
            }
            Ok(Pharmacy::new(name.to_string(), domain.to_lowercase()))
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VisionProviderKind {
    Gemini,
    OpenAi,
}

impl FromStr for VisionProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config {
                message: format!("Unknown VISION_PROVIDER '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VisionConfig {
    pub provider: VisionProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    /// Replaces the built-in medicine reading instruction
    pub instruction: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub serper_api_key: Option<String>,
    pub firecrawl_api_key: Option<String>,
    pub pharmacies: Vec<Pharmacy>,
    pub max_links_per_medicine: usize,
}

#[derive(Clone, Debug)]
pub struct ReportsConfig {
    /// S3 bucket for report artifacts; the local directory is used when unset
    pub bucket: Option<String>,
    pub dir: PathBuf,
    pub file_name: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub vision: VisionConfig,
    pub search: SearchConfig,
    pub reports: ReportsConfig,
    pub visitors_table: Option<String>,
    pub prescriptions_bucket: Option<String>,
    pub http_timeout: Duration,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let provider = match var("VISION_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => VisionProviderKind::Gemini,
        };
        let (key_fallback, default_model) = match provider {
            VisionProviderKind::Gemini => ("GEMINI_API_KEY", DEFAULT_GEMINI_MODEL),
            VisionProviderKind::OpenAi => ("OPENAI_API_KEY", DEFAULT_OPENAI_MODEL),
        };

        let vision = VisionConfig {
            provider,
            api_key: var("VISION_API_KEY").or_else(|| var(key_fallback)),
            model: var("VISION_MODEL").unwrap_or(default_model.to_string()),
            base_url: var("VISION_BASE_URL"),
            instruction: var("VISION_INSTRUCTION"),
        };

        let pharmacies = match var("PHARMACIES") {
            Some(raw) => parse_pharmacies(&raw)?,
            None => default_pharmacies(),
        };

        let search = SearchConfig {
            serper_api_key: var("SERPER_API_KEY"),
            firecrawl_api_key: var("FIRECRAWL_API_KEY"),
            pharmacies,
            max_links_per_medicine: parse_number(var("MAX_LINKS_PER_MEDICINE"), "MAX_LINKS_PER_MEDICINE", 3)?,
        };

        let reports = ReportsConfig {
            bucket: var("REPORTS_BUCKET"),
            dir: PathBuf::from(var("REPORTS_DIR").unwrap_or("reports".to_string())),
            file_name: var("REPORT_FILE_NAME").unwrap_or(DEFAULT_REPORT_FILE_NAME.to_string()),
        };

        let timeout_secs = parse_number(var("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(Error::Config {
                message: "HTTP_TIMEOUT_SECS must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            vision,
            search,
            reports,
            visitors_table: var("VISITORS_TABLE"),
            prescriptions_bucket: var("PRESCRIPTIONS_BUCKET"),
            http_timeout: Duration::from_secs(timeout_secs as u64),
            bind_addr: var("BIND_ADDR").unwrap_or("0.0.0.0:3000".to_string()),
        })
    }
}

fn parse_number(raw: Option<String>, key: &str, default: usize) -> Result<usize, Error> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| Error::Config {
            message: format!("{} must be a non-negative integer, got '{}'", key, value),
        }),
        None => Ok(default),
    }
}
