use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use super::orchestrator::Workflow;
use crate::{
    config::{Config, VisionProviderKind},
    errors::Error,
    extraction::{GeminiVision, ImageExtractor, OpenAiVision, VisionService},
    reports::{FsReportStore, ReportCompiler, ReportStore, S3ReportStore},
    research::{FirecrawlSearch, LinkResearcher, SearchTool, SerperSearch},
};

pub fn init(config: &Config, store: Arc<dyn ReportStore>) -> Result<Arc<Workflow>, Error> {
    let client = init_http_client(config)?;

    let extractor = init_extractor(config, client.clone())?;
    let researcher = LinkResearcher::new(init_search_tools(config, client), config.search.pharmacies.clone())
        .with_max_links(config.search.max_links_per_medicine);
    let compiler = ReportCompiler::new(store);

    Ok(Arc::new(Workflow::new(extractor, researcher, compiler)))
}

pub fn init_extractor(config: &Config, client: Client) -> Result<ImageExtractor, Error> {
    let extractor = ImageExtractor::new(init_vision(config, client)?);
    match &config.vision.instruction {
        Some(instruction) => {
            info!("Using configured vision instruction");
            Ok(extractor.with_instruction(instruction.as_str()))
        }
        None => Ok(extractor),
    }
}

/// S3 when a reports bucket is configured, the local reports directory otherwise
pub fn init_store(config: &Config, s3: Option<aws_sdk_s3::Client>) -> Result<Arc<dyn ReportStore>, Error> {
    let reports = &config.reports;

    match (&reports.bucket, s3) {
        (Some(bucket), Some(client)) => {
            info!(bucket = %bucket, "Storing reports in S3");
            Ok(Arc::new(S3ReportStore::new(client, bucket, &reports.file_name)))
        }
        (Some(bucket), None) => Err(Error::Config {
            message: format!("REPORTS_BUCKET is set to '{}' but no S3 client is available", bucket),
        }),
        (None, _) => {
            info!(dir = %reports.dir.display(), "Storing reports on the local filesystem");
            Ok(Arc::new(FsReportStore::new(&reports.dir, &reports.file_name)))
        }
    }
}

/// One client for every outbound call, with the request timeout applied
pub fn init_http_client(config: &Config) -> Result<Client, Error> {
    Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("medlinks/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config {
            message: format!("failed to build HTTP client: {}", e),
        })
}

pub fn init_vision(config: &Config, client: Client) -> Result<Arc<dyn VisionService>, Error> {
    let vision = &config.vision;
    let api_key = vision.api_key.clone().ok_or_else(|| Error::Config {
        message: "VISION_API_KEY is required".to_string(),
    })?;

    let service: Arc<dyn VisionService> = match vision.provider {
        VisionProviderKind::Gemini => {
            let gemini = GeminiVision::new(client, api_key, &vision.model);
            match &vision.base_url {
                Some(url) => Arc::new(gemini.with_base_url(url)),
                None => Arc::new(gemini),
            }
        }
        VisionProviderKind::OpenAi => {
            let openai = OpenAiVision::new(client, api_key, &vision.model);
            match &vision.base_url {
                Some(url) => Arc::new(openai.with_base_url(url)),
                None => Arc::new(openai),
            }
        }
    };

    info!(vision = service.name(), model = %vision.model, "Vision service ready");
    Ok(service)
}

/// Every tool with a key configured; an empty list fails at research time
pub fn init_search_tools(config: &Config, client: Client) -> Vec<Arc<dyn SearchTool>> {
    let mut tools: Vec<Arc<dyn SearchTool>> = Vec::new();

    if let Some(key) = &config.search.serper_api_key {
        tools.push(Arc::new(SerperSearch::new(client.clone(), key)));
    }
    if let Some(key) = &config.search.firecrawl_api_key {
        tools.push(Arc::new(FirecrawlSearch::new(client, key)));
    }

    if tools.is_empty() {
        warn!("No search tool configured, set SERPER_API_KEY or FIRECRAWL_API_KEY");
    } else {
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        info!(tools = ?names, "Search tools ready");
    }
    tools
}
