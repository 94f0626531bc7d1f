/// Search tool seam
pub mod tools;

/// serper.dev client
pub mod serper;

/// Firecrawl client
pub mod firecrawl;

/// LinkResearcher and findings
pub mod researcher;

pub use firecrawl::FirecrawlSearch;
pub use researcher::{Finding, FindingStatus, Findings, LinkResearcher, PurchaseLink};
pub use serper::SerperSearch;
pub use tools::{SearchHit, SearchTool, ToolCapability};
