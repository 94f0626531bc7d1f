use std::{fmt::Write as _, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::store::ReportStore;
use crate::{
    errors::Error,
    research::{Finding, FindingStatus, Findings},
};

const TITLE: &str = "# Medicine Purchase Links";
const DISCLAIMER: &str = "Links come from web search results. Check the product, strength and \
pack size against your prescription before ordering.";

/// Report returned to the caller, identical to the stored artifact
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CompiledReport {
    pub run_id: String,
    pub content: String,
    pub location: String,
    pub medicine_count: usize,
    pub missing_count: usize,
}

/// Turns research findings into the hyperlinked report artifact
pub struct ReportCompiler {
    store: Arc<dyn ReportStore>,
}

impl ReportCompiler {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    pub async fn compile(&self, run_id: &str, findings: &Findings) -> Result<CompiledReport, Error> {
        let content = render(findings);
        let location = self.store.write(run_id, &content).await?;

        info!(
            run_id,
            location = %location,
            medicines = findings.len(),
            missing = findings.missing(),
            "Report compiled"
        );

        Ok(CompiledReport {
            run_id: run_id.to_string(),
            content,
            location,
            medicine_count: findings.len(),
            missing_count: findings.missing(),
        })
    }
}

/// Markdown report with one table row per finding.
///
/// Output depends only on `findings`, so the same findings always render to
/// the same bytes.
pub fn render(findings: &Findings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", TITLE);
    let _ = writeln!(
        out,
        "{} searched, {} without a purchase link.\n",
        plural(findings.len(), "medicine"),
        findings.missing()
    );

    out.push_str("| # | Medicine | Purchase links | Status |\n");
    out.push_str("| --- | --- | --- | --- |\n");
    for (index, finding) in findings.entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            index + 1,
            medicine_cell(finding),
            links_cell(finding),
            status_cell(finding)
        );
    }

    if !findings.limitations.is_empty() {
        out.push_str("\n## Limitations\n\n");
        for note in &findings.limitations {
            let _ = writeln!(out, "- {}", escape_text(note));
        }
    }

    let _ = write!(out, "\n_{}_\n", DISCLAIMER);
    out
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("1 {}", word)
    } else {
        format!("{} {}s", count, word)
    }
}

fn medicine_cell(finding: &Finding) -> String {
    let medicine = &finding.medicine;
    match &medicine.normalized {
        Some(normalized) => format!(
            "{} (searched as {})",
            escape_text(&medicine.name),
            escape_text(normalized)
        ),
        None => escape_text(&medicine.name),
    }
}

fn links_cell(finding: &Finding) -> String {
    if finding.links.is_empty() {
        return "None".to_string();
    }
    finding
        .links
        .iter()
        .map(|link| format!("[{}]({})", escape_text(&link.source), escape_url(&link.url)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_cell(finding: &Finding) -> String {
    match &finding.status {
        FindingStatus::Found => "Found".to_string(),
        FindingStatus::NotFound => "Not found: no purchase link located".to_string(),
        FindingStatus::Unavailable { reason } => format!("Unavailable: {}", escape_text(reason)),
    }
}

/// Keeps free text from breaking table cells or forming links
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '|' | '[' | ']' | '\\' | '*' | '_' | '`' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

/// Keeps a link target inside its markdown parentheses and table cell
fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for ch in url.chars() {
        match ch {
            ' ' => out.push_str("%20"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '|' => out.push_str("%7C"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
