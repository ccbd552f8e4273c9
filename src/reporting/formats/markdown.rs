// src/reporting/formats/markdown.rs
use std::fmt::Write as _;
use std::path::Path;
use async_trait::async_trait;
use anyhow::{Context, Result};

use crate::reporting::model::{FullReport, Vulnerability};
use crate::reporting::formats::{ReportFormat, ReportGenerator};

/// Markdown report generator
#[derive(Default)]
pub struct MarkdownReportGenerator;

impl MarkdownReportGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Render the whole report as a Markdown document
    pub fn render(&self, report: &FullReport) -> String {
        let mut md = String::new();
        let stats = &report.statistics;

        let _ = writeln!(md, "# Security Assessment: {}\n", report.target);
        let _ = writeln!(md, "- **Report ID:** {}", report.id);
        let _ = writeln!(md, "- **Generated:** {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(md, "- **Narrative:** {:?}\n", report.synthesis);

        let _ = writeln!(md, "## Executive Summary\n\n{}\n", report.executive_summary);

        md.push_str("| Critical | High | Medium | Low | Info | Total |\n");
        md.push_str("|---|---|---|---|---|---|\n");
        let _ = writeln!(md, "| {} | {} | {} | {} | {} | {} |\n",
                         stats.critical, stats.high, stats.medium, stats.low, stats.info, stats.total);

        let _ = writeln!(md, "## Methodology\n\n{}\n", report.methodology);

        if !report.recommendations.is_empty() {
            md.push_str("## Recommendations\n\n");
            for (i, recommendation) in report.recommendations.iter().enumerate() {
                let _ = writeln!(md, "{}. {}", i + 1, recommendation);
            }
            md.push('\n');
        }

        md.push_str("## Findings\n\n");
        if report.vulnerabilities.is_empty() {
            md.push_str("No vulnerabilities were identified.\n");
        }
        for vuln in &report.vulnerabilities {
            render_finding(&mut md, vuln);
        }

        md
    }
}

fn render_finding(md: &mut String, vuln: &Vulnerability) {
    let _ = writeln!(md, "### {} {}\n", vuln.id, vuln.title);
    let _ = write!(md, "- **Severity:** {}", vuln.severity.to_string().to_uppercase());
    if let Some(cvss) = vuln.cvss {
        let _ = write!(md, " (CVSS {:.1})", cvss);
    }
    md.push('\n');
    if let Some(cwe) = &vuln.cwe {
        let _ = writeln!(md, "- **CWE:** {}", cwe);
    }
    md.push('\n');

    let _ = writeln!(md, "{}\n", vuln.description);

    if !vuln.affected_assets.is_empty() {
        md.push_str("**Affected assets**\n\n");
        for asset in &vuln.affected_assets {
            let _ = writeln!(md, "- `{}`", asset);
        }
        md.push('\n');
    }

    if let Some(proof) = &vuln.proof {
        md.push_str("**Proof**\n\n");
        if let Some(parameter) = &proof.parameter {
            let _ = writeln!(md, "- Parameter: `{}`", parameter);
        }
        if let Some(payload) = &proof.payload {
            let _ = writeln!(md, "- Payload: `{}`", payload);
        }
        if let Some(confidence) = &proof.confidence {
            let _ = writeln!(md, "- Confidence: {}", confidence);
        }
        if let Some(request) = &proof.request {
            let _ = writeln!(md, "\n```http\n{}\n```", request);
        }
        if let Some(response) = &proof.response {
            let _ = writeln!(md, "\n```http\n{}\n```", response);
        }
        md.push('\n');
    }

    let _ = writeln!(md, "**Recommendation:** {}\n", vuln.recommendation);

    if !vuln.references.is_empty() {
        md.push_str("**References**\n\n");
        for reference in &vuln.references {
            let _ = writeln!(md, "- <{}>", reference);
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
}

#[async_trait]
impl ReportGenerator for MarkdownReportGenerator {
    async fn generate(&self, report: &FullReport, output_path: &Path) -> Result<()> {
        tokio::fs::write(output_path, self.render(report)).await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }

    fn supported_format(&self) -> ReportFormat {
        ReportFormat::Markdown
    }
}
