// src/reporting/generator.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::Serialize;
use tracing::{info, debug, warn};

use crate::error::{ScoutError, ScoutResult};
use super::model::FullReport;
use super::formats::{ReportFormat, ReportGenerator};
use super::formats::json::JsonReportGenerator;
use super::formats::markdown::MarkdownReportGenerator;

/// Report generation manager
pub struct ReportManager {
    generators: HashMap<ReportFormat, Box<dyn ReportGenerator + Send + Sync>>,
    report_dir: PathBuf,
}

impl ReportManager {
    /// Create a manager writing into `report_dir`, with JSON and Markdown registered
    pub fn new(report_dir: PathBuf) -> Self {
        let mut manager = Self {
            generators: HashMap::new(),
            report_dir,
        };
        manager.register_generator(Box::new(JsonReportGenerator::new()));
        manager.register_generator(Box::new(MarkdownReportGenerator::new()));
        manager
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Register a new report generator
    pub fn register_generator(&mut self, generator: Box<dyn ReportGenerator + Send + Sync>) {
        let format = generator.supported_format();
        debug!("Registering report generator for format: {:?}", format);
        self.generators.insert(format, generator);
    }

    async fn ensure_dir(&self) -> ScoutResult<()> {
        if !self.report_dir.exists() {
            debug!("Creating report directory: {}", self.report_dir.display());
            tokio::fs::create_dir_all(&self.report_dir).await
                .map_err(|e| ScoutError::FileError {
                    path: self.report_dir.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn file_stem(report: &FullReport) -> String {
        let short_id: String = report.id.chars().take(8).collect();
        format!("{}-{}", report.generated_at.format("%Y%m%d-%H%M%S"), short_id)
    }

    /// Generate a report in a specific format
    pub async fn generate_report(&self, report: &FullReport, format: ReportFormat) -> ScoutResult<PathBuf> {
        self.ensure_dir().await?;

        let generator = self.generators.get(&format)
            .ok_or_else(|| ScoutError::InvalidInput(format!("No generator found for format {:?}", format)))?;

        let output_path = self.report_dir.join(format!("report-{}.{}", Self::file_stem(report), format.extension()));

        info!("Generating report in format {:?} at {}", format, output_path.display());
        generator.generate(report, &output_path).await?;

        Ok(output_path)
    }

    /// Generate a report in multiple formats
    pub async fn generate_multi_format(&self, report: &FullReport, formats: &[ReportFormat]) -> ScoutResult<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for format in formats {
            match self.generate_report(report, *format).await {
                Ok(path) => paths.push(path),
                Err(e) => warn!("Failed to generate report in format {:?}: {}", format, e),
            }
        }

        if paths.is_empty() {
            return Err(ScoutError::UnexpectedError("Failed to generate any reports".to_string()));
        }

        Ok(paths)
    }

    /// Write any serializable bundle (crawl outcome, evidence) next to the reports
    pub async fn save_json<T: Serialize>(&self, name: &str, value: &T) -> ScoutResult<PathBuf> {
        self.ensure_dir().await?;

        let output_path = self.report_dir.join(format!("{}.json", name));
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&output_path, json).await
            .map_err(|e| ScoutError::FileError {
                path: output_path.clone(),
                message: e.to_string(),
            })?;

        info!("Saved {}", output_path.display());
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::reporting::model::{Severity, Statistics, SynthesisStage, Vulnerability};

    fn report() -> FullReport {
        let vulnerabilities = vec![Vulnerability {
            id: "VULN-001".to_string(),
            title: "SQL Injection".to_string(),
            severity: Severity::Critical,
            cwe: Some("CWE-89".to_string()),
            cvss: Some(9.8),
            description: "d".to_string(),
            recommendation: "Use parameterized queries".to_string(),
            references: Vec::new(),
            affected_assets: vec!["https://x.test/item?id=1".to_string()],
            proof: None,
        }];
        FullReport {
            id: "0123456789abcdef".to_string(),
            target: "https://x.test/".to_string(),
            generated_at: Utc::now(),
            executive_summary: "summary".to_string(),
            methodology: "method".to_string(),
            recommendations: vec!["Patch".to_string()],
            statistics: Statistics::from_vulnerabilities(&vulnerabilities),
            vulnerabilities,
            synthesis: SynthesisStage::Local,
        }
    }

    #[tokio::test]
    async fn test_writes_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ReportManager::new(dir.path().join("reports"));

        let paths = manager.generate_multi_format(&report(), &[ReportFormat::Json, ReportFormat::Markdown]).await.unwrap();
        assert_eq!(paths.len(), 2);

        let json: FullReport = serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json.statistics.critical, 1);

        let markdown = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(markdown.contains("### VULN-001 SQL Injection"));
        assert!(markdown.contains("CVSS 9.8"));
    }

    #[tokio::test]
    async fn test_save_json_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ReportManager::new(dir.path().to_path_buf());

        let path = manager.save_json("evidence", &vec!["a", "b"]).await.unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("\"a\""));
    }
}
