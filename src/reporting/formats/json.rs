// src/reporting/formats/json.rs
use std::path::Path;
use async_trait::async_trait;
use anyhow::{Context, Result};

use crate::reporting::model::FullReport;
use crate::reporting::formats::{ReportFormat, ReportGenerator};

/// JSON report generator
#[derive(Default)]
pub struct JsonReportGenerator;

impl JsonReportGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReportGenerator for JsonReportGenerator {
    async fn generate(&self, report: &FullReport, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(output_path, json).await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }

    fn supported_format(&self) -> ReportFormat {
        ReportFormat::Json
    }
}
