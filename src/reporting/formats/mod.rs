// src/reporting/formats/mod.rs
pub mod json;
pub mod markdown;

use std::path::Path;
use async_trait::async_trait;
use anyhow::Result;
use serde::{Serialize, Deserialize};

use crate::reporting::model::FullReport;

/// Report output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
        }
    }
}

/// Writes a finished report to disk in one format
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, report: &FullReport, output_path: &Path) -> Result<()>;

    fn supported_format(&self) -> ReportFormat;
}
