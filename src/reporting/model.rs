// src/reporting/model.rs
use std::fmt;
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Finding severity, ordered most severe first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Sort rank; lower is more severe
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    /// Minimum severity a CVSS base score implies, if it implies one
    pub fn floor_for_cvss(cvss: f64) -> Option<Severity> {
        if cvss >= 9.0 {
            Some(Severity::Critical)
        } else if cvss >= 7.0 {
            Some(Severity::High)
        } else {
            None
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        };
        write!(f, "{}", label)
    }
}

/// Evidentiary snippet attached to a finding
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Proof {
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
}

/// A normalized finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub cwe: Option<String>,
    #[serde(default)]
    pub cvss: Option<f64>,
    pub description: String,
    pub recommendation: String,
    #[serde(default)]
    pub references: Vec<String>,
    pub affected_assets: Vec<String>,
    #[serde(default)]
    pub proof: Option<Proof>,
}

/// Severity histogram
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl Statistics {
    pub fn from_vulnerabilities(vulns: &[Vulnerability]) -> Self {
        let mut stats = Statistics::default();
        for vuln in vulns {
            stats.total += 1;
            match vuln.severity {
                Severity::Critical => stats.critical += 1,
                Severity::High => stats.high += 1,
                Severity::Medium => stats.medium += 1,
                Severity::Low => stats.low += 1,
                Severity::Info => stats.info += 1,
            }
        }
        stats
    }
}

/// Analysis output for one cluster, or the merged result of many
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityReport {
    pub summary: String,
    pub vulnerabilities: Vec<Vulnerability>,
    pub statistics: Statistics,
    pub generated_at: DateTime<Utc>,
}

impl VulnerabilityReport {
    pub fn new(summary: impl Into<String>, vulnerabilities: Vec<Vulnerability>) -> Self {
        let statistics = Statistics::from_vulnerabilities(&vulnerabilities);
        Self {
            summary: summary.into(),
            vulnerabilities,
            statistics,
            generated_at: Utc::now(),
        }
    }
}

/// Which synthesis stage produced the narrative sections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStage {
    Full,
    Reduced,
    Local,
}

/// Final report handed to rendering and persisted by the report manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullReport {
    pub id: String,
    pub target: String,
    pub generated_at: DateTime<Utc>,
    pub executive_summary: String,
    pub methodology: String,
    pub recommendations: Vec<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub statistics: Statistics,
    pub synthesis: SynthesisStage,
}
