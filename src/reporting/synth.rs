// src/reporting/synth.rs - Narrative synthesis with a full, reduced and local fallback chain
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::parser::parse_value;
use crate::analysis::prompt::synthesis_prompt;
use crate::analysis::{AnalysisWorkerPool, KeyPool, ServiceError};
use super::model::{FullReport, Severity, Statistics, SynthesisStage, Vulnerability};

/// Findings kept for the reduced retry
pub const REDUCED_FINDINGS: usize = 5;

const MAX_LOCAL_RECOMMENDATIONS: usize = 10;

const METHODOLOGY: &str = "The target was crawled breadth-first from the seed URL within its main domain, \
    collecting forms, API traffic, cookies, contact addresses and static assets from every page. \
    Query parameters were then actively probed for injection, reflection, traversal and redirect flaws, \
    and well-known sensitive paths were requested on the target origin. The collected evidence was \
    reduced, partitioned into clusters and triaged, and the resulting findings were merged, \
    classified against CWE and scored with CVSS.";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    pub executive_summary: String,
    pub methodology: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

enum Attempt {
    Done(Narrative),
    /// Worth retrying with fewer findings
    Shrink,
    GiveUp,
}

/// Builds the final report, calling the service at most twice
pub struct ReportSynthesizer<'a> {
    pool: &'a AnalysisWorkerPool,
    keys: &'a KeyPool,
    enabled: bool,
}

impl<'a> ReportSynthesizer<'a> {
    pub fn new(pool: &'a AnalysisWorkerPool, keys: &'a KeyPool, enabled: bool) -> Self {
        Self { pool, keys, enabled }
    }

    pub async fn synthesize(&self, target: &str, vulnerabilities: Vec<Vulnerability>) -> FullReport {
        let mut stage = if self.enabled && !vulnerabilities.is_empty() {
            SynthesisStage::Full
        } else {
            SynthesisStage::Local
        };

        let narrative = loop {
            match stage {
                SynthesisStage::Full => match self.attempt(target, &vulnerabilities).await {
                    Attempt::Done(narrative) => break narrative,
                    Attempt::Shrink => {
                        warn!("Full synthesis rejected, retrying with the top {} findings", REDUCED_FINDINGS);
                        stage = SynthesisStage::Reduced;
                    }
                    Attempt::GiveUp => stage = SynthesisStage::Local,
                },
                SynthesisStage::Reduced => {
                    let top: Vec<Vulnerability> = vulnerabilities.iter().take(REDUCED_FINDINGS).cloned().collect();
                    match self.attempt(target, &top).await {
                        Attempt::Done(narrative) => break narrative,
                        Attempt::Shrink | Attempt::GiveUp => stage = SynthesisStage::Local,
                    }
                }
                SynthesisStage::Local => break local_narrative(target, &vulnerabilities),
            }

            if stage == SynthesisStage::Local {
                warn!("Falling back to locally assembled report narrative");
            }
        };

        info!("Report for {} synthesized ({:?})", target, stage);

        let statistics = Statistics::from_vulnerabilities(&vulnerabilities);
        FullReport {
            id: Uuid::new_v4().to_string(),
            target: target.to_string(),
            generated_at: Utc::now(),
            executive_summary: narrative.executive_summary,
            methodology: narrative.methodology,
            recommendations: narrative.recommendations,
            vulnerabilities,
            statistics,
            synthesis: stage,
        }
    }

    async fn attempt(&self, target: &str, vulnerabilities: &[Vulnerability]) -> Attempt {
        let Some(key) = self.keys.lease() else {
            warn!("No analysis key available for synthesis");
            return Attempt::GiveUp;
        };

        let prompt = synthesis_prompt(target, vulnerabilities);
        match self.pool.call(&key.key, &prompt).await {
            Ok(text) => {
                self.keys.release(key.index);
                match parse_value::<Narrative>(&text) {
                    Some(narrative) => Attempt::Done(narrative),
                    None => {
                        warn!("Synthesis output did not contain a narrative");
                        Attempt::GiveUp
                    }
                }
            }
            Err(ServiceError::RateLimited(_)) => {
                self.keys.cooldown(key.index);
                Attempt::Shrink
            }
            Err(ServiceError::PayloadTooLarge(_)) => {
                self.keys.release(key.index);
                Attempt::Shrink
            }
            Err(e) => {
                self.keys.release(key.index);
                warn!("Synthesis call failed: {}", e);
                Attempt::GiveUp
            }
        }
    }
}

/// Narrative assembled from the findings alone
pub fn local_narrative(target: &str, vulnerabilities: &[Vulnerability]) -> Narrative {
    let stats = Statistics::from_vulnerabilities(vulnerabilities);

    let mut executive_summary = format!(
        "Automated assessment of {} identified {} distinct vulnerabilities \
         ({} critical, {} high, {} medium, {} low, {} informational).",
        target, stats.total, stats.critical, stats.high, stats.medium, stats.low, stats.info,
    );

    let urgent: Vec<&str> = vulnerabilities.iter()
        .filter(|v| matches!(v.severity, Severity::Critical | Severity::High))
        .map(|v| v.title.as_str())
        .collect();
    if !urgent.is_empty() {
        executive_summary.push_str(&format!(" Immediate attention is required for: {}.", urgent.join(", ")));
    } else if stats.total == 0 {
        executive_summary.push_str(" No exploitable issues were confirmed within the assessed scope.");
    }

    let mut recommendations: Vec<String> = Vec::new();
    for vuln in vulnerabilities {
        if recommendations.len() >= MAX_LOCAL_RECOMMENDATIONS {
            break;
        }
        let line = format!("[{}] {}: {}", vuln.severity.to_string().to_uppercase(), vuln.title, vuln.recommendation);
        if !recommendations.contains(&line) {
            recommendations.push(line);
        }
    }

    Narrative {
        executive_summary,
        methodology: METHODOLOGY.to_string(),
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use parking_lot::Mutex;
    use crate::analysis::service::MockAnalysisService;
    use crate::config::Config;
    use crate::events::EventSink;

    const NARRATIVE: &str = r#"{"executiveSummary":"e","methodology":"m","recommendations":["patch"]}"#;

    fn findings(n: usize) -> Vec<Vulnerability> {
        (0..n)
            .map(|i| Vulnerability {
                id: String::new(),
                title: format!("Finding {}", i),
                severity: if i == 0 { Severity::Critical } else { Severity::Low },
                cwe: None,
                cvss: None,
                description: "d".to_string(),
                recommendation: "fix".to_string(),
                references: Vec::new(),
                affected_assets: Vec::new(),
                proof: None,
            })
            .collect()
    }

    fn pool(service: MockAnalysisService) -> AnalysisWorkerPool {
        AnalysisWorkerPool::new(Arc::new(service), &Config::default().analysis, EventSink::disabled())
    }

    fn keys(n: usize) -> KeyPool {
        KeyPool::new((0..n).map(|i| format!("key-{}", i)).collect(), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_full_synthesis() {
        let mut service = MockAnalysisService::new();
        service.expect_generate().times(1).returning(|_, _, _| Ok(NARRATIVE.to_string()));
        let pool = pool(service);
        let keys = keys(1);

        let report = ReportSynthesizer::new(&pool, &keys, true).synthesize("https://x.test/", findings(3)).await;

        assert_eq!(report.synthesis, SynthesisStage::Full);
        assert_eq!(report.executive_summary, "e");
        assert_eq!(report.statistics.total, 3);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_reduced() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&prompts);

        let mut service = MockAnalysisService::new();
        service.expect_generate().times(2).returning(move |_, _, prompt| {
            let mut seen = seen.lock();
            seen.push(prompt.to_string());
            if seen.len() == 1 {
                Err(ServiceError::RateLimited("429".to_string()))
            } else {
                Ok(NARRATIVE.to_string())
            }
        });
        let pool = pool(service);
        let keys = keys(2);

        let report = ReportSynthesizer::new(&pool, &keys, true).synthesize("https://x.test/", findings(8)).await;

        assert_eq!(report.synthesis, SynthesisStage::Reduced);
        assert_eq!(report.vulnerabilities.len(), 8);
        let prompts = prompts.lock();
        assert!(prompts[0].contains("Finding 7"));
        assert!(!prompts[1].contains("Finding 7"));
        assert!(prompts[1].contains("Finding 4"));
    }

    #[tokio::test]
    async fn test_two_size_failures_fall_back_locally() {
        let mut service = MockAnalysisService::new();
        service.expect_generate().times(2).returning(|_, _, _| Err(ServiceError::PayloadTooLarge("413".to_string())));
        let pool = pool(service);
        let keys = keys(1);

        let report = ReportSynthesizer::new(&pool, &keys, true).synthesize("https://x.test/", findings(2)).await;

        assert_eq!(report.synthesis, SynthesisStage::Local);
        assert!(report.executive_summary.contains("Finding 0"));
        assert_eq!(report.recommendations[0], "[CRITICAL] Finding 0: fix");
    }

    #[tokio::test]
    async fn test_other_errors_skip_reduced_stage() {
        let mut service = MockAnalysisService::new();
        service.expect_generate().times(1).returning(|_, _, _| Err(ServiceError::Http { status: 500, body: String::new() }));
        let pool = pool(service);
        let keys = keys(2);

        let report = ReportSynthesizer::new(&pool, &keys, true).synthesize("https://x.test/", findings(2)).await;

        assert_eq!(report.synthesis, SynthesisStage::Local);
    }

    #[tokio::test]
    async fn test_disabled_never_calls_service() {
        let mut service = MockAnalysisService::new();
        service.expect_generate().times(0);
        let pool = pool(service);
        let keys = keys(1);

        let report = ReportSynthesizer::new(&pool, &keys, false).synthesize("https://x.test/", findings(1)).await;

        assert_eq!(report.synthesis, SynthesisStage::Local);
        assert_eq!(report.methodology, METHODOLOGY);
    }
}
