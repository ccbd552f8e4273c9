// src/pipeline.rs - End-to-end scan: crawl, fuzz, analyze, report
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::analysis::{
    enrich_all, reduce_and_cluster, AnalysisService, AnalysisWorkerPool, Evidence, GeminiService, KeyPool,
};
use crate::config::Config;
use crate::context::SessionContext;
use crate::crawler::{CrawlOrchestrator, CrawlOutcome};
use crate::error::{ScoutError, ScoutResult};
use crate::events::{EventSink, ProgressEvent};
use crate::fuzzer::{ActiveFuzzer, FuzzFinding};
use crate::renderer;
use crate::reporting::{
    merge_reports, FullReport, ReportFormat, ReportManager, ReportSynthesizer, VulnerabilityReport,
};

/// Files written for a finished scan
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub report: FullReport,
    pub evidence_path: PathBuf,
    pub report_paths: Vec<PathBuf>,
}

/// Wires the crawler, fuzzer, analysis pool and report manager together
pub struct Scanner {
    config: Config,
    session: SessionContext,
    events: EventSink,
    cancel: CancellationToken,
    service: Option<Arc<dyn AnalysisService>>,
}

impl Scanner {
    pub fn new(config: Config, events: EventSink) -> Self {
        let session = SessionContext::from_config(&config.session);
        Self {
            config,
            session,
            events,
            cancel: CancellationToken::new(),
            service: None,
        }
    }

    /// Use a specific analysis service instead of the configured endpoint
    pub fn with_service(mut self, service: Arc<dyn AnalysisService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Stops crawling and fuzzing cooperatively; analysis is never interrupted mid-call
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn report_manager(&self) -> ReportManager {
        ReportManager::new(self.config.global.data_dir.join("reports"))
    }

    pub async fn crawl(&self, seed: &str) -> ScoutResult<CrawlOutcome> {
        let renderer = renderer::from_config(&self.config).await
            .map_err(|e| ScoutError::UnexpectedError(format!("Failed to start renderer: {}", e)))?;

        let crawler = CrawlOrchestrator::new(
            self.config.crawler.clone(),
            renderer,
            self.session.clone(),
            self.events.clone(),
        )
        .with_stop_handle(self.cancel.clone());

        crawler.crawl(seed, self.config.crawler.max_pages, self.config.crawler.batch_size).await
    }

    /// Probe `urls` with parameters, then the sensitive paths of `origin`
    pub async fn fuzz(&self, urls: &[String], origin: &str) -> ScoutResult<Vec<FuzzFinding>> {
        let fuzzer = ActiveFuzzer::new(&self.config.fuzzer, &self.config.global.user_agent, &self.session, self.events.clone())?
            .with_stop_handle(self.cancel.clone());

        fuzzer.run(urls, origin).await
    }

    fn service(&self) -> ScoutResult<Arc<dyn AnalysisService>> {
        if let Some(service) = &self.service {
            return Ok(Arc::clone(service));
        }

        let timeout = Duration::from_secs(self.config.analysis.request_timeout_secs);
        let service = GeminiService::new(&self.config.analysis.endpoint, timeout)
            .map_err(|e| ScoutError::NetworkError(e.to_string()))?;
        Ok(Arc::new(service))
    }

    /// Reduce, cluster, analyze, merge, enrich and synthesize
    pub async fn analyze(&self, evidence: &Evidence) -> ScoutResult<FullReport> {
        let analysis = &self.config.analysis;
        let keys = KeyPool::new(analysis.api_keys.clone(), Duration::from_secs(analysis.cooldown_secs));
        let pool = AnalysisWorkerPool::new(self.service()?, analysis, self.events.clone());

        let clusters = reduce_and_cluster(evidence, keys.available_count(), analysis);
        info!("Evidence for {} reduced to {} clusters", evidence.target, clusters.len());

        let reports = pool.analyze(clusters, &keys).await?;
        let merged = merge_reports(&reports);
        let vulnerabilities = enrich_all(merged.vulnerabilities);

        let report = ReportSynthesizer::new(&pool, &keys, analysis.full_report)
            .synthesize(&evidence.target, vulnerabilities)
            .await;

        self.events.emit(ProgressEvent::ReportReady(Box::new(VulnerabilityReport::new(
            merged.summary,
            report.vulnerabilities.clone(),
        ))));

        Ok(report)
    }

    /// Persist the evidence bundle and the report in every format
    pub async fn save(&self, report: &FullReport, evidence: &Evidence) -> ScoutResult<(PathBuf, Vec<PathBuf>)> {
        let manager = self.report_manager();
        let evidence_path = manager.save_json(&format!("evidence-{}", report.id), evidence).await?;
        let report_paths = manager.generate_multi_format(report, &[ReportFormat::Json, ReportFormat::Markdown]).await?;
        Ok((evidence_path, report_paths))
    }

    /// Crawl and fuzz only, returning the evidence bundle
    pub async fn gather(&self, seed: &str) -> ScoutResult<Evidence> {
        let seed_url = Url::parse(seed).map_err(|e| ScoutError::InvalidSeed(format!("{}: {}", seed, e)))?;
        let outcome = self.crawl(seed).await?;

        let findings = if self.config.fuzzer.enabled && !self.cancel.is_cancelled() {
            let urls: Vec<String> = outcome.frontier.iter().map(|entry| entry.url.clone()).collect();
            let origin = seed_url.origin().ascii_serialization();
            match self.fuzz(&urls, &origin).await {
                Ok(findings) => findings,
                Err(e) => {
                    warn!("Fuzzing failed, continuing without active findings: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Evidence::new(seed_url.as_str(), outcome, findings))
    }

    /// Full pipeline from seed URL to saved report
    pub async fn scan(&self, seed: &str) -> ScoutResult<ScanOutput> {
        let evidence = self.gather(seed).await?;

        let report = match self.analyze(&evidence).await {
            Ok(report) => report,
            Err(e) => {
                // Keep the gathered evidence so analysis can be rerun later
                let saved = self.report_manager().save_json("evidence-unanalyzed", &evidence).await;
                if let Ok(path) = saved {
                    warn!("Analysis failed; evidence kept at {}", path.display());
                }
                return Err(e);
            }
        };

        let (evidence_path, report_paths) = self.save(&report, &evidence).await?;
        info!("Scan of {} complete: {} vulnerabilities", seed, report.statistics.total);

        Ok(ScanOutput { report, evidence_path, report_paths })
    }
}
