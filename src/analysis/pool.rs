// src/analysis/pool.rs - Concurrent cluster analysis over a shared key pool
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::events::{EventSink, ProgressEvent};
use crate::reporting::VulnerabilityReport;
use super::cluster::AnalysisCluster;
use super::keys::KeyPool;
use super::parser::parse_report;
use super::prompt::cluster_prompt;
use super::service::{AnalysisService, ServiceError};

/// Wait before re-checking the pool when every usable key is leased by a sibling worker
const LEASE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Fans clusters out over at most one worker per available key
pub struct AnalysisWorkerPool {
    service: Arc<dyn AnalysisService>,
    primary_model: String,
    lite_model: String,
    max_concurrency: usize,
    request_timeout: Duration,
    stagger: Duration,
    pacing: Duration,
    downgraded: AtomicBool,
    events: EventSink,
}

struct WorkQueue {
    clusters: Mutex<VecDeque<AnalysisCluster>>,
    exhausted: AtomicBool,
}

impl WorkQueue {
    fn pop(&self) -> Option<AnalysisCluster> {
        self.clusters.lock().pop_front()
    }

    fn push_front(&self, cluster: AnalysisCluster) {
        self.clusters.lock().push_front(cluster);
    }
}

impl AnalysisWorkerPool {
    pub fn new(service: Arc<dyn AnalysisService>, config: &AnalysisConfig, events: EventSink) -> Self {
        Self {
            service,
            primary_model: config.primary_model.clone(),
            lite_model: config.lite_model.clone(),
            max_concurrency: config.max_concurrency.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            stagger: Duration::from_millis(config.stagger_ms),
            pacing: Duration::from_millis(config.pacing_ms),
            downgraded: AtomicBool::new(false),
            events,
        }
    }

    /// Model used for the next call; switches to the lite tier once downgraded
    pub fn current_model(&self) -> &str {
        if self.is_downgraded() {
            &self.lite_model
        } else {
            &self.primary_model
        }
    }

    pub fn is_downgraded(&self) -> bool {
        self.downgraded.load(Ordering::SeqCst)
    }

    /// Downgrade is one-way for the run
    pub fn downgrade(&self) {
        if !self.downgraded.swap(true, Ordering::SeqCst) {
            warn!("Payload too large for {}, switching to {}", self.primary_model, self.lite_model);
            self.events.emit(ProgressEvent::ModelDowngraded { model: self.lite_model.clone() });
        }
    }

    /// Call the service under the request timeout
    pub async fn call(&self, api_key: &str, prompt: &str) -> Result<String, ServiceError> {
        let model = self.current_model().to_string();
        match tokio::time::timeout(self.request_timeout, self.service.generate(api_key, &model, prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout),
        }
    }

    fn publish_quota(&self, keys: &KeyPool, exhausted: bool) {
        let status = keys.status();
        self.events.emit(ProgressEvent::QuotaStatus {
            available: status.available,
            cooling_down: status.cooling_down,
            exhausted,
        });
    }

    /// Analyze every cluster, returning one report per cluster that succeeded.
    /// Fails with `QuotaExhausted` when no key can be leased before any work, or when
    /// every key ended up cooling down and no cluster succeeded.
    pub async fn analyze(&self, clusters: Vec<AnalysisCluster>, keys: &KeyPool) -> ScoutResult<Vec<VulnerabilityReport>> {
        if clusters.is_empty() {
            return Ok(Vec::new());
        }

        let available = keys.available_count();
        if available == 0 {
            error!("No analysis keys available ({} configured)", keys.len());
            self.publish_quota(keys, true);
            return Err(ScoutError::QuotaExhausted);
        }

        let total = clusters.len();
        let workers = available.min(total).min(self.max_concurrency);
        info!("Analyzing {} clusters with {} workers ({} keys available)", total, workers, available);

        let queue = WorkQueue {
            clusters: Mutex::new(clusters.into()),
            exhausted: AtomicBool::new(false),
        };

        let outputs = join_all((0..workers).map(|worker| self.worker(worker, &queue, keys))).await;

        let mut reports: Vec<(usize, VulnerabilityReport)> = outputs.into_iter().flatten().collect();
        reports.sort_by_key(|(id, _)| *id);

        info!("Analysis finished: {}/{} clusters succeeded", reports.len(), total);

        if reports.is_empty() && queue.exhausted.load(Ordering::SeqCst) {
            return Err(ScoutError::QuotaExhausted);
        }

        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }

    async fn worker(&self, worker: usize, queue: &WorkQueue, keys: &KeyPool) -> Vec<(usize, VulnerabilityReport)> {
        let mut reports = Vec::new();

        if worker > 0 {
            tokio::time::sleep(self.stagger * worker as u32).await;
        }

        while !queue.exhausted.load(Ordering::SeqCst) {
            let Some(cluster) = queue.pop() else {
                break;
            };

            let Some(key) = keys.lease() else {
                if keys.exhausted() {
                    error!("All analysis keys are cooling down; abandoning remaining clusters");
                    queue.exhausted.store(true, Ordering::SeqCst);
                    self.publish_quota(keys, true);
                    break;
                }
                queue.push_front(cluster);
                tokio::time::sleep(LEASE_RETRY_DELAY).await;
                continue;
            };

            debug!("Worker {} analyzing cluster {} with key #{}", worker, cluster.id, key.index);
            let prompt = cluster_prompt(&cluster);

            match self.call(&key.key, &prompt).await {
                Ok(text) => {
                    keys.release(key.index);
                    match parse_report(&text) {
                        Ok(report) => {
                            info!("Cluster {} yielded {} vulnerabilities", cluster.id, report.vulnerabilities.len());
                            self.events.emit(ProgressEvent::ClusterAnalyzed {
                                cluster_id: cluster.id,
                                vulnerabilities: report.vulnerabilities.len(),
                            });
                            reports.push((cluster.id, report));
                        }
                        Err(e) => warn!("Dropping cluster {}: {}", cluster.id, e),
                    }
                    tokio::time::sleep(self.pacing).await;
                }
                Err(ServiceError::RateLimited(message)) => {
                    warn!("Dropping cluster {}: {}", cluster.id, ScoutError::RateLimitExceeded { key_index: key.index });
                    debug!("Rate limit detail: {}", message);
                    keys.cooldown(key.index);
                    self.publish_quota(keys, false);
                }
                Err(ServiceError::PayloadTooLarge(_)) => {
                    keys.release(key.index);
                    warn!("Dropping cluster {}: {}", cluster.id, ScoutError::PayloadTooLarge);
                    self.downgrade();
                }
                Err(e) => {
                    keys.release(key.index);
                    warn!("Dropping cluster {}: {}", cluster.id, e);
                }
            }
        }

        reports
    }
}
