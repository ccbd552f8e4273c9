// src/crawler/mod.rs - Bounded-batch breadth-first crawl orchestration
pub mod acquisition;
pub mod extract;
pub mod frontier;
mod model;

use std::sync::Arc;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlerConfig;
use crate::context::SessionContext;
use crate::error::{ScoutError, ScoutResult};
use crate::events::{EventSink, ProgressEvent};
use crate::renderer::Renderer;
use crate::scope_filter::ScopeFilter;

pub use acquisition::PageAcquirer;
pub use frontier::Frontier;
pub use model::{
    AssetCategory, CookieRecord, CrawlAggregate, CrawlOutcome, CrawlResult, CrawlState,
    DetectedForm, FormField, FrontierEntry, ObservedApiCall,
};

/// Owns the frontier and every crawl-wide collection for one run
pub struct CrawlOrchestrator {
    config: CrawlerConfig,
    renderer: Arc<dyn Renderer>,
    session: SessionContext,
    events: EventSink,
    cancel: CancellationToken,
    state: Mutex<CrawlState>,
}

impl CrawlOrchestrator {
    pub fn new(config: CrawlerConfig, renderer: Arc<dyn Renderer>, session: SessionContext, events: EventSink) -> Self {
        Self {
            config,
            renderer,
            session,
            events,
            cancel: CancellationToken::new(),
            state: Mutex::new(CrawlState::Idle),
        }
    }

    /// Share an externally owned stop token
    pub fn with_stop_handle(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that requests a cooperative stop when cancelled
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CrawlState {
        *self.state.lock()
    }

    fn set_state(&self, state: CrawlState) {
        let mut current = self.state.lock();
        if *current != state {
            info!("Crawl state {:?} -> {:?}", *current, state);
            *current = state;
            self.events.emit(ProgressEvent::CrawlState(state));
        }
    }

    /// Crawl from `seed`, visiting at most `max_pages` pages in batches of `batch_size`
    pub async fn crawl(&self, seed: &str, max_pages: usize, batch_size: usize) -> ScoutResult<CrawlOutcome> {
        if batch_size == 0 {
            return Err(ScoutError::InvalidInput("batch size must be at least 1".to_string()));
        }

        let seed_url = Url::parse(seed)
            .map_err(|e| ScoutError::InvalidSeed(format!("{}: {}", seed, e)))?;
        let scope = ScopeFilter::for_seed(&seed_url)?;

        let mut frontier = Frontier::new(scope.clone(), self.config.max_path_visits, self.config.max_depth);
        frontier.enqueue(seed_url.as_str(), 0, None)
            .ok_or_else(|| ScoutError::InvalidSeed(format!("{} cannot be queued", seed)))?;

        let acquirer = PageAcquirer::new(
            Arc::clone(&self.renderer),
            scope,
            self.config.navigation_timeout(),
            self.config.extraction_timeout(),
        );

        info!("Starting crawl of {} (max {} pages, batch {}) with {} renderer",
              seed_url, max_pages, batch_size, self.renderer.name());
        self.set_state(CrawlState::Running);

        let mut results = Vec::new();
        let mut aggregate = CrawlAggregate::default();

        while frontier.has_pending() && frontier.visited_count() < max_pages {
            if self.cancel.is_cancelled() {
                break;
            }

            let limit = batch_size.min(max_pages - frontier.visited_count());
            let batch = frontier.pop_batch(limit);
            if batch.is_empty() {
                break;
            }

            debug!("Dispatching batch of {} pages", batch.len());
            let batch_results = join_all(batch.iter().map(|entry| self.acquire_entry(&acquirer, entry))).await;

            // Frontier mutation happens only after the whole batch has settled
            let mut new_urls = Vec::new();
            for (entry, result) in batch.iter().zip(&batch_results) {
                for link in &result.links {
                    if let Some(url) = frontier.enqueue(link, entry.depth + 1, Some(&entry.url)) {
                        new_urls.push(url);
                    }
                }
            }

            if !new_urls.is_empty() {
                debug!("Discovered {} new URLs", new_urls.len());
                self.events.emit(ProgressEvent::UrlsDiscovered {
                    new_urls,
                    frontier: frontier.pending_urls(),
                });
            }

            for result in batch_results {
                if let Some(error) = &result.error {
                    warn!("Page {} failed: {}", result.url, error);
                }
                aggregate.absorb(&result);
                self.events.emit(ProgressEvent::PageCrawled(Box::new(result.clone())));
                results.push(result);
            }

            if frontier.has_pending() && frontier.visited_count() < max_pages {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(std::time::Duration::from_millis(self.config.batch_delay_ms)) => {}
                }
            }
        }

        let state = if self.cancel.is_cancelled() {
            self.set_state(CrawlState::Stopping);
            CrawlState::Stopped
        } else {
            CrawlState::Completed
        };
        self.set_state(state);

        info!("Crawl finished: {} pages, {} pending, {} domains",
              results.len(), frontier.pending_urls().len(), aggregate.domains.len());

        Ok(CrawlOutcome {
            results,
            frontier: frontier.into_entries(),
            aggregate,
            state,
        })
    }

    async fn acquire_entry(&self, acquirer: &PageAcquirer, entry: &FrontierEntry) -> CrawlResult {
        let result = acquirer.acquire(&entry.url, &self.session, &self.cancel).await;

        // The seed gets one more attempt; losing the root loses the whole crawl
        if entry.parent.is_none() && result.is_failure() && !self.cancel.is_cancelled() {
            warn!("Seed {} failed ({}), retrying once",
                  entry.url, result.error.as_deref().unwrap_or("no response"));
            return acquirer.acquire(&entry.url, &self.session, &self.cancel).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use crate::config::Config;
    use crate::renderer::{BrowsingContext, Navigation, NetworkRecord};

    /// Serves canned HTML per URL; unknown URLs fail navigation
    struct SiteRenderer {
        pages: HashMap<String, String>,
        navigations: Arc<AtomicUsize>,
    }

    struct SiteContext {
        pages: HashMap<String, String>,
        navigations: Arc<AtomicUsize>,
        current: Option<String>,
    }

    #[async_trait]
    impl Renderer for SiteRenderer {
        async fn new_context(&self, _session: &SessionContext, _target: &str) -> Result<Box<dyn BrowsingContext>> {
            Ok(Box::new(SiteContext {
                pages: self.pages.clone(),
                navigations: Arc::clone(&self.navigations),
                current: None,
            }))
        }

        fn active_contexts(&self) -> usize {
            0
        }

        fn name(&self) -> &'static str {
            "site"
        }
    }

    #[async_trait]
    impl BrowsingContext for SiteContext {
        async fn navigate(&mut self, url: &str) -> Result<Navigation> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            let html = self.pages.get(url).cloned().ok_or_else(|| anyhow!("connection refused"))?;
            self.current = Some(html);
            Ok(Navigation { final_url: url.to_string(), status: Some(200), title: None })
        }

        async fn html(&self) -> Result<String> {
            self.current.clone().ok_or_else(|| anyhow!("no document"))
        }

        async fn cookies(&self) -> Result<Vec<CookieRecord>> {
            Ok(Vec::new())
        }

        fn network_log(&self) -> Vec<NetworkRecord> {
            Vec::new()
        }

        fn crashed(&self) -> bool {
            false
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn orchestrator(pages: &[(&str, &str)]) -> (CrawlOrchestrator, Arc<AtomicUsize>) {
        let navigations = Arc::new(AtomicUsize::new(0));
        let renderer = Arc::new(SiteRenderer {
            pages: pages.iter().map(|(u, h)| (u.to_string(), h.to_string())).collect(),
            navigations: Arc::clone(&navigations),
        });
        let mut config = Config::default().crawler;
        config.batch_delay_ms = 0;

        (CrawlOrchestrator::new(config, renderer, SessionContext::new(), EventSink::disabled()), navigations)
    }

    #[tokio::test]
    async fn test_single_page_without_links() {
        let (crawler, _) = orchestrator(&[("https://x.test/", "<html><body>empty</body></html>")]);

        let outcome = crawler.crawl("https://x.test/", 10, 5).await.unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.pending().is_empty());
        assert_eq!(outcome.state, CrawlState::Completed);
    }

    #[tokio::test]
    async fn test_max_pages_bounds_visits() {
        let links: String = (0..20).map(|i| format!(r#"<a href="/p{}">p</a>"#, i)).collect();
        let mut pages = vec![("https://x.test/".to_string(), links)];
        for i in 0..20 {
            pages.push((format!("https://x.test/p{}", i), String::new()));
        }
        let pages: Vec<(&str, &str)> = pages.iter().map(|(u, h)| (u.as_str(), h.as_str())).collect();
        let (crawler, _) = orchestrator(&pages);

        let outcome = crawler.crawl("https://x.test/", 7, 3).await.unwrap();

        assert_eq!(outcome.results.len(), 7);
        assert_eq!(outcome.pending().len(), 14);
    }

    #[tokio::test]
    async fn test_seed_is_retried_once() {
        let (crawler, navigations) = orchestrator(&[]);

        let outcome = crawler.crawl("https://x.test/", 10, 5).await.unwrap();

        assert_eq!(navigations.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].status, 0);
        assert!(outcome.results[0].error.is_some());
    }

    #[tokio::test]
    async fn test_failed_child_is_not_requeued() {
        let (crawler, navigations) = orchestrator(&[("https://x.test/", r#"<a href="/missing">m</a>"#)]);

        let outcome = crawler.crawl("https://x.test/", 10, 5).await.unwrap();

        assert_eq!(navigations.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[1].is_failure());
    }

    #[tokio::test]
    async fn test_stop_before_first_batch() {
        let (crawler, navigations) = orchestrator(&[("https://x.test/", "")]);
        crawler.stop_handle().cancel();

        let outcome = crawler.crawl("https://x.test/", 10, 5).await.unwrap();

        assert_eq!(navigations.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.state, CrawlState::Stopped);
        assert_eq!(crawler.state(), CrawlState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_seed_rejected_before_work() {
        let (crawler, navigations) = orchestrator(&[]);

        assert!(matches!(crawler.crawl("not a url", 10, 5).await, Err(ScoutError::InvalidSeed(_))));
        assert!(matches!(crawler.crawl("ftp://x.test/", 10, 5).await, Err(ScoutError::InvalidSeed(_))));
        assert_eq!(navigations.load(Ordering::SeqCst), 0);
        assert_eq!(crawler.state(), CrawlState::Idle);
    }
}
