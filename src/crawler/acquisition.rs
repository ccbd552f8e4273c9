// src/crawler/acquisition.rs - Acquire one page in a disposable browsing context
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::context::SessionContext;
use crate::error::ScoutError;
use crate::renderer::{document_status, BrowsingContext, Navigation, Renderer};
use crate::scope_filter::ScopeFilter;
use super::extract::{extract_page, observe_request};
use super::model::CrawlResult;

/// Drives one renderer context per URL and turns whatever it observed into a [`CrawlResult`]
#[derive(Clone)]
pub struct PageAcquirer {
    renderer: Arc<dyn Renderer>,
    scope: ScopeFilter,
    navigation_timeout: Duration,
    extraction_timeout: Duration,
}

impl PageAcquirer {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        scope: ScopeFilter,
        navigation_timeout: Duration,
        extraction_timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            scope,
            navigation_timeout,
            extraction_timeout,
        }
    }

    /// Acquire `url`. Never fails: every failure mode is folded into the returned result.
    /// The browsing context is closed on every exit path.
    pub async fn acquire(&self, url: &str, session: &SessionContext, cancel: &CancellationToken) -> CrawlResult {
        let mut context = match self.renderer.new_context(session, url).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Could not open browsing context for {}: {}", url, e);
                return CrawlResult::failed(url, format!("failed to open browsing context: {}", e));
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Abandoning {} after stop request", url);
                CrawlResult::failed(url, "acquisition abandoned: crawl stopped")
            }
            result = self.drive(&mut *context, url) => result,
        };

        if let Err(e) = context.close().await {
            warn!("Failed to release browsing context for {}: {}", url, e);
        }

        result
    }

    async fn drive(&self, context: &mut dyn BrowsingContext, url: &str) -> CrawlResult {
        let navigation = match tokio::time::timeout(self.navigation_timeout, context.navigate(url)).await {
            Ok(Ok(navigation)) => navigation,
            Ok(Err(e)) => {
                if context.crashed() {
                    return self.crash_result(url, &e.to_string());
                }
                debug!("Navigation to {} failed: {}", url, e);
                return CrawlResult::failed(url, e.to_string());
            }
            Err(_) => {
                if context.crashed() {
                    return self.crash_result(url, "renderer stopped responding");
                }
                match document_status(&context.network_log()) {
                    // A response arrived but the load never settled: extract what is there
                    Some(status) => Navigation {
                        final_url: url.to_string(),
                        status: Some(status),
                        title: None,
                    },
                    None => {
                        let error = ScoutError::NavigationTimeout {
                            url: url.to_string(),
                            seconds: self.navigation_timeout.as_secs(),
                        };
                        debug!("{}", error);
                        return CrawlResult::failed(url, error.to_string());
                    }
                }
            }
        };

        let mut result = CrawlResult {
            url: url.to_string(),
            status: navigation.status.unwrap_or(0),
            title: navigation.title.clone(),
            ..Default::default()
        };

        let page_url = Url::parse(&navigation.final_url)
            .or_else(|_| Url::parse(url));
        let Ok(page_url) = page_url else {
            result.error = Some(format!("unparseable page URL {}", navigation.final_url));
            return result;
        };

        let extraction = async {
            let html = context.html().await?;
            let cookies = context.cookies().await?;
            anyhow::Ok((html, cookies))
        };

        match tokio::time::timeout(self.extraction_timeout, extraction).await {
            Ok(Ok((html, cookies))) => {
                let page = extract_page(&html, &page_url, &self.scope);
                if result.title.is_none() {
                    result.title = page.title;
                }
                result.links = page.links;
                result.forms = page.forms;
                result.emails = page.emails;
                result.assets = page.assets;
                result.cookies = cookies;
                result.api_calls = context.network_log().into_iter()
                    .filter_map(|record| {
                        let mut call = observe_request(&record.url, &record.method, record.request_headers)?;
                        if let Some(status) = record.status {
                            call.record_response(status, record.response_headers);
                        }
                        Some(call)
                    })
                    .collect();
            }
            Ok(Err(e)) => {
                if context.crashed() {
                    return self.crash_result(url, &e.to_string());
                }
                warn!("Extraction failed on {}: {}", url, e);
            }
            Err(_) => {
                if context.crashed() {
                    return self.crash_result(url, "renderer stopped responding during extraction");
                }
                // Partial success: navigation-derived status and title survive
                warn!("{}", ScoutError::ExtractionTimeout(url.to_string()));
            }
        }

        result
    }

    fn crash_result(&self, url: &str, message: &str) -> CrawlResult {
        let error = ScoutError::RenderCrash {
            url: url.to_string(),
            message: message.to_string(),
        };
        warn!("{}", error);
        CrawlResult::failed(url, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use crate::crawler::CookieRecord;
    use crate::renderer::NetworkRecord;

    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        HangNavigation,
        HangExtraction,
        Crash,
    }

    struct FakeRenderer {
        behavior: Behavior,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    struct FakeContext {
        behavior: Behavior,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_context(&self, _session: &SessionContext, _target: &str) -> Result<Box<dyn BrowsingContext>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext { behavior: self.behavior, closed: Arc::clone(&self.closed) }))
        }

        fn active_contexts(&self) -> usize {
            self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    #[async_trait]
    impl BrowsingContext for FakeContext {
        async fn navigate(&mut self, url: &str) -> Result<Navigation> {
            match self.behavior {
                Behavior::HangNavigation => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                Behavior::Crash => Err(anyhow!("target closed")),
                _ => Ok(Navigation { final_url: url.to_string(), status: Some(200), title: Some("Fake".into()) }),
            }
        }

        async fn html(&self) -> Result<String> {
            if let Behavior::HangExtraction = self.behavior {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(r#"<a href="/next">n</a>"#.to_string())
        }

        async fn cookies(&self) -> Result<Vec<CookieRecord>> {
            Ok(Vec::new())
        }

        fn network_log(&self) -> Vec<NetworkRecord> {
            Vec::new()
        }

        fn crashed(&self) -> bool {
            matches!(self.behavior, Behavior::Crash)
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn acquirer(behavior: Behavior) -> (PageAcquirer, Arc<dyn Renderer>) {
        let renderer: Arc<dyn Renderer> = Arc::new(FakeRenderer {
            behavior,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        });
        let scope = ScopeFilter::for_seed(&Url::parse("https://x.test/").unwrap()).unwrap();
        let acquirer = PageAcquirer::new(
            Arc::clone(&renderer),
            scope,
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        (acquirer, renderer)
    }

    #[tokio::test]
    async fn test_successful_acquisition_extracts_links() {
        let (acquirer, renderer) = acquirer(Behavior::Ok);
        let result = acquirer.acquire("https://x.test/", &SessionContext::new(), &CancellationToken::new()).await;

        assert_eq!(result.status, 200);
        assert_eq!(result.links, vec!["https://x.test/next".to_string()]);
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_navigation_timeout_yields_status_zero_and_releases_context() {
        let (acquirer, renderer) = acquirer(Behavior::HangNavigation);
        let result = acquirer.acquire("https://x.test/", &SessionContext::new(), &CancellationToken::new()).await;

        assert_eq!(result.status, 0);
        assert!(result.title.is_none());
        assert!(result.links.is_empty());
        assert!(result.error.unwrap().contains("Navigation timed out"));
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_extraction_timeout_keeps_navigation_data() {
        let (acquirer, renderer) = acquirer(Behavior::HangExtraction);
        let result = acquirer.acquire("https://x.test/", &SessionContext::new(), &CancellationToken::new()).await;

        assert_eq!(result.status, 200);
        assert_eq!(result.title.as_deref(), Some("Fake"));
        assert!(result.links.is_empty());
        assert!(result.error.is_none());
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_crash_is_error_tagged() {
        let (acquirer, renderer) = acquirer(Behavior::Crash);
        let result = acquirer.acquire("https://x.test/", &SessionContext::new(), &CancellationToken::new()).await;

        assert_eq!(result.status, 0);
        assert!(result.error.unwrap().contains("Renderer crashed"));
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_stop_abandons_in_flight_acquisition() {
        let (acquirer, renderer) = acquirer(Behavior::HangNavigation);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = acquirer.acquire("https://x.test/", &SessionContext::new(), &cancel).await;

        assert!(result.error.unwrap().contains("abandoned"));
        assert_eq!(renderer.active_contexts(), 0);
    }
}
