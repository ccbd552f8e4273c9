// src/renderer/chromium.rs - Headless Chromium backend over the DevTools protocol
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::inspector::{self, EventTargetCrashed};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::crawler::CookieRecord;
use super::{header_map_from_json, BrowsingContext, Navigation, NetworkRecord, Renderer};

/// Renderer backed by one headless Chromium process
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    active: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch headless Chromium
    pub async fn launch(user_agent: &str) -> Result<Self> {
        let config = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", user_agent))
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    async fn open_page(&self, context_id: &BrowserContextId, session: &SessionContext, target: &str) -> Result<Page> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow!("invalid target params: {}", e))?;

        let page = self.browser.new_page(params).await
            .context("failed to create page")?;

        if !session.cookies.is_empty() {
            let mut cookies = Vec::with_capacity(session.cookies.len());
            for (name, value) in &session.cookies {
                let cookie = CookieParam::builder()
                    .name(name.clone())
                    .value(value.clone())
                    .url(target.to_string())
                    .build()
                    .map_err(|e| anyhow!("invalid cookie {}: {}", name, e))?;
                cookies.push(cookie);
            }
            page.set_cookies(cookies).await.context("failed to set session cookies")?;
        }

        if let Some(script) = session.local_storage_script() {
            page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await
                .context("failed to seed local storage")?;
        }

        Ok(page)
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, session: &SessionContext, target: &str) -> Result<Box<dyn BrowsingContext>> {
        let context_id = self.browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?
            .result
            .browser_context_id;

        let page = match self.open_page(&context_id, session, target).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(dispose_err) = self.browser.execute(DisposeBrowserContextParams::new(context_id)).await {
                    warn!("Failed to dispose browser context: {}", dispose_err);
                }
                return Err(e);
            }
        };

        self.active.fetch_add(1, Ordering::Relaxed);
        let mut context = Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id,
            page: Some(page),
            network: Arc::new(Mutex::new(Vec::new())),
            crashed: Arc::new(AtomicBool::new(false)),
            listeners: Vec::new(),
            active: Arc::clone(&self.active),
        });

        if let Err(e) = context.attach_listeners().await {
            if let Err(close_err) = context.close().await {
                warn!("Failed to release browser context: {}", close_err);
            }
            return Err(e);
        }

        Ok(context)
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

struct ChromiumContext {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    page: Option<Page>,
    network: Arc<Mutex<Vec<NetworkRecord>>>,
    crashed: Arc<AtomicBool>,
    listeners: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or_else(|| anyhow!("page already closed"))
    }

    /// Start collectors for network traffic and renderer crashes
    async fn attach_listeners(&mut self) -> Result<()> {
        let page = self.page()?.clone();

        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let log = Arc::clone(&self.network);
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let request_headers = serde_json::to_value(&event.request.headers)
                    .map(|v| header_map_from_json(&v))
                    .unwrap_or_default();
                log.lock().push(NetworkRecord {
                    request_id: event.request_id.inner().clone(),
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    document: matches!(event.r#type, Some(ResourceType::Document)),
                    request_headers,
                    status: None,
                    response_headers: Default::default(),
                });
            }
        }));

        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let log = Arc::clone(&self.network);
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let response_headers = serde_json::to_value(&event.response.headers)
                    .map(|v| header_map_from_json(&v))
                    .unwrap_or_default();
                let mut log = log.lock();
                if let Some(record) = log.iter_mut()
                    .rev()
                    .find(|r| r.request_id == *event.request_id.inner() && r.status.is_none())
                {
                    record.status = u16::try_from(event.response.status).ok();
                    record.response_headers = response_headers;
                }
            }
        }));

        if let Err(e) = page.execute(inspector::EnableParams::default()).await {
            debug!("Inspector domain unavailable, crash detection limited: {}", e);
        }
        let mut crashes = page.event_listener::<EventTargetCrashed>().await?;
        let flag = Arc::clone(&self.crashed);
        self.listeners.push(tokio::spawn(async move {
            if crashes.next().await.is_some() {
                flag.store(true, Ordering::SeqCst);
            }
        }));

        Ok(())
    }
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    async fn navigate(&mut self, url: &str) -> Result<Navigation> {
        let page = self.page()?;
        page.goto(url).await.with_context(|| format!("navigation to {} failed", url))?;

        let final_url = page.url().await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        let title = page.get_title().await.ok().flatten();

        Ok(Navigation {
            final_url,
            status: super::document_status(&self.network.lock()),
            title,
        })
    }

    async fn html(&self) -> Result<String> {
        self.page()?.content().await.context("failed to read page content")
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let cookies = self.page()?.get_cookies().await.context("failed to read cookies")?;

        Ok(cookies.into_iter().map(|c| CookieRecord {
            name: c.name,
            value: c.value,
            domain: c.domain.trim_start_matches('.').to_ascii_lowercase(),
            path: c.path,
            secure: c.secure,
            http_only: c.http_only,
            same_site: c.same_site.map(|s| format!("{:?}", s)),
            expires: if c.session { None } else { Some(format!("{}", c.expires)) },
        }).collect())
    }

    fn network_log(&self) -> Vec<NetworkRecord> {
        self.network.lock().clone()
    }

    fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        for listener in &self.listeners {
            listener.abort();
        }
        self.active.fetch_sub(1, Ordering::Relaxed);

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed (renderer may have crashed): {}", e);
            }
        }

        self.browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .context("failed to dispose browser context")?;

        Ok(())
    }
}
