// src/renderer/mod.rs - Browsing backends the page acquirer drives
mod chromium;
mod http;

use std::collections::BTreeMap;
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::config::{Config, RendererKind};
use crate::context::SessionContext;
use crate::crawler::CookieRecord;

pub use chromium::ChromiumRenderer;
pub use http::{HttpRenderer, parse_set_cookie};

/// What a completed navigation observed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Navigation {
    pub final_url: String,
    pub status: Option<u16>,
    pub title: Option<String>,
}

/// One request seen on the network layer, with its response once it arrives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub document: bool,
    pub request_headers: BTreeMap<String, String>,
    pub status: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
}

/// A browser engine that hands out isolated, disposable contexts
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a fresh context with the session cookies and local storage already applied
    async fn new_context(&self, session: &SessionContext, target: &str) -> Result<Box<dyn BrowsingContext>>;

    /// Number of contexts not yet closed
    fn active_contexts(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// One isolated browsing context; must be closed by its owner on every path
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn navigate(&mut self, url: &str) -> Result<Navigation>;

    async fn html(&self) -> Result<String>;

    async fn cookies(&self) -> Result<Vec<CookieRecord>>;

    fn network_log(&self) -> Vec<NetworkRecord>;

    /// Whether the renderer process backing this context died
    fn crashed(&self) -> bool;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Status of the main document response, if one was observed
pub fn document_status(log: &[NetworkRecord]) -> Option<u16> {
    log.iter()
        .filter(|r| r.document)
        .find_map(|r| r.status)
}

/// Build the backend named in the crawler configuration
pub async fn from_config(config: &Config) -> Result<Arc<dyn Renderer>> {
    match config.crawler.renderer {
        RendererKind::Http => Ok(Arc::new(HttpRenderer::new(
            &config.global.user_agent,
            config.crawler.navigation_timeout(),
        ))),
        RendererKind::Chromium => Ok(Arc::new(ChromiumRenderer::launch(&config.global.user_agent).await?)),
    }
}

/// Header map with lowercase names and string values
pub(crate) fn header_map_from_json(value: &serde_json::Value) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    if let Some(object) = value.as_object() {
        for (name, value) in object {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            headers.insert(name.to_ascii_lowercase(), value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_status_ignores_subresources() {
        let log = vec![
            NetworkRecord { url: "https://x.test/app.js".into(), status: Some(404), ..Default::default() },
            NetworkRecord { url: "https://x.test/".into(), document: true, status: Some(200), ..Default::default() },
        ];

        assert_eq!(document_status(&log), Some(200));
        assert_eq!(document_status(&log[..1]), None);
    }

    #[test]
    fn test_header_map_lowercases_names() {
        let headers = header_map_from_json(&serde_json::json!({"Content-Type": "text/html", "X-Count": 3}));

        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(headers.get("x-count").map(String::as_str), Some("3"));
    }
}
