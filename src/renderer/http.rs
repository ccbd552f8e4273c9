// src/renderer/http.rs - Plain HTTP backend: one document request per context
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, header};
use scraper::Html;
use tracing::debug;

use crate::context::SessionContext;
use crate::crawler::CookieRecord;
use crate::crawler::extract::extract_title;
use super::{BrowsingContext, Navigation, NetworkRecord, Renderer};

/// Renderer that fetches documents without executing scripts
pub struct HttpRenderer {
    user_agent: String,
    timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl HttpRenderer {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            timeout,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn new_context(&self, session: &SessionContext, _target: &str) -> Result<Box<dyn BrowsingContext>> {
        // A fresh client per context keeps connection and cookie state isolated.
        // Only connecting is bounded here; the acquirer owns the navigation deadline.
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        self.active.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(HttpContext {
            client,
            cookie_header: session.cookie_header(),
            body: None,
            cookies: Vec::new(),
            log: Vec::new(),
            active: Arc::clone(&self.active),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

struct HttpContext {
    client: Client,
    cookie_header: Option<String>,
    body: Option<String>,
    cookies: Vec<CookieRecord>,
    log: Vec<NetworkRecord>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowsingContext for HttpContext {
    async fn navigate(&mut self, url: &str) -> Result<Navigation> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        let mut request_headers = BTreeMap::new();
        if let Some(cookie) = &self.cookie_header {
            request = request.header(header::COOKIE, cookie);
            request_headers.insert("cookie".to_string(), cookie.clone());
        }

        self.log.push(NetworkRecord {
            request_id: format!("http-{}", self.log.len()),
            url: url.to_string(),
            method: "GET".to_string(),
            document: true,
            request_headers,
            ..Default::default()
        });

        let response = request.send().await
            .with_context(|| format!("Failed to GET {}", url))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let response_headers: BTreeMap<String, String> = response.headers().iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let default_domain = final_url.host_str().unwrap_or_default().to_string();
        self.cookies = response.headers().get_all(header::SET_COOKIE).iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| parse_set_cookie(value, &default_domain))
            .collect();

        if let Some(record) = self.log.last_mut() {
            record.status = Some(status);
            record.response_headers = response_headers;
        }

        let body = response.text().await
            .with_context(|| format!("Failed to read body of {}", url))?;
        let title = extract_title(&Html::parse_document(&body));
        self.body = Some(body);

        Ok(Navigation {
            final_url: final_url.to_string(),
            status: Some(status),
            title,
        })
    }

    async fn html(&self) -> Result<String> {
        self.body.clone().ok_or_else(|| anyhow!("No document loaded"))
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        Ok(self.cookies.clone())
    }

    fn network_log(&self) -> Vec<NetworkRecord> {
        self.log.clone()
    }

    fn crashed(&self) -> bool {
        false
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Parse one `Set-Cookie` header value
pub fn parse_set_cookie(raw: &str, default_domain: &str) -> Option<CookieRecord> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = CookieRecord {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        domain: default_domain.to_ascii_lowercase(),
        path: "/".to_string(),
        secure: false,
        http_only: false,
        same_site: None,
        expires: None,
    };

    for attribute in parts {
        let (key, val) = match attribute.trim().split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attribute.trim(), None),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" => {
                if let Some(domain) = val.filter(|d| !d.is_empty()) {
                    cookie.domain = domain.trim_start_matches('.').to_ascii_lowercase();
                }
            }
            "path" => {
                if let Some(path) = val.filter(|p| p.starts_with('/')) {
                    cookie.path = path.to_string();
                }
            }
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "samesite" => cookie.same_site = val.map(str::to_string),
            "expires" => cookie.expires = val.map(str::to_string),
            "max-age" => {
                if cookie.expires.is_none() {
                    cookie.expires = val.map(|v| format!("max-age={}", v));
                }
            }
            _ => {}
        }
    }

    Some(cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie_attributes() {
        let cookie = parse_set_cookie(
            "session=abc123; Path=/app; Domain=.X.test; Secure; HttpOnly; SameSite=Lax",
            "www.x.test",
        ).unwrap();

        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "x.test");
        assert_eq!(cookie.path, "/app");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }

    #[test]
    fn test_parse_set_cookie_defaults_domain() {
        let cookie = parse_set_cookie("theme=dark", "Shop.X.test").unwrap();

        assert_eq!(cookie.domain, "shop.x.test");
        assert_eq!(cookie.path, "/");
        assert!(!cookie.secure);
        assert!(parse_set_cookie("garbage", "x.test").is_none());
    }
}
