// src/utils/http.rs
use std::collections::BTreeMap;
use std::time::Duration;
use anyhow::{Result, Context};
use reqwest::{Client, Response, header, redirect};
use tracing::debug;

use crate::context::SessionContext;

/// Bodies are read up to this many bytes; the rest is discarded
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// An HTTP response with its body read up to [`MAX_BODY_BYTES`]
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Set when the body was cut at the size cap
    pub truncated: bool,
}

impl FetchedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the response looks like an HTML document
    pub fn is_html(&self) -> bool {
        if let Some(content_type) = self.header("content-type") {
            return content_type.to_ascii_lowercase().contains("html");
        }

        let head: String = self.body.trim_start().chars().take(64).collect::<String>().to_ascii_lowercase();
        head.starts_with("<!doctype html") || head.starts_with("<html")
    }
}

/// HTTP client for making requests
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookie_header: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(user_agent: &str, timeout: Duration, follow_redirects: bool) -> Result<Self> {
        let policy = if follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(policy)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            cookie_header: None,
        })
    }

    /// Send the session cookies with every request
    pub fn with_session(mut self, session: &SessionContext) -> Self {
        self.cookie_header = session.cookie_header();
        self
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(cookie) = &self.cookie_header {
            request = request.header(header::COOKIE, cookie);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", url))
    }

    /// GET and read the response, keeping at most [`MAX_BODY_BYTES`] of the body
    pub async fn fetch(&self, url: &str) -> Result<FetchedResponse> {
        let mut response = self.get(url).await?;
        let status = response.status().as_u16();
        let headers = response.headers().iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let mut bytes: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await
            .with_context(|| format!("Failed to read body of {}", url))?
        {
            let room = MAX_BODY_BYTES - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = chunk.len() > room || response.content_length().map_or(false, |len| len as usize > MAX_BODY_BYTES);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        if truncated {
            debug!("Body of {} cut at {} bytes", url, MAX_BODY_BYTES);
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok(FetchedResponse { status, headers, body, truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html_prefers_content_type() {
        let mut response = FetchedResponse {
            status: 200,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: "<html></html>".to_string(),
            truncated: false,
        };
        assert!(!response.is_html());

        response.headers.clear();
        assert!(response.is_html());

        response.body = "DB_PASSWORD=hunter2".to_string();
        assert!(!response.is_html());
    }

    #[tokio::test]
    async fn test_fetch_caps_large_bodies() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/backup.sql"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'x'; 3 * MAX_BODY_BYTES], "application/sql"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
            .mount(&server)
            .await;

        let client = HttpClient::new("vulnscout-test", Duration::from_secs(5), false).unwrap();

        let large = client.fetch(&format!("{}/backup.sql", server.uri())).await.unwrap();
        assert_eq!(large.body.len(), MAX_BODY_BYTES);
        assert!(large.truncated);

        let small = client.fetch(&format!("{}/small", server.uri())).await.unwrap();
        assert_eq!(small.body, "ok");
        assert!(!small.truncated);
    }
}
