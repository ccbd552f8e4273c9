// src/crawler/model.rs
use std::collections::{BTreeMap, HashSet};
use serde::{Serialize, Deserialize};

/// A URL pending or completed in the crawl
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: usize,
    pub parent: Option<String>,
    pub visited: bool,
}

/// One page's extracted evidence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub url: String,
    pub status: u16,
    pub title: Option<String>,
    pub links: Vec<String>,
    pub forms: Vec<DetectedForm>,
    pub api_calls: Vec<ObservedApiCall>,
    pub cookies: Vec<CookieRecord>,
    pub emails: Vec<String>,
    pub assets: BTreeMap<AssetCategory, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrawlResult {
    /// Result for a page whose acquisition failed outright
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status: 0,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == 0 || self.error.is_some()
    }
}

/// An HTML form on a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectedForm {
    pub action: String,
    pub method: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub placeholder: Option<String>,
}

/// A request matching API heuristics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservedApiCall {
    pub endpoint: String,
    pub method: String,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub response_status: Option<u16>,
}

impl ObservedApiCall {
    /// Attach the observed response, once
    pub fn record_response(&mut self, status: u16, headers: BTreeMap<String, String>) {
        if self.response_status.is_none() {
            self.response_status = Some(status);
            self.headers.extend(headers);
        }
    }
}

/// A cookie set by the target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub expires: Option<String>,
}

/// Asset buckets keyed by file extension
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Images,
    Scripts,
    Styles,
    Media,
    Documents,
    Pdfs,
}

impl AssetCategory {
    /// Classify a lowercase file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "bmp" => Some(AssetCategory::Images),
            "js" | "mjs" => Some(AssetCategory::Scripts),
            "css" => Some(AssetCategory::Styles),
            "mp4" | "webm" | "mp3" | "wav" | "ogg" | "mov" | "avi" => Some(AssetCategory::Media),
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" | "csv" | "odt" | "rtf" | "zip" => {
                Some(AssetCategory::Documents)
            }
            "pdf" => Some(AssetCategory::Pdfs),
            _ => None,
        }
    }
}

/// Crawl lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    Idle,
    Running,
    Stopping,
    Stopped,
    Completed,
}

/// Evidence accumulated across the whole crawl
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlAggregate {
    pub domains: Vec<String>,
    pub cookies: Vec<CookieRecord>,
    pub emails: Vec<String>,
    pub assets: BTreeMap<AssetCategory, Vec<String>>,
    #[serde(skip)]
    seen: Option<SeenIndex>,
}

/// Membership sets mirroring the ordered collections
#[derive(Debug, Clone, Default)]
struct SeenIndex {
    domains: HashSet<String>,
    cookies: HashSet<(String, String)>,
    emails: HashSet<String>,
    assets: HashSet<(AssetCategory, String)>,
}

impl SeenIndex {
    fn build(aggregate: &CrawlAggregate) -> Self {
        Self {
            domains: aggregate.domains.iter().cloned().collect(),
            cookies: aggregate.cookies.iter().map(|c| (c.name.clone(), c.domain.clone())).collect(),
            emails: aggregate.emails.iter().cloned().collect(),
            assets: aggregate.assets.iter()
                .flat_map(|(category, urls)| urls.iter().map(move |url| (*category, url.clone())))
                .collect(),
        }
    }
}

impl CrawlAggregate {
    /// Fold one page's evidence in, keeping first-seen order
    pub fn absorb(&mut self, result: &CrawlResult) {
        // Rebuilt lazily so a deserialized aggregate can keep absorbing
        let mut seen = match self.seen.take() {
            Some(seen) => seen,
            None => SeenIndex::build(self),
        };

        let hosts = std::iter::once(result.url.as_str())
            .chain(result.links.iter().map(String::as_str))
            .chain(result.api_calls.iter().map(|c| c.endpoint.as_str()))
            .chain(result.assets.values().flatten().map(String::as_str));

        for raw in hosts {
            if let Some(host) = url::Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) {
                if seen.domains.insert(host.clone()) {
                    self.domains.push(host);
                }
            }
        }

        for cookie in &result.cookies {
            if seen.cookies.insert((cookie.name.clone(), cookie.domain.clone())) {
                self.cookies.push(cookie.clone());
            }
        }

        for email in &result.emails {
            let email = email.to_ascii_lowercase();
            if seen.emails.insert(email.clone()) {
                self.emails.push(email);
            }
        }

        for (category, urls) in &result.assets {
            for url in urls {
                if seen.assets.insert((*category, url.clone())) {
                    self.assets.entry(*category).or_default().push(url.clone());
                }
            }
        }

        self.seen = Some(seen);
    }
}

/// Everything a finished crawl hands back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub results: Vec<CrawlResult>,
    pub frontier: Vec<FrontierEntry>,
    pub aggregate: CrawlAggregate,
    pub state: CrawlState,
}

impl CrawlOutcome {
    /// Entries still waiting to be visited
    pub fn pending(&self) -> Vec<&FrontierEntry> {
        self.frontier.iter().filter(|e| !e.visited).collect()
    }
}
