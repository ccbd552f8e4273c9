// src/scope_filter.rs - Crawl scoping by main domain and per-path visit caps

use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::error::{ScoutError, ScoutResult};

/// Last two dot-separated labels of a hostname, lowercased.
///
/// This is a coarse same-site test: multi-label public suffixes such as
/// `co.uk` collapse every site under them into one "main domain".
pub fn main_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    if labels.len() <= 2 {
        return labels.join(".");
    }

    labels[labels.len() - 2..].join(".")
}

/// Host plus path with query and fragment removed; the unit the revisit cap counts
pub fn normalized_path(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let path = url.path();
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };

    Some(match url.port() {
        Some(port) => format!("{}:{}{}", host, port, path),
        None => format!("{}{}", host, path),
    })
}

/// ScopeFilter decides which discovered URLs belong to the crawl target
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    main_domain: String,
}

impl ScopeFilter {
    /// Create a scope filter anchored on the seed URL's main domain
    pub fn for_seed(seed: &Url) -> ScoutResult<Self> {
        if seed.scheme() != "http" && seed.scheme() != "https" {
            return Err(ScoutError::InvalidSeed(format!("unsupported scheme '{}'", seed.scheme())));
        }

        let host = seed.host_str()
            .ok_or_else(|| ScoutError::InvalidSeed(format!("{} has no host", seed)))?;

        let main_domain = main_domain(host);
        if main_domain.is_empty() {
            return Err(ScoutError::InvalidSeed(format!("malformed domain '{}'", host)));
        }

        debug!("Scope anchored on main domain {}", main_domain);
        Ok(Self { main_domain })
    }

    /// Check if a host shares the seed's main domain
    pub fn is_host_in_scope(&self, host: &str) -> bool {
        main_domain(host) == self.main_domain
    }

    /// Check if a URL is an http(s) URL whose host shares the seed's main domain
    pub fn is_url_in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        match url.host_str() {
            Some(host) => self.is_host_in_scope(host),
            None => false,
        }
    }
}

/// Counts how many times each normalized path has been queued, bounding
/// parameter-trap explosion (`/item?id=1`, `/item?id=2`, ...).
#[derive(Debug, Clone)]
pub struct PathVisitCounter {
    max_visits: usize,
    counts: HashMap<String, usize>,
}

impl PathVisitCounter {
    pub fn new(max_visits: usize) -> Self {
        Self {
            max_visits,
            counts: HashMap::new(),
        }
    }

    /// Whether another URL with this path may still be queued
    pub fn has_capacity(&self, url: &Url) -> bool {
        match normalized_path(url) {
            Some(path) => self.counts.get(&path).copied().unwrap_or(0) < self.max_visits,
            None => false,
        }
    }

    /// Record a queued URL; returns false without counting when the cap is reached
    pub fn record(&mut self, url: &Url) -> bool {
        let Some(path) = normalized_path(url) else {
            return false;
        };

        let count = self.counts.entry(path).or_insert(0);
        if *count >= self.max_visits {
            return false;
        }

        *count += 1;
        true
    }

    pub fn count(&self, url: &Url) -> usize {
        normalized_path(url)
            .and_then(|p| self.counts.get(&p).copied())
            .unwrap_or(0)
    }
}
