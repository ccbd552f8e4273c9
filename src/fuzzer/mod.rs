// src/fuzzer/mod.rs - Active parameter and sensitive-path probing
mod model;
pub mod oracle;
pub mod payloads;

use std::collections::HashSet;
use std::time::Duration;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FuzzerConfig;
use crate::context::SessionContext;
use crate::error::{ScoutError, ScoutResult};
use crate::events::{EventSink, ProgressEvent};
use crate::utils::HttpClient;

pub use model::{kind, Confidence, FuzzFinding};
use oracle::{classify_probe, classify_sensitive};
use payloads::{ProbeCategory, SensitivePath, SENSITIVE_PATHS};

/// Issues injection payloads and path probes against a live target
pub struct ActiveFuzzer {
    client: HttpClient,
    concurrency: usize,
    events: EventSink,
    cancel: CancellationToken,
}

impl ActiveFuzzer {
    pub fn new(config: &FuzzerConfig, user_agent: &str, session: &SessionContext, events: EventSink) -> ScoutResult<Self> {
        // Redirects are not followed so the open-redirect oracle sees the 3xx itself
        let client = HttpClient::new(user_agent, Duration::from_secs(config.request_timeout_secs), false)
            .map_err(|e| ScoutError::NetworkError(e.to_string()))?
            .with_session(session);

        Ok(Self {
            client,
            concurrency: config.concurrency.max(1),
            events,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_stop_handle(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops probing between requests when cancelled
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Probe every query parameter of `url` with each applicable payload family
    pub async fn fuzz_parameters(&self, url: &str) -> ScoutResult<Vec<FuzzFinding>> {
        let target = Url::parse(url).map_err(|e| ScoutError::InvalidInput(format!("{}: {}", url, e)))?;

        let mut parameters: Vec<String> = Vec::new();
        for (name, _) in target.query_pairs() {
            if !parameters.iter().any(|p| p == name.as_ref()) {
                parameters.push(name.into_owned());
            }
        }

        if parameters.is_empty() {
            debug!("{} has no query parameters to fuzz", url);
            return Ok(Vec::new());
        }

        info!("Fuzzing {} parameters on {}", parameters.len(), url);

        // Parameters run concurrently; each parameter walks the families in order
        let mut hits: Vec<(usize, Vec<FuzzFinding>)> = stream::iter(parameters.iter().enumerate())
            .map(|(index, name)| {
                let target = &target;
                async move {
                    let mut found = Vec::new();
                    for category in ProbeCategory::ORDER.iter().filter(|c| c.applies_to(name)) {
                        if let Some(finding) = self.probe_parameter(target, name, *category).await {
                            found.push(finding);
                        }
                    }
                    (index, found)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        hits.sort_by_key(|(index, _)| *index);
        Ok(hits.into_iter().flat_map(|(_, found)| found).collect())
    }

    /// Try one family's payloads on one parameter, stopping at the first hit
    async fn probe_parameter(&self, target: &Url, parameter: &str, category: ProbeCategory) -> Option<FuzzFinding> {
        for payload in category.payloads() {
            if self.cancel.is_cancelled() {
                return None;
            }

            let probe_url = substitute_parameter(target, parameter, payload);
            let response = match self.client.fetch(probe_url.as_str()).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Probe {} failed: {}", probe_url, e);
                    continue;
                }
            };

            if let Some(verdict) = classify_probe(category, payload, &response) {
                let finding = FuzzFinding {
                    url: target.to_string(),
                    parameter: Some(parameter.to_string()),
                    payload: payload.to_string(),
                    vulnerability_type: verdict.vulnerability_type.to_string(),
                    confidence: verdict.confidence,
                    evidence: verdict.evidence,
                    status_code: Some(response.status),
                };
                info!("{} on parameter '{}' of {}", finding.vulnerability_type, parameter, target);
                self.events.emit(ProgressEvent::FuzzFinding(finding.clone()));
                return Some(finding);
            }
        }

        None
    }

    /// Probe the sensitive-path catalog against `base_origin`
    pub async fn check_sensitive_paths(&self, base_origin: &str) -> ScoutResult<Vec<FuzzFinding>> {
        let origin = Url::parse(base_origin)
            .map_err(|e| ScoutError::InvalidInput(format!("{}: {}", base_origin, e)))?;

        info!("Probing {} sensitive paths on {}", SENSITIVE_PATHS.len(), origin.origin().ascii_serialization());

        let mut hits: Vec<(usize, FuzzFinding)> = stream::iter(SENSITIVE_PATHS.iter().enumerate())
            .map(|(index, path)| {
                let origin = &origin;
                async move {
                    self.probe_path(origin, path).await.map(|finding| (index, finding))
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        hits.sort_by_key(|(index, _)| *index);
        Ok(hits.into_iter().map(|(_, finding)| finding).collect())
    }

    async fn probe_path(&self, origin: &Url, path: &SensitivePath) -> Option<FuzzFinding> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let probe_url = origin.join(path.path).ok()?;
        let response = match self.client.fetch(probe_url.as_str()).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Path probe {} failed: {}", probe_url, e);
                return None;
            }
        };

        let verdict = classify_sensitive(path, &response)?;
        let finding = FuzzFinding {
            url: probe_url.to_string(),
            parameter: None,
            payload: path.path.to_string(),
            vulnerability_type: verdict.vulnerability_type.to_string(),
            confidence: verdict.confidence,
            evidence: verdict.evidence,
            status_code: Some(response.status),
        };
        info!("{} at {}", finding.vulnerability_type, probe_url);
        self.events.emit(ProgressEvent::FuzzFinding(finding.clone()));
        Some(finding)
    }

    /// Fuzz every distinct parameterized URL, then the sensitive paths of `origin`.
    /// Publishes a completion event when done.
    pub async fn run(&self, urls: &[String], origin: &str) -> ScoutResult<Vec<FuzzFinding>> {
        let mut findings = Vec::new();

        for url in select_targets(urls) {
            if self.cancel.is_cancelled() {
                warn!("Fuzzing stopped before {}", url);
                break;
            }
            match self.fuzz_parameters(&url).await {
                Ok(mut hits) => findings.append(&mut hits),
                Err(e) => warn!("Skipping {}: {}", url, e),
            }
        }

        if !self.cancel.is_cancelled() {
            findings.extend(self.check_sensitive_paths(origin).await?);
        }

        info!("Fuzzing finished with {} findings", findings.len());
        self.events.emit(ProgressEvent::FuzzCompleted { findings: findings.len() });

        Ok(findings)
    }
}

/// URL with one query parameter's value replaced, everything else untouched
pub fn substitute_parameter(target: &Url, parameter: &str, payload: &str) -> Url {
    let pairs: Vec<(String, String)> = target.query_pairs()
        .map(|(k, v)| {
            if k == parameter {
                (k.into_owned(), payload.to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    let mut probe = target.clone();
    probe.set_fragment(None);
    probe.query_pairs_mut().clear().extend_pairs(pairs);
    probe
}

/// Distinct parameterized URLs, keyed by path plus sorted parameter names
pub fn select_targets(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for raw in urls {
        let Ok(url) = Url::parse(raw) else {
            continue;
        };
        if url.query().map_or(true, str::is_empty) {
            continue;
        }

        let mut names: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        names.sort();
        names.dedup();

        let key = format!("{}{}?{}", url.host_str().unwrap_or_default(), url.path(), names.join("&"));
        if seen.insert(key) {
            targets.push(raw.clone());
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_only_target_parameter() {
        let url = Url::parse("https://x.test/search?q=1&page=2#frag").unwrap();
        let probe = substitute_parameter(&url, "q", "<script>");

        let pairs: Vec<(String, String)> = probe.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert_eq!(pairs, vec![
            ("q".to_string(), "<script>".to_string()),
            ("page".to_string(), "2".to_string()),
        ]);
        assert!(probe.fragment().is_none());
    }

    #[test]
    fn test_select_targets_dedups_by_path_and_names() {
        let urls = vec![
            "https://x.test/item?id=1".to_string(),
            "https://x.test/item?id=2".to_string(),
            "https://x.test/item?id=3&sort=asc".to_string(),
            "https://x.test/about".to_string(),
            "https://x.test/list?".to_string(),
        ];

        assert_eq!(select_targets(&urls), vec![
            "https://x.test/item?id=1".to_string(),
            "https://x.test/item?id=3&sort=asc".to_string(),
        ]);
    }
}
