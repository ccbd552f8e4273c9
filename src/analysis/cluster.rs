// src/analysis/cluster.rs - Evidence reduction and token-bounded clustering
use std::collections::{BTreeMap, HashSet};
use serde::{Serialize, Deserialize};
use tracing::debug;
use url::Url;

use crate::config::AnalysisConfig;
use crate::crawler::{AssetCategory, CookieRecord, CrawlResult, ObservedApiCall};
use crate::fuzzer::FuzzFinding;
use super::Evidence;

const RELEVANT_KEYWORDS: &[&str] = &[
    "admin", "login", "signin", "sign-in", "auth", "dashboard", "account", "register", "password",
];

/// Context shared by every cluster so findings can be cross-referenced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSample {
    pub cookies: Vec<CookieRecord>,
    pub emails: Vec<String>,
    pub domains: Vec<String>,
    pub assets: BTreeMap<AssetCategory, Vec<String>>,
}

/// One unit of analysis work, consumed by exactly one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisCluster {
    pub id: usize,
    pub target: String,
    pub crawl_results: Vec<CrawlResult>,
    pub api_calls: Vec<ObservedApiCall>,
    pub fuzz_findings: Vec<FuzzFinding>,
    pub context: ContextSample,
}

impl AnalysisCluster {
    /// Rough token count of the serialized cluster, four characters per token
    pub fn estimated_tokens(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len() / 4).unwrap_or(usize::MAX)
    }

    fn splittable(&self) -> bool {
        self.crawl_results.len() > 1 || (self.crawl_results.is_empty() && self.api_calls.len() > 1)
    }

    /// Halve the crawl results and API calls, sharing the context
    fn split(self) -> (AnalysisCluster, AnalysisCluster) {
        let AnalysisCluster { id, target, mut crawl_results, mut api_calls, fuzz_findings, context } = self;

        let tail_results = crawl_results.split_off(crawl_results.len().div_ceil(2));
        let tail_calls = api_calls.split_off(api_calls.len().div_ceil(2));
        let (head_findings, tail_findings): (Vec<_>, Vec<_>) = fuzz_findings.into_iter()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);

        let head = AnalysisCluster {
            id,
            target: target.clone(),
            crawl_results,
            api_calls,
            fuzz_findings: head_findings.into_iter().map(|(_, f)| f).collect(),
            context: context.clone(),
        };
        let tail = AnalysisCluster {
            id,
            target,
            crawl_results: tail_results,
            api_calls: tail_calls,
            fuzz_findings: tail_findings.into_iter().map(|(_, f)| f).collect(),
            context,
        };
        (head, tail)
    }
}

/// Evidence after every collection has been capped and deduplicated
#[derive(Debug, Clone, Default)]
pub struct ReducedEvidence {
    pub crawl_results: Vec<CrawlResult>,
    pub api_calls: Vec<ObservedApiCall>,
    pub cookies: Vec<CookieRecord>,
    pub emails: Vec<String>,
    pub domains: Vec<String>,
    pub assets: BTreeMap<AssetCategory, Vec<String>>,
    pub fuzz_findings: Vec<FuzzFinding>,
}

/// Forms weigh most, then an admin or login keyword in the URL or title
pub fn relevance_score(result: &CrawlResult) -> usize {
    let haystack = format!("{} {}", result.url, result.title.as_deref().unwrap_or_default()).to_ascii_lowercase();
    let keyword = if RELEVANT_KEYWORDS.iter().any(|k| haystack.contains(k)) { 5 } else { 0 };
    result.forms.len() * 10 + keyword
}

/// Dedup key for an API call: method, host plus path, sorted parameter names
pub fn api_call_key(call: &ObservedApiCall) -> String {
    let mut names: Vec<String> = call.params.keys().cloned().collect();

    let path = match Url::parse(&call.endpoint) {
        Ok(url) => {
            names.extend(url.query_pairs().map(|(k, _)| k.into_owned()));
            format!("{}{}", url.host_str().unwrap_or_default(), url.path())
        }
        Err(_) => call.endpoint.split('?').next().unwrap_or_default().to_string(),
    };

    names.sort();
    names.dedup();
    format!("{} {}?{}", call.method.to_ascii_uppercase(), path, names.join(","))
}

/// Cap and deduplicate every evidence collection
pub fn reduce(evidence: &Evidence, config: &AnalysisConfig) -> ReducedEvidence {
    let caps = &config.caps;

    let mut api_calls = Vec::new();
    let mut seen_calls = HashSet::new();
    for call in evidence.results.iter().flat_map(|r| r.api_calls.iter()) {
        if api_calls.len() >= caps.max_api_calls {
            break;
        }
        if seen_calls.insert(api_call_key(call)) {
            api_calls.push(call.clone());
        }
    }

    let mut ranked: Vec<&CrawlResult> = evidence.results.iter().filter(|r| !r.is_failure()).collect();
    ranked.sort_by(|a, b| relevance_score(b).cmp(&relevance_score(a)));

    let crawl_results: Vec<CrawlResult> = ranked.into_iter()
        .take(caps.max_crawl_results)
        .map(|result| {
            let mut result = result.clone();
            result.links.truncate(caps.max_links_per_result);
            // Carried once, in the deduplicated list
            result.api_calls.clear();
            result
        })
        .collect();

    let mut cookies: Vec<CookieRecord> = Vec::new();
    let all_cookies = evidence.aggregate.cookies.iter()
        .chain(evidence.results.iter().flat_map(|r| r.cookies.iter()));
    for cookie in all_cookies {
        if cookies.len() >= caps.max_cookies {
            break;
        }
        if !cookies.iter().any(|c| c.name == cookie.name && c.domain == cookie.domain) {
            cookies.push(cookie.clone());
        }
    }

    let emails = dedup_capped(
        evidence.aggregate.emails.iter().chain(evidence.results.iter().flat_map(|r| r.emails.iter())),
        caps.max_emails,
    );
    let domains = dedup_capped(evidence.aggregate.domains.iter(), caps.max_domains);

    let mut assets: BTreeMap<AssetCategory, Vec<String>> = BTreeMap::new();
    let all_assets = evidence.aggregate.assets.iter()
        .chain(evidence.results.iter().flat_map(|r| r.assets.iter()));
    for (category, urls) in all_assets {
        let bucket = assets.entry(*category).or_default();
        for url in urls {
            if bucket.len() >= caps.max_assets_per_category {
                break;
            }
            if !bucket.contains(url) {
                bucket.push(url.clone());
            }
        }
    }

    ReducedEvidence {
        crawl_results,
        api_calls,
        cookies,
        emails,
        domains,
        assets,
        fuzz_findings: evidence.fuzz_findings.clone(),
    }
}

fn dedup_capped<'a>(items: impl Iterator<Item = &'a String>, cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if out.len() >= cap {
            break;
        }
        let item = item.to_ascii_lowercase();
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Crawl results per cluster for the given number of usable keys
pub fn cluster_size(result_count: usize, available_keys: usize, default_size: usize) -> usize {
    if available_keys > 1 {
        result_count.div_ceil(available_keys).clamp(3, 8)
    } else {
        default_size.max(1)
    }
}

/// Reduce the evidence and partition it into token-bounded clusters
pub fn reduce_and_cluster(evidence: &Evidence, available_keys: usize, config: &AnalysisConfig) -> Vec<AnalysisCluster> {
    let reduced = reduce(evidence, config);

    if reduced.crawl_results.is_empty() && reduced.api_calls.is_empty() && reduced.fuzz_findings.is_empty() {
        debug!("No evidence left after reduction");
        return Vec::new();
    }

    let sample_size = config.caps.context_sample_size;
    let context = ContextSample {
        cookies: reduced.cookies.iter().take(sample_size).cloned().collect(),
        emails: reduced.emails.iter().take(sample_size).cloned().collect(),
        domains: reduced.domains.iter().take(sample_size).cloned().collect(),
        assets: reduced.assets.iter()
            .map(|(category, urls)| (*category, urls.iter().take(sample_size).cloned().collect()))
            .collect(),
    };

    let size = cluster_size(reduced.crawl_results.len(), available_keys, config.default_cluster_size);
    let count = reduced.crawl_results.len().div_ceil(size).max(1);
    let calls_per_cluster = reduced.api_calls.len().div_ceil(count).max(1);

    let mut result_chunks = reduced.crawl_results.chunks(size).map(<[CrawlResult]>::to_vec);
    let mut call_chunks = reduced.api_calls.chunks(calls_per_cluster).map(<[ObservedApiCall]>::to_vec);

    let mut clusters: Vec<AnalysisCluster> = (0..count)
        .map(|id| AnalysisCluster {
            id,
            target: evidence.target.clone(),
            crawl_results: result_chunks.next().unwrap_or_default(),
            api_calls: call_chunks.next().unwrap_or_default(),
            fuzz_findings: Vec::new(),
            context: context.clone(),
        })
        .collect();

    let per_cluster = config.caps.max_fuzz_findings_per_cluster;
    for (i, finding) in reduced.fuzz_findings.into_iter().enumerate() {
        let cluster = &mut clusters[i % count];
        if cluster.fuzz_findings.len() < per_cluster {
            cluster.fuzz_findings.push(finding);
        }
    }

    let mut bounded = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        split_to_budget(cluster, config.max_cluster_tokens, &mut bounded);
    }

    for (id, cluster) in bounded.iter_mut().enumerate() {
        cluster.id = id;
    }

    debug!("Built {} clusters (size {}, {} keys)", bounded.len(), size, available_keys);
    bounded
}

fn split_to_budget(cluster: AnalysisCluster, max_tokens: usize, out: &mut Vec<AnalysisCluster>) {
    if cluster.estimated_tokens() <= max_tokens || !cluster.splittable() {
        out.push(cluster);
        return;
    }

    let (head, tail) = cluster.split();
    split_to_budget(head, max_tokens, out);
    split_to_budget(tail, max_tokens, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::{CrawlAggregate, DetectedForm};
    use crate::fuzzer::Confidence;

    fn page(url: &str, forms: usize) -> CrawlResult {
        CrawlResult {
            url: url.to_string(),
            status: 200,
            forms: (0..forms)
                .map(|_| DetectedForm { action: url.to_string(), method: "POST".to_string(), fields: Vec::new() })
                .collect(),
            ..Default::default()
        }
    }

    fn call(endpoint: &str, method: &str, params: &[&str]) -> ObservedApiCall {
        ObservedApiCall {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            params: params.iter().map(|p| (p.to_string(), "1".to_string())).collect(),
            headers: BTreeMap::new(),
            response_status: None,
        }
    }

    fn evidence(results: Vec<CrawlResult>) -> Evidence {
        Evidence {
            target: "https://x.test/".to_string(),
            results,
            aggregate: CrawlAggregate::default(),
            fuzz_findings: Vec::new(),
        }
    }

    #[test]
    fn test_cluster_size_formula() {
        assert_eq!(cluster_size(40, 2, 5), 8);
        assert_eq!(cluster_size(40, 8, 5), 5);
        assert_eq!(cluster_size(4, 4, 5), 3);
        assert_eq!(cluster_size(40, 1, 5), 5);
        assert_eq!(cluster_size(40, 0, 5), 5);
    }

    #[test]
    fn test_relevance_ranks_forms_then_keywords() {
        let plain = page("https://x.test/about", 0);
        let login = page("https://x.test/login", 0);
        let form = page("https://x.test/contact", 1);

        assert!(relevance_score(&form) > relevance_score(&login));
        assert!(relevance_score(&login) > relevance_score(&plain));

        let reduced = reduce(&evidence(vec![plain, login, form]), &Config::default().analysis);
        let order: Vec<&str> = reduced.crawl_results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, vec!["https://x.test/contact", "https://x.test/login", "https://x.test/about"]);
    }

    #[test]
    fn test_api_calls_dedup_on_method_path_and_params() {
        let mut first = page("https://x.test/", 0);
        first.api_calls = vec![
            call("https://x.test/api/items?id=1", "GET", &[]),
            call("https://x.test/api/items?id=2", "GET", &[]),
            call("https://x.test/api/items?id=2", "POST", &[]),
            call("https://x.test/api/items?id=2&page=1", "GET", &[]),
        ];

        let reduced = reduce(&evidence(vec![first]), &Config::default().analysis);

        assert_eq!(reduced.api_calls.len(), 3);
        assert!(reduced.crawl_results[0].api_calls.is_empty());
    }

    #[test]
    fn test_failed_pages_and_caps() {
        let mut config = Config::default().analysis;
        config.caps.max_crawl_results = 2;
        config.caps.max_links_per_result = 1;

        let mut linked = page("https://x.test/a", 0);
        linked.links = vec!["https://x.test/1".to_string(), "https://x.test/2".to_string()];
        let results = vec![
            linked,
            page("https://x.test/b", 0),
            page("https://x.test/c", 0),
            CrawlResult::failed("https://x.test/d", "timeout"),
        ];

        let reduced = reduce(&evidence(results), &config);
        assert_eq!(reduced.crawl_results.len(), 2);
        assert_eq!(reduced.crawl_results[0].links.len(), 1);
        assert!(reduced.crawl_results.iter().all(|r| !r.is_failure()));
    }

    #[test]
    fn test_clusters_partition_results_and_share_context() {
        let results: Vec<CrawlResult> = (0..10).map(|i| page(&format!("https://x.test/p{}", i), 0)).collect();
        let mut bundle = evidence(results);
        bundle.aggregate.emails = vec!["a@x.test".to_string(), "b@x.test".to_string()];
        bundle.fuzz_findings = (0..3).map(|i| FuzzFinding {
            url: format!("https://x.test/s?q={}", i),
            parameter: Some("q".to_string()),
            payload: "'".to_string(),
            vulnerability_type: "SQL Injection (Active Probe)".to_string(),
            confidence: Confidence::High,
            evidence: String::new(),
            status_code: Some(500),
        }).collect();

        let clusters = reduce_and_cluster(&bundle, 2, &Config::default().analysis);

        // ceil(10 / 2) = 5 per cluster
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.iter().map(|c| c.crawl_results.len()).sum::<usize>(), 10);
        assert_eq!(clusters.iter().map(|c| c.fuzz_findings.len()).sum::<usize>(), 3);
        assert!(clusters.iter().all(|c| c.context.emails.len() == 2));
        assert_eq!(clusters.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_oversized_cluster_is_split() {
        let mut config = Config::default().analysis;
        config.max_cluster_tokens = 200;

        let results: Vec<CrawlResult> = (0..4)
            .map(|i| {
                let mut p = page(&format!("https://x.test/p{}", i), 0);
                p.title = Some("x".repeat(400));
                p
            })
            .collect();

        let clusters = reduce_and_cluster(&evidence(results), 1, &config);

        assert_eq!(clusters.len(), 4);
        assert!(clusters.iter().all(|c| c.crawl_results.len() == 1));
    }

    #[test]
    fn test_no_evidence_no_clusters() {
        assert!(reduce_and_cluster(&evidence(Vec::new()), 3, &Config::default().analysis).is_empty());
    }
}
