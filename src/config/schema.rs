use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    pub crawler: CrawlerConfig,
    pub fuzzer: FuzzerConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
    pub user_agent: String,
}

/// Which page acquisition backend to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Http,
    Chromium,
}

/// Crawl orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub max_pages: usize,
    pub batch_size: usize,
    pub max_path_visits: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    pub navigation_timeout_secs: u64,
    pub extraction_timeout_secs: u64,
    pub batch_delay_ms: u64,
    pub renderer: RendererKind,
}

impl CrawlerConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

/// Active probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzerConfig {
    pub enabled: bool,
    pub concurrency: usize,
    pub request_timeout_secs: u64,
}

/// Evidence caps applied before clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionCaps {
    pub max_crawl_results: usize,
    pub max_links_per_result: usize,
    pub max_api_calls: usize,
    pub max_cookies: usize,
    pub max_emails: usize,
    pub max_domains: usize,
    pub max_assets_per_category: usize,
    pub max_fuzz_findings_per_cluster: usize,
    pub context_sample_size: usize,
}

/// External analysis service and worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_keys: Vec<String>,
    pub primary_model: String,
    pub lite_model: String,
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub stagger_ms: u64,
    pub pacing_ms: u64,
    pub default_cluster_size: usize,
    pub max_cluster_tokens: usize,
    pub full_report: bool,
    pub caps: ReductionCaps,
}

/// Session material injected before navigation and probing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub local_storage: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            global: GlobalConfig {
                data_dir: home_dir.join(".vulnscout/data"),
                user_agent: format!("vulnscout/{}", env!("CARGO_PKG_VERSION")),
            },
            crawler: CrawlerConfig {
                max_pages: 50,
                batch_size: 5,
                max_path_visits: 3,
                max_depth: None,
                navigation_timeout_secs: 30,
                extraction_timeout_secs: 10,
                batch_delay_ms: 500,
                renderer: RendererKind::Http,
            },
            fuzzer: FuzzerConfig {
                enabled: true,
                concurrency: 10,
                request_timeout_secs: 10,
            },
            analysis: AnalysisConfig {
                endpoint: "https://generativelanguage.googleapis.com".to_string(),
                api_keys: Vec::new(),
                primary_model: "gemini-2.5-pro".to_string(),
                lite_model: "gemini-2.5-flash".to_string(),
                max_concurrency: 4,
                request_timeout_secs: 120,
                cooldown_secs: 60,
                stagger_ms: 500,
                pacing_ms: 1000,
                default_cluster_size: 5,
                max_cluster_tokens: 30_000,
                full_report: true,
                caps: ReductionCaps {
                    max_crawl_results: 40,
                    max_links_per_result: 20,
                    max_api_calls: 60,
                    max_cookies: 30,
                    max_emails: 20,
                    max_domains: 20,
                    max_assets_per_category: 15,
                    max_fuzz_findings_per_cluster: 10,
                    context_sample_size: 5,
                },
            },
            session: SessionConfig::default(),
        }
    }
}
