// src/analysis/mod.rs - Evidence reduction, clustering and concurrent service-backed analysis
pub mod cluster;
pub mod enrich;
pub mod keys;
pub mod parser;
pub mod pool;
pub mod prompt;
pub mod service;

use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::crawler::{CrawlAggregate, CrawlOutcome, CrawlResult};
use crate::error::{ScoutError, ScoutResult};
use crate::fuzzer::FuzzFinding;

pub use cluster::{reduce_and_cluster, AnalysisCluster};
pub use enrich::{enrich, enrich_all};
pub use keys::{KeyPool, KeyState, LeasedKey};
pub use pool::AnalysisWorkerPool;
pub use service::{AnalysisService, GeminiService, ServiceError};

/// Everything gathered about a target before analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub target: String,
    pub results: Vec<CrawlResult>,
    pub aggregate: CrawlAggregate,
    #[serde(default)]
    pub fuzz_findings: Vec<FuzzFinding>,
}

impl Evidence {
    pub fn new(target: &str, crawl: CrawlOutcome, fuzz_findings: Vec<FuzzFinding>) -> Self {
        Self {
            target: target.to_string(),
            results: crawl.results,
            aggregate: crawl.aggregate,
            fuzz_findings,
        }
    }

    /// Load a bundle previously written by a scan
    pub fn load(path: &Path) -> ScoutResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScoutError::FileError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        serde_json::from_str(&content)
            .map_err(|e| ScoutError::SerializationError(format!("{}: {}", path.display(), e)))
    }
}
