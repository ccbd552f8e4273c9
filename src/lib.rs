pub mod analysis;
pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod events;
pub mod fuzzer;
pub mod pipeline;
pub mod renderer;
pub mod reporting;
pub mod scope_filter;
pub mod utils;

// Re-export main types for easier access
pub use analysis::{AnalysisWorkerPool, Evidence, KeyPool};
pub use config::Config;
pub use context::SessionContext;
pub use crawler::{CrawlOrchestrator, CrawlOutcome, CrawlResult};
pub use error::{ScoutError, ScoutResult};
pub use events::{EventSink, ProgressEvent};
pub use fuzzer::{ActiveFuzzer, FuzzFinding};
pub use pipeline::Scanner;
pub use reporting::{FullReport, ReportManager, Vulnerability, VulnerabilityReport};
