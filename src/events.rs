// src/events.rs - Typed progress events pushed to whoever is watching a run
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::crawler::{CrawlResult, CrawlState};
use crate::fuzzer::FuzzFinding;
use crate::reporting::VulnerabilityReport;

/// Progress notifications published by the crawler, fuzzer and analysis pool
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    CrawlState(CrawlState),
    PageCrawled(Box<CrawlResult>),
    UrlsDiscovered {
        new_urls: Vec<String>,
        frontier: Vec<String>,
    },
    FuzzFinding(FuzzFinding),
    FuzzCompleted {
        findings: usize,
    },
    QuotaStatus {
        available: usize,
        cooling_down: usize,
        exhausted: bool,
    },
    ClusterAnalyzed {
        cluster_id: usize,
        vulnerabilities: usize,
    },
    ModelDowngraded {
        model: String,
    },
    ReportReady(Box<VulnerabilityReport>),
}

/// Push-only handle for publishing events. A missing or closed receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl EventSink {
    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                trace!("Progress receiver dropped; event discarded");
            }
        }
    }
}
