// src/reporting/mod.rs
mod generator;
mod model;
pub mod formats;
pub mod merge;
pub mod synth;

pub use generator::ReportManager;
pub use model::{
    FullReport, Proof, Severity, Statistics, SynthesisStage, Vulnerability, VulnerabilityReport,
};
pub use formats::{ReportFormat, ReportGenerator};
pub use merge::{merge_reports, merge_vulnerabilities};
pub use synth::ReportSynthesizer;
