// src/fuzzer/model.rs
use serde::{Serialize, Deserialize};

/// How sure a probe oracle is about a hit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A confirmed or likely vulnerability from active probing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FuzzFinding {
    pub url: String,
    #[serde(default)]
    pub parameter: Option<String>,
    pub payload: String,
    pub vulnerability_type: String,
    pub confidence: Confidence,
    pub evidence: String,
    pub status_code: Option<u16>,
}

/// Vulnerability type labels the probes emit
pub mod kind {
    pub const SQL_INJECTION: &str = "SQL Injection (Active Probe)";
    pub const REFLECTED_XSS: &str = "Reflected XSS (Active Probe)";
    pub const PATH_TRAVERSAL: &str = "Path Traversal (Active Probe)";
    pub const OPEN_REDIRECT: &str = "Open Redirect (Active Probe)";
    pub const SENSITIVE_FILE: &str = "Sensitive File Exposure";
    pub const INFO_DISCLOSURE: &str = "Information Disclosure";
    pub const PROTECTED_RESOURCE: &str = "Protected Resource Detected";
}
