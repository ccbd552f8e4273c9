// src/reporting/merge.rs - Combine per-cluster reports into one
use std::collections::HashMap;
use tracing::debug;

use super::model::{Vulnerability, VulnerabilityReport};

/// Group findings by exact title, union their assets and keep the first proof
pub fn merge_vulnerabilities<'a>(vulns: impl IntoIterator<Item = &'a Vulnerability>) -> Vec<Vulnerability> {
    let mut merged: Vec<Vulnerability> = Vec::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for vuln in vulns {
        match by_title.get(&vuln.title) {
            Some(&index) => {
                let existing = &mut merged[index];
                for asset in &vuln.affected_assets {
                    if !existing.affected_assets.contains(asset) {
                        existing.affected_assets.push(asset.clone());
                    }
                }
                if existing.proof.is_none() {
                    existing.proof = vuln.proof.clone();
                }
            }
            None => {
                by_title.insert(vuln.title.clone(), merged.len());
                let mut first = vuln.clone();
                first.affected_assets.clear();
                for asset in &vuln.affected_assets {
                    if !first.affected_assets.contains(asset) {
                        first.affected_assets.push(asset.clone());
                    }
                }
                merged.push(first);
            }
        }
    }

    // Stable, so equal severities keep first-seen order
    merged.sort_by_key(|v| v.severity.rank());
    merged
}

/// Merge cluster reports; statistics are recomputed from the merged list
pub fn merge_reports(reports: &[VulnerabilityReport]) -> VulnerabilityReport {
    let vulnerabilities = merge_vulnerabilities(reports.iter().flat_map(|r| r.vulnerabilities.iter()));

    let summary = reports.iter()
        .map(|r| r.summary.trim())
        .filter(|s| !s.is_empty())
        .fold(Vec::<&str>::new(), |mut acc, s| {
            if !acc.contains(&s) {
                acc.push(s);
            }
            acc
        })
        .join("\n\n");

    debug!("Merged {} reports into {} distinct vulnerabilities", reports.len(), vulnerabilities.len());
    VulnerabilityReport::new(summary, vulnerabilities)
}
