// src/analysis/enrich.rs - Backfill CWE, CVSS and references, then realign severity
use tracing::debug;

use crate::reporting::{Severity, Vulnerability};

/// Descriptions shorter than this get impact and root-cause language appended
pub const MIN_DESCRIPTION_LEN: usize = 120;

pub const UNKNOWN_CWE: &str = "NVD-CWE-noinfo";
pub const DEFAULT_CVSS: f64 = 5.0;

struct TaxonomyEntry {
    keywords: &'static [&'static str],
    cwe: &'static str,
    cvss: f64,
}

/// Checked in order; the first keyword hit wins
const TAXONOMY: &[TaxonomyEntry] = &[
    TaxonomyEntry { keywords: &["sql"], cwe: "CWE-89", cvss: 9.8 },
    TaxonomyEntry { keywords: &["csrf", "request forgery"], cwe: "CWE-352", cvss: 8.8 },
    TaxonomyEntry { keywords: &["xss", "cross-site", "scripting"], cwe: "CWE-79", cvss: 6.1 },
    TaxonomyEntry { keywords: &["idor", "insecure direct"], cwe: "CWE-639", cvss: 5.3 },
    TaxonomyEntry { keywords: &["traversal"], cwe: "CWE-22", cvss: 7.5 },
    TaxonomyEntry { keywords: &["upload"], cwe: "CWE-434", cvss: 8.8 },
    TaxonomyEntry { keywords: &["redirect"], cwe: "CWE-601", cvss: 6.1 },
    TaxonomyEntry { keywords: &["headers"], cwe: "CWE-693", cvss: 3.7 },
    TaxonomyEntry { keywords: &["disclosure", "exposure"], cwe: "CWE-200", cvss: 5.3 },
    TaxonomyEntry { keywords: &["authentication"], cwe: "CWE-287", cvss: 8.8 },
];

fn lookup(title: &str) -> Option<&'static TaxonomyEntry> {
    let title = title.to_ascii_lowercase();
    TAXONOMY.iter().find(|entry| entry.keywords.iter().any(|k| title.contains(k)))
}

fn cwe_reference(cwe: &str) -> Option<String> {
    let id = cwe.strip_prefix("CWE-")?;
    id.chars().all(|c| c.is_ascii_digit())
        .then(|| format!("https://cwe.mitre.org/data/definitions/{}.html", id))
}

fn impact_language(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => {
            " Successful exploitation can give an attacker direct access to sensitive data or \
             application functionality. The root cause is missing or insufficient server-side \
             validation of attacker-controlled input."
        }
        Severity::Medium => {
            " An attacker may combine this weakness with other issues to escalate impact. \
             The root cause is an incomplete security control in the affected component."
        }
        Severity::Low | Severity::Info => {
            " On its own this has limited impact but it gives an attacker information useful \
             for further attacks. It stems from a hardening gap in the application's configuration."
        }
    }
}

/// Fill in missing classification data and realign severity from CVSS
pub fn enrich(mut vuln: Vulnerability) -> Vulnerability {
    let entry = lookup(&vuln.title);

    if vuln.cwe.as_deref().map_or(true, str::is_empty) {
        vuln.cwe = Some(entry.map_or(UNKNOWN_CWE, |e| e.cwe).to_string());
    }

    if vuln.cvss.is_none() {
        vuln.cvss = Some(entry.map_or(DEFAULT_CVSS, |e| e.cvss));
    }

    if vuln.references.is_empty() {
        if let Some(reference) = vuln.cwe.as_deref().and_then(cwe_reference) {
            vuln.references.push(reference);
        }
    }

    if let Some(floor) = vuln.cvss.and_then(Severity::floor_for_cvss) {
        if floor.rank() < vuln.severity.rank() {
            debug!("Raising '{}' from {} to {} (cvss {:?})", vuln.title, vuln.severity, floor, vuln.cvss);
            vuln.severity = floor;
        }
    }

    if vuln.description.trim().len() < MIN_DESCRIPTION_LEN {
        vuln.description = format!("{}{}", vuln.description.trim_end(), impact_language(vuln.severity));
    }

    vuln
}

/// Enrich every finding, order by severity and assign stable ids
pub fn enrich_all(vulns: Vec<Vulnerability>) -> Vec<Vulnerability> {
    let mut enriched: Vec<Vulnerability> = vulns.into_iter().map(enrich).collect();
    enriched.sort_by_key(|v| v.severity.rank());

    for (i, vuln) in enriched.iter_mut().enumerate() {
        vuln.id = format!("VULN-{:03}", i + 1);
    }
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln(title: &str, severity: Severity, cvss: Option<f64>) -> Vulnerability {
        Vulnerability {
            id: String::new(),
            title: title.to_string(),
            severity,
            cwe: None,
            cvss,
            description: "Short.".to_string(),
            recommendation: "Fix it.".to_string(),
            references: Vec::new(),
            affected_assets: vec!["/a".to_string()],
            proof: None,
        }
    }

    #[test]
    fn test_taxonomy_backfill() {
        let sqli = enrich(vuln("SQL Injection (SQLi)", Severity::High, None));
        assert_eq!(sqli.cwe.as_deref(), Some("CWE-89"));
        assert_eq!(sqli.cvss, Some(9.8));
        assert_eq!(sqli.references, vec!["https://cwe.mitre.org/data/definitions/89.html".to_string()]);

        let csrf = enrich(vuln("Cross-Site Request Forgery", Severity::Medium, None));
        assert_eq!(csrf.cwe.as_deref(), Some("CWE-352"));

        let xss = enrich(vuln("Reflected Cross-Site Scripting", Severity::Medium, None));
        assert_eq!(xss.cwe.as_deref(), Some("CWE-79"));
    }

    #[test]
    fn test_unmatched_title_gets_placeholder() {
        let other = enrich(vuln("Verbose Banner", Severity::Low, None));
        assert_eq!(other.cwe.as_deref(), Some(UNKNOWN_CWE));
        assert_eq!(other.cvss, Some(DEFAULT_CVSS));
        assert!(other.references.is_empty());
    }

    #[test]
    fn test_cvss_raises_severity_only_upward() {
        assert_eq!(enrich(vuln("Anything", Severity::Medium, Some(9.5))).severity, Severity::Critical);
        assert_eq!(enrich(vuln("Anything", Severity::Low, Some(7.2))).severity, Severity::High);
        assert_eq!(enrich(vuln("Anything", Severity::Critical, Some(4.0))).severity, Severity::Critical);
        // Backfilled scores realign too
        assert_eq!(enrich(vuln("Blind SQL injection", Severity::Low, None)).severity, Severity::Critical);
    }

    #[test]
    fn test_short_description_padded() {
        let padded = enrich(vuln("Anything", Severity::Low, None));
        assert!(padded.description.starts_with("Short. "));
        assert!(padded.description.len() >= MIN_DESCRIPTION_LEN);

        let mut long = vuln("Anything", Severity::Low, None);
        long.description = "x".repeat(200);
        assert_eq!(enrich(long).description.len(), 200);
    }

    #[test]
    fn test_enrich_all_orders_and_numbers() {
        let out = enrich_all(vec![
            vuln("Missing Security Headers", Severity::Low, None),
            vuln("SQL Injection", Severity::High, None),
        ]);
        assert_eq!(out[0].title, "SQL Injection");
        assert_eq!(out[0].id, "VULN-001");
        assert_eq!(out[1].id, "VULN-002");
    }
}
