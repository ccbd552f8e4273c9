// src/fuzzer/oracle.rs - Response classification for each probe family
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::utils::FetchedResponse;
use super::model::{kind, Confidence};
use super::payloads::{ProbeCategory, SensitivePath, REDIRECT_CANARY_HOST};

static SQL_ERRORS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)you have an error in your sql syntax",
        r"(?i)warning: mysqli?_",
        r"(?i)unclosed quotation mark after the character string",
        r"(?i)quoted string not properly terminated",
        r"(?i)pg::syntaxerror|postgresql.{0,40}error|syntax error at or near",
        r"(?i)sqlite3?::|sqlite_error|sqliteexception",
        r"(?i)\bora-\d{5}\b",
        r"(?i)microsoft ole db provider for (sql server|odbc)",
        r"(?i)sqlstate\[",
        r"(?i)jdbc\.sqlexception|com\.mysql\.jdbc",
    ])
    .expect("sql error signatures are valid")
});

static SYSTEM_FILE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(^root:[^:\n]*:0:0:|^\[(fonts|extensions|boot loader|mci extensions)\]\s*$)")
        .expect("system file markers are valid")
});

static SECRET_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(db_password|db_user|db_host|aws_access_key_id|aws_secret_access_key",
        r"|(password|passwd|secret|api[_-]?key|token)\s*[=:]",
        r"|-----begin [a-z ]*private key-----",
        r"|(mysql|postgres(ql)?|mongodb(\+srv)?|redis)://",
        r"|\[core\]\s*\n\s*repositoryformatversion|ref: refs/heads/)"
    ))
    .expect("secret markers are valid")
});

/// Verdict from one oracle
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub vulnerability_type: &'static str,
    pub confidence: Confidence,
    pub evidence: String,
}

/// Classify the response to one parameter probe
pub fn classify_probe(category: ProbeCategory, payload: &str, response: &FetchedResponse) -> Option<Verdict> {
    let hit = |confidence, evidence: String| Some(Verdict {
        vulnerability_type: category.label(),
        confidence,
        evidence,
    });

    match category {
        ProbeCategory::SqlInjection => {
            let matched = SQL_ERRORS.matches(&response.body);
            if matched.matched_any() {
                return hit(Confidence::High, format!("Database error signature in response (status {})", response.status));
            }
            if response.status == 500 && !response.is_html() {
                return hit(Confidence::Medium, "Status 500 with non-HTML body after quote injection".to_string());
            }
            None
        }
        ProbeCategory::Xss => {
            if response.status == 200 && response.body.contains(payload) {
                return hit(Confidence::High, format!("Payload reflected unencoded: {}", snippet(&response.body, payload)));
            }
            None
        }
        ProbeCategory::PathTraversal => {
            if response.status != 200 {
                return None;
            }
            SYSTEM_FILE_MARKERS.find(&response.body)
                .and_then(|m| hit(Confidence::High, format!("System file content returned: {}", m.as_str().trim())))
        }
        ProbeCategory::OpenRedirect => {
            if !(300..400).contains(&response.status) {
                return None;
            }
            let location = response.header("location").unwrap_or_default();
            if location.contains(REDIRECT_CANARY_HOST) {
                hit(Confidence::High, format!("Redirected to {} (status {})", location, response.status))
            } else {
                hit(Confidence::Low, format!("Status {} for external redirect payload, Location: {}", response.status, location))
            }
        }
    }
}

/// Classify the response for a sensitive-path probe
pub fn classify_sensitive(path: &SensitivePath, response: &FetchedResponse) -> Option<Verdict> {
    if response.status == 200 {
        if path.always_report {
            return Some(Verdict {
                vulnerability_type: kind::INFO_DISCLOSURE,
                confidence: Confidence::Low,
                evidence: format!("{} is publicly readable", path.path),
            });
        }

        if let Some(marker) = SECRET_MARKERS.find(&response.body) {
            return Some(Verdict {
                vulnerability_type: kind::SENSITIVE_FILE,
                confidence: Confidence::High,
                evidence: format!("{} exposes credential-like content near '{}'", path.path, marker.as_str().trim()),
            });
        }

        if !response.is_html() && !response.body.trim().is_empty() {
            return Some(Verdict {
                vulnerability_type: kind::SENSITIVE_FILE,
                confidence: Confidence::High,
                evidence: format!("{} served non-HTML content ({}{} bytes)", path.path,
                                  if response.truncated { "over " } else { "" }, response.body.len()),
            });
        }
    }

    if response.status == 403 && path.admin_like {
        return Some(Verdict {
            vulnerability_type: kind::PROTECTED_RESOURCE,
            confidence: Confidence::Low,
            evidence: format!("{} exists but access is forbidden", path.path),
        });
    }

    None
}

/// Text around the first occurrence of `needle`
fn snippet(body: &str, needle: &str) -> String {
    let Some(start) = body.find(needle) else {
        return String::new();
    };

    let from = floor_boundary(body, start.saturating_sub(40));
    let to = floor_boundary(body, (start + needle.len() + 40).min(body.len()));
    body[from..to].to_string()
}

fn floor_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
