// src/analysis/parser.rs - Recover schema-valid vulnerability JSON from free-form service output
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{ScoutError, ScoutResult};
use crate::reporting::{Vulnerability, VulnerabilityReport};

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fenced block pattern is valid")
});

static TAGGED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:json|report|output)>(.*?)</(?:json|report|output)>").expect("tagged block pattern is valid")
});

type Strategy = fn(&str) -> Option<String>;

/// Extraction strategies, tried in order until one yields schema-valid JSON
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", direct),
    ("fenced", fenced_block),
    ("tagged", tagged_block),
    ("bracket-span", bracket_span),
    ("trimmed-backticks", trimmed_backticks),
];

fn direct(raw: &str) -> Option<String> {
    Some(raw.trim().to_string())
}

fn fenced_block(raw: &str) -> Option<String> {
    FENCED_BLOCK.captures(raw).map(|c| c[1].trim().to_string())
}

fn tagged_block(raw: &str) -> Option<String> {
    TAGGED_BLOCK.captures(raw).map(|c| c[1].trim().to_string())
}

/// First-open to last-close span for each bracket kind; the earliest span that is valid JSON wins
fn bracket_span(raw: &str) -> Option<String> {
    let mut spans: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = raw.find(open)?;
            let end = raw.rfind(close)?;
            (end > start).then(|| (start, &raw[start..=end]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);

    spans.into_iter()
        .map(|(_, span)| span)
        .find(|span| serde_json::from_str::<Value>(span).is_ok())
        .map(str::to_string)
}

fn trimmed_backticks(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('`').trim();
    let trimmed = trimmed.strip_prefix("json").unwrap_or(trimmed).trim();
    Some(trimmed.to_string())
}

/// Parse one cluster's raw service output into a report
pub fn parse_report(raw: &str) -> ScoutResult<VulnerabilityReport> {
    let mut schema_error: Option<String> = None;

    for (name, strategy) in STRATEGIES {
        let Some(candidate) = strategy(raw) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&candidate) else {
            continue;
        };

        match validate(value) {
            Ok(report) => {
                debug!("Parsed {} vulnerabilities via {} strategy", report.vulnerabilities.len(), name);
                return Ok(report);
            }
            Err(e) => {
                debug!("{} strategy produced JSON that failed validation: {}", name, e);
                schema_error = Some(e);
            }
        }
    }

    match schema_error {
        Some(message) => Err(ScoutError::SchemaValidation(message)),
        None => Err(ScoutError::JsonParse(format!("no JSON payload found in {} chars of output", raw.len()))),
    }
}

/// First extraction that deserializes into `T`
pub fn parse_value<T: DeserializeOwned>(raw: &str) -> Option<T> {
    STRATEGIES.iter()
        .filter_map(|(_, strategy)| strategy(raw))
        .find_map(|candidate| serde_json::from_str(&candidate).ok())
}

/// Parse and validate just the vulnerability list
pub fn parse(raw: &str) -> ScoutResult<Vec<Vulnerability>> {
    parse_report(raw).map(|report| report.vulnerabilities)
}

fn validate(value: Value) -> Result<VulnerabilityReport, String> {
    let (summary, items) = match value {
        Value::Array(items) => (String::new(), items),
        Value::Object(mut object) => {
            let summary = object.get("summary").and_then(Value::as_str).unwrap_or_default().to_string();
            match object.remove("vulnerabilities") {
                Some(Value::Array(items)) => (summary, items),
                Some(_) => return Err("'vulnerabilities' is not an array".to_string()),
                None => return Err("missing 'vulnerabilities'".to_string()),
            }
        }
        _ => return Err("top-level value is neither an object nor an array".to_string()),
    };

    let mut vulnerabilities = Vec::with_capacity(items.len());
    for (i, mut item) in items.into_iter().enumerate() {
        normalize_severity(&mut item);

        let vuln: Vulnerability = serde_json::from_value(item)
            .map_err(|e| format!("vulnerability {}: {}", i, e))?;

        if let Some(cvss) = vuln.cvss {
            if !(0.0..=10.0).contains(&cvss) {
                return Err(format!("vulnerability {}: cvss {} outside 0-10", i, cvss));
            }
        }
        vulnerabilities.push(vuln);
    }

    Ok(VulnerabilityReport::new(summary, vulnerabilities))
}

/// Severity labels are matched case-insensitively
fn normalize_severity(item: &mut Value) {
    if let Some(severity) = item.get_mut("severity") {
        if let Some(label) = severity.as_str() {
            *severity = Value::String(label.trim().to_ascii_lowercase());
        }
    }
}
