// src/analysis/prompt.rs - Prompt construction for cluster analysis and report synthesis
use crate::reporting::Vulnerability;
use super::cluster::AnalysisCluster;

const SCHEMA: &str = r#"{
  "summary": "string",
  "vulnerabilities": [
    {
      "title": "string",
      "severity": "critical | high | medium | low | info",
      "cwe": "CWE-<n> (optional)",
      "cvss": "number between 0 and 10 (optional)",
      "description": "string",
      "recommendation": "string",
      "references": ["url"],
      "affectedAssets": ["url or path"],
      "proof": { "payload": "", "parameter": "", "request": "", "response": "", "confidence": "" }
    }
  ]
}"#;

/// Prompt asking for the vulnerabilities evidenced by one cluster
pub fn cluster_prompt(cluster: &AnalysisCluster) -> String {
    let evidence = serde_json::to_string_pretty(cluster).unwrap_or_default();

    format!(
        "You are assisting an authorized security assessment of {target}.\n\
         Review the crawl evidence below (pages, forms, API calls, cookies, active probe findings) \
         and report concrete, evidence-backed vulnerabilities only.\n\
         Active probe findings were confirmed by live requests; include each one.\n\
         Use the exact same title for the same issue class.\n\n\
         Respond with a single JSON object matching this schema and nothing else:\n{schema}\n\n\
         Evidence (cluster {id}):\n{evidence}\n",
        target = cluster.target,
        schema = SCHEMA,
        id = cluster.id,
        evidence = evidence,
    )
}

/// Prompt asking for the narrative sections of the final report
pub fn synthesis_prompt(target: &str, vulnerabilities: &[Vulnerability]) -> String {
    let findings = serde_json::to_string_pretty(vulnerabilities).unwrap_or_default();

    format!(
        "Write the narrative sections of a penetration test report for {target}.\n\
         The findings below are final; do not add or remove any.\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"executiveSummary\": \"string\", \"methodology\": \"string\", \"recommendations\": [\"string\"]}}\n\
         Order recommendations by priority, most urgent first.\n\n\
         Findings:\n{findings}\n",
        target = target,
        findings = findings,
    )
}
