// src/context.rs
use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::config::SessionConfig;

/// Session material supplied by the operator and injected before navigation
/// and probing. Treated as opaque input by the crawler and the fuzzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub cookies: BTreeMap<String, String>,
    pub local_storage: BTreeMap<String, String>,
}

impl SessionContext {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session from the `[session]` configuration section
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            cookies: config.cookies.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            local_storage: config.local_storage.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Add a cookie
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    /// Add a local storage entry
    pub fn with_local_storage(mut self, key: &str, value: &str) -> Self {
        self.local_storage.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty()
    }

    /// Value for a `Cookie` request header, if any cookies are set
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ")
        )
    }

    /// Script that seeds `localStorage` when a new document is created
    pub fn local_storage_script(&self) -> Option<String> {
        if self.local_storage.is_empty() {
            return None;
        }

        let entries = serde_json::to_string(&self.local_storage).ok()?;
        Some(format!(
            "(() => {{ try {{ const e = {}; for (const [k, v] of Object.entries(e)) {{ window.localStorage.setItem(k, v); }} }} catch (_) {{}} }})();",
            entries
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let session = SessionContext::new()
            .with_cookie("sid", "abc")
            .with_cookie("lang", "en");

        assert_eq!(session.cookie_header().as_deref(), Some("lang=en; sid=abc"));
        assert!(SessionContext::new().cookie_header().is_none());
    }

    #[test]
    fn test_local_storage_script_embeds_entries() {
        let session = SessionContext::new().with_local_storage("token", "t\"1");
        let script = session.local_storage_script().unwrap();

        assert!(script.contains(r#""token":"t\"1""#));
        assert!(script.contains("localStorage.setItem"));
    }
}
