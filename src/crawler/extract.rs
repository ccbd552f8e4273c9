// src/crawler/extract.rs - Pure HTML evidence extraction shared by every renderer
use std::collections::{BTreeMap, HashSet};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::scope_filter::ScopeFilter;
use super::model::{AssetCategory, DetectedForm, FormField, ObservedApiCall};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

static VERSIONED_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/v[1-3]/").expect("version pattern is valid")
});

const ASSET_SOURCES: &[(&str, &str)] = &[
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("link[href]", "href"),
    ("source[src]", "src"),
    ("video[src]", "src"),
    ("audio[src]", "src"),
    ("embed[src]", "src"),
    ("object[data]", "data"),
    ("a[href]", "href"),
];

const EXCLUDED_CONTROLS: &[&str] = &["submit", "button", "image", "reset"];

/// Evidence pulled out of one document
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub title: Option<String>,
    pub links: Vec<String>,
    pub forms: Vec<DetectedForm>,
    pub emails: Vec<String>,
    pub assets: BTreeMap<AssetCategory, Vec<String>>,
}

/// Extract links, forms, emails and assets from a rendered document
pub fn extract_page(html: &str, page_url: &Url, scope: &ScopeFilter) -> PageExtraction {
    let document = Html::parse_document(html);
    let emails = dedup_in_order(extract_visible_emails(&document).into_iter().chain(extract_mailto(&document)));

    PageExtraction {
        title: extract_title(&document),
        links: extract_links(&document, page_url, scope),
        forms: extract_forms(&document, page_url),
        emails,
        assets: extract_assets(&document, page_url),
    }
}

pub fn extract_title(document: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    let title = document.select(&sel).next()?.text().collect::<String>();
    let title = title.trim();

    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Same-domain links, fragment-stripped, deduplicated in document order
pub fn extract_links(document: &Html, page_url: &Url, scope: &ScopeFilter) -> Vec<String> {
    let mut links = Vec::new();
    let Ok(sel) = Selector::parse("a[href], area[href]") else {
        return links;
    };

    for element in document.select(&sel) {
        let href = element.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }

        let Ok(mut resolved) = page_url.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        if scope.is_url_in_scope(&resolved) {
            links.push(resolved.to_string());
        }
    }

    dedup_in_order(links)
}

pub fn extract_forms(document: &Html, page_url: &Url) -> Vec<DetectedForm> {
    let mut forms = Vec::new();
    let (Ok(form_sel), Ok(field_sel)) = (
        Selector::parse("form"),
        Selector::parse("input, select, textarea"),
    ) else {
        return forms;
    };

    for form in document.select(&form_sel) {
        let action = match form.value().attr("action").map(str::trim) {
            Some(action) if !action.is_empty() => page_url
                .join(action)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| action.to_string()),
            _ => page_url.to_string(),
        };

        let method = form.value().attr("method")
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string());

        let fields = form.select(&field_sel)
            .filter_map(|field| form_field(&field))
            .collect();

        forms.push(DetectedForm { action, method, fields });
    }

    forms
}

fn form_field(field: &ElementRef) -> Option<FormField> {
    let element = field.value();
    let field_type = element.attr("type")
        .unwrap_or(element.name())
        .to_ascii_lowercase();

    if EXCLUDED_CONTROLS.contains(&field_type.as_str()) {
        return None;
    }

    let name = element.attr("name").or_else(|| element.attr("id"))?;

    Some(FormField {
        name: name.to_string(),
        field_type,
        required: element.attr("required").is_some(),
        placeholder: element.attr("placeholder").map(str::to_string),
    })
}

/// Emails found in text nodes outside script and style blocks
pub fn extract_visible_emails(document: &Html) -> Vec<String> {
    let mut emails = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        for m in EMAIL_RE.find_iter(text) {
            emails.push(m.as_str().to_ascii_lowercase());
        }
    }

    dedup_in_order(emails)
}

fn extract_mailto(document: &Html) -> Vec<String> {
    let mut emails = Vec::new();
    let Ok(sel) = Selector::parse(r#"a[href^="mailto:"]"#) else {
        return emails;
    };

    for element in document.select(&sel) {
        let href = element.value().attr("href").unwrap_or("");
        let address = href.trim_start_matches("mailto:").split('?').next().unwrap_or("");
        if EMAIL_RE.is_match(address) {
            emails.push(address.to_ascii_lowercase());
        }
    }

    dedup_in_order(emails)
}

/// Referenced resources bucketed by extension; not scope-filtered
pub fn extract_assets(document: &Html, page_url: &Url) -> BTreeMap<AssetCategory, Vec<String>> {
    let mut assets: BTreeMap<AssetCategory, Vec<String>> = BTreeMap::new();

    for (selector, attr) in ASSET_SOURCES {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };

        for element in document.select(&sel) {
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            let Ok(mut resolved) = page_url.join(raw.trim()) else {
                continue;
            };
            resolved.set_fragment(None);

            if let Some(category) = classify_asset(&resolved) {
                assets.entry(category).or_default().push(resolved.to_string());
            }
        }
    }

    for bucket in assets.values_mut() {
        *bucket = dedup_in_order(std::mem::take(bucket));
    }
    assets
}

pub fn classify_asset(url: &Url) -> Option<AssetCategory> {
    let segment = url.path_segments()?.last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    AssetCategory::from_extension(&ext.to_ascii_lowercase())
}

/// Whether a request looks like an API call worth reporting
pub fn is_api_like(url: &Url, method: &str) -> bool {
    if !method.eq_ignore_ascii_case("GET") {
        return true;
    }

    let path = url.path().to_ascii_lowercase();
    path.contains("/api/")
        || VERSIONED_PATH_RE.is_match(&path)
        || path.contains("/graphql")
        || path.ends_with(".json")
        || path.ends_with(".xml")
}

/// Build an [`ObservedApiCall`] for a request if it matches the API heuristics
pub fn observe_request(
    raw_url: &str,
    method: &str,
    headers: BTreeMap<String, String>,
) -> Option<ObservedApiCall> {
    let url = Url::parse(raw_url).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    if !is_api_like(&url, method) {
        return None;
    }

    let params = url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut endpoint = url.clone();
    endpoint.set_query(None);
    endpoint.set_fragment(None);

    Some(ObservedApiCall {
        endpoint: endpoint.to_string(),
        method: method.to_uppercase(),
        params,
        headers,
        response_status: None,
    })
}

/// Drop repeats, keeping first-seen order
fn dedup_in_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
            <title> Shop Home </title>
            <link rel="stylesheet" href="/static/site.css">
            <script src="https://cdn.other.test/lib.js"></script>
            <script>var contact = "hidden@x.test";</script>
        </head><body>
            <a href="/about#team">About</a>
            <a href="/about">About again</a>
            <a href="https://b.x.test/help">Help</a>
            <a href="https://evil.test/">Evil</a>
            <a href="mailto:Sales@X.test?subject=hi">Mail</a>
            <a href="/files/report.pdf">Report</a>
            <img src="logo.PNG">
            <p>Write to support@x.test for help.</p>
            <form action="/login" method="post">
                <input type="text" name="user" required placeholder="Username">
                <input type="password" name="pass">
                <input type="submit" value="Go">
                <button type="submit">Login</button>
            </form>
            <form><select name="lang"></select></form>
        </body></html>
    "#;

    fn scope() -> ScopeFilter {
        ScopeFilter::for_seed(&Url::parse("https://x.test/").unwrap()).unwrap()
    }

    #[test]
    fn test_links_are_scoped_deduplicated_and_fragment_free() {
        let page_url = Url::parse("https://x.test/index").unwrap();
        let page = extract_page(PAGE, &page_url, &scope());

        assert_eq!(page.title.as_deref(), Some("Shop Home"));
        assert_eq!(page.links, vec![
            "https://x.test/about".to_string(),
            "https://b.x.test/help".to_string(),
            "https://x.test/files/report.pdf".to_string(),
        ]);
    }

    #[test]
    fn test_forms_exclude_submit_controls() {
        let page_url = Url::parse("https://x.test/index").unwrap();
        let page = extract_page(PAGE, &page_url, &scope());

        assert_eq!(page.forms.len(), 2);
        let login = &page.forms[0];
        assert_eq!(login.action, "https://x.test/login");
        assert_eq!(login.method, "POST");
        assert_eq!(login.fields.len(), 2);
        assert!(login.fields[0].required);
        assert_eq!(login.fields[0].placeholder.as_deref(), Some("Username"));

        let lang = &page.forms[1];
        assert_eq!(lang.method, "GET");
        assert_eq!(lang.action, "https://x.test/index");
        assert_eq!(lang.fields[0].field_type, "select");
    }

    #[test]
    fn test_emails_skip_script_text() {
        let page_url = Url::parse("https://x.test/").unwrap();
        let page = extract_page(PAGE, &page_url, &scope());

        assert!(page.emails.contains(&"support@x.test".to_string()));
        assert!(page.emails.contains(&"sales@x.test".to_string()));
        assert!(!page.emails.contains(&"hidden@x.test".to_string()));
    }

    #[test]
    fn test_assets_bucketed_by_extension() {
        let page_url = Url::parse("https://x.test/").unwrap();
        let page = extract_page(PAGE, &page_url, &scope());

        assert_eq!(page.assets[&AssetCategory::Styles], vec!["https://x.test/static/site.css".to_string()]);
        assert_eq!(page.assets[&AssetCategory::Scripts], vec!["https://cdn.other.test/lib.js".to_string()]);
        assert_eq!(page.assets[&AssetCategory::Images], vec!["https://x.test/logo.PNG".to_string()]);
        assert_eq!(page.assets[&AssetCategory::Pdfs], vec!["https://x.test/files/report.pdf".to_string()]);
    }

    #[test]
    fn test_api_heuristics() {
        let get = |u: &str| is_api_like(&Url::parse(u).unwrap(), "GET");

        assert!(get("https://x.test/api/users"));
        assert!(get("https://x.test/v2/items"));
        assert!(get("https://x.test/graphql"));
        assert!(get("https://x.test/data/feed.xml"));
        assert!(!get("https://x.test/about"));
        assert!(!get("https://x.test/v4/items"));
        assert!(is_api_like(&Url::parse("https://x.test/submit").unwrap(), "POST"));
    }

    #[test]
    fn test_observe_request_splits_params() {
        let call = observe_request("https://x.test/api/search?q=a&page=2", "get", BTreeMap::new()).unwrap();

        assert_eq!(call.endpoint, "https://x.test/api/search");
        assert_eq!(call.method, "GET");
        assert_eq!(call.params.get("q").map(String::as_str), Some("a"));
        assert!(observe_request("https://x.test/about", "GET", BTreeMap::new()).is_none());
    }
}
