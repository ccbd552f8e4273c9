// src/fuzzer/payloads.rs - Payload and path catalogs for active probing
use super::model::kind;

/// Payload families, tried per parameter in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProbeCategory {
    SqlInjection,
    Xss,
    PathTraversal,
    OpenRedirect,
}

impl ProbeCategory {
    pub const ORDER: [ProbeCategory; 4] = [
        ProbeCategory::SqlInjection,
        ProbeCategory::Xss,
        ProbeCategory::PathTraversal,
        ProbeCategory::OpenRedirect,
    ];

    pub fn payloads(&self) -> &'static [&'static str] {
        match self {
            ProbeCategory::SqlInjection => &[
                "'",
                "\"",
                "' OR '1'='1' -- ",
                "1 AND 1=CONVERT(int, @@version)--",
            ],
            ProbeCategory::Xss => &[
                "<script>alert(31337)</script>",
                "\"><img src=x onerror=alert(31337)>",
                "'><svg/onload=alert(31337)>",
            ],
            ProbeCategory::PathTraversal => &[
                "../../../../../../etc/passwd",
                "....//....//....//....//etc/passwd",
                "/etc/passwd",
                "..\\..\\..\\..\\windows\\win.ini",
            ],
            ProbeCategory::OpenRedirect => &[
                "https://vulnscout-redirect.example",
                "//vulnscout-redirect.example",
                "/\\vulnscout-redirect.example",
            ],
        }
    }

    /// Vulnerability type label for findings in this family
    pub fn label(&self) -> &'static str {
        match self {
            ProbeCategory::SqlInjection => kind::SQL_INJECTION,
            ProbeCategory::Xss => kind::REFLECTED_XSS,
            ProbeCategory::PathTraversal => kind::PATH_TRAVERSAL,
            ProbeCategory::OpenRedirect => kind::OPEN_REDIRECT,
        }
    }

    /// Whether this family applies to a parameter name
    pub fn applies_to(&self, parameter: &str) -> bool {
        match self {
            ProbeCategory::OpenRedirect => is_redirect_param(parameter),
            _ => true,
        }
    }
}

/// Host the redirect payloads point at
pub const REDIRECT_CANARY_HOST: &str = "vulnscout-redirect.example";

const REDIRECT_PARAMS: &[&str] = &[
    "url", "uri", "redirect", "redirect_uri", "redirect_url", "next", "return", "returnurl",
    "return_to", "returnto", "goto", "dest", "destination", "continue", "target", "rurl",
    "callback", "to", "forward", "out", "view",
];

pub fn is_redirect_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    REDIRECT_PARAMS.contains(&name.as_str())
}

/// A well-known path worth probing on the target origin
#[derive(Debug, Clone, Copy)]
pub struct SensitivePath {
    pub path: &'static str,
    /// Reported whenever present, regardless of content
    pub always_report: bool,
    /// A 403 here still reveals something
    pub admin_like: bool,
}

const fn exposure(path: &'static str) -> SensitivePath {
    SensitivePath { path, always_report: false, admin_like: false }
}

const fn informational(path: &'static str) -> SensitivePath {
    SensitivePath { path, always_report: true, admin_like: false }
}

const fn admin(path: &'static str) -> SensitivePath {
    SensitivePath { path, always_report: false, admin_like: true }
}

pub const SENSITIVE_PATHS: &[SensitivePath] = &[
    exposure("/.env"),
    exposure("/.env.local"),
    exposure("/.git/config"),
    exposure("/.git/HEAD"),
    exposure("/.svn/entries"),
    exposure("/.htpasswd"),
    exposure("/.DS_Store"),
    exposure("/.aws/credentials"),
    exposure("/config.json"),
    exposure("/config.php.bak"),
    exposure("/wp-config.php.bak"),
    exposure("/web.config"),
    exposure("/backup.zip"),
    exposure("/backup.sql"),
    exposure("/db.sql"),
    exposure("/phpinfo.php"),
    admin("/server-status"),
    admin("/admin"),
    admin("/administrator"),
    admin("/wp-admin/"),
    admin("/phpmyadmin/"),
    admin("/manager/html"),
    informational("/robots.txt"),
    informational("/sitemap.xml"),
    informational("/.well-known/security.txt"),
];
