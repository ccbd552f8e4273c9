use vulnscout::config::Config;
use vulnscout::context::SessionContext;
use vulnscout::events::EventSink;
use vulnscout::fuzzer::payloads::ProbeCategory;
use vulnscout::fuzzer::{kind, ActiveFuzzer, Confidence};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Echoes the `q` parameter back without encoding
struct ReflectQuery;

impl Respond for ReflectQuery {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = request.url.query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200)
            .set_body_raw(format!("<html><body>Results for {}</body></html>", q), "text/html")
    }
}

fn fuzzer() -> ActiveFuzzer {
    let config = Config::default();
    ActiveFuzzer::new(&config.fuzzer, "vulnscout-test", &SessionContext::new(), EventSink::disabled()).unwrap()
}

#[tokio::test]
async fn test_reflected_parameter_yields_single_xss_finding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ReflectQuery)
        .mount(&server)
        .await;

    let findings = fuzzer()
        .fuzz_parameters(&format!("{}/search?q=1", server.uri()))
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].vulnerability_type, kind::REFLECTED_XSS);
    assert_eq!(findings[0].confidence, Confidence::High);
    assert_eq!(findings[0].parameter.as_deref(), Some("q"));

    // The first XSS payload hit, so no other XSS payload was sent for q
    let requests = server.received_requests().await.unwrap();
    let xss_probes = requests.iter()
        .filter(|r| r.url.query_pairs().any(|(_, v)| v.contains("alert(31337)")))
        .count();
    assert_eq!(xss_probes, 1);
}

#[tokio::test]
async fn test_sensitive_paths_on_origin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.env"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("APP_KEY=x\nDB_PASSWORD=hunter2\n", "text/plain"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let findings = fuzzer().check_sensitive_paths(&server.uri()).await.unwrap();

    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].vulnerability_type, kind::SENSITIVE_FILE);
    assert_eq!(findings[0].confidence, Confidence::High);
    assert!(findings[0].url.ends_with("/.env"));
    assert_eq!(findings[1].vulnerability_type, kind::PROTECTED_RESOURCE);
}

#[tokio::test]
async fn test_stopped_fuzzer_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ReflectQuery)
        .mount(&server)
        .await;

    let fuzzer = fuzzer();
    fuzzer.stop_handle().cancel();
    let findings = fuzzer
        .run(&[format!("{}/search?q=1", server.uri())], &server.uri())
        .await
        .unwrap();

    assert!(findings.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payload_families_sent_in_order_per_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html><body>No results</body></html>", "text/html"))
        .mount(&server)
        .await;

    let findings = fuzzer()
        .fuzz_parameters(&format!("{}/search?q=1", server.uri()))
        .await
        .unwrap();
    assert!(findings.is_empty());

    let families: Vec<ProbeCategory> = server.received_requests().await.unwrap().iter()
        .filter_map(|r| r.url.query_pairs().find(|(k, _)| k == "q").map(|(_, v)| v.into_owned()))
        .map(|value| {
            *ProbeCategory::ORDER.iter()
                .find(|c| c.payloads().contains(&value.as_str()))
                .unwrap()
        })
        .collect();

    // Every payload of every family went out, one family after another
    assert_eq!(families.len(), 11);
    assert!(families.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(families.first(), Some(&ProbeCategory::SqlInjection));
    assert_eq!(families.last(), Some(&ProbeCategory::PathTraversal));
}
