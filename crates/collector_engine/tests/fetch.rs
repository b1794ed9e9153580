use std::time::Duration;

use collector_engine::{Address, FailureKind, FetchSettings, Fetcher, ReqwestFetcher};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetcher_returns_html_content_with_depth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/index.html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let address = Address::new(format!("{}/docs/index.html", server.uri()), 3);

    let content = fetcher.fetch(&address).await.expect("fetch ok");
    assert_eq!(content.kind, "html");
    assert_eq!(content.name, "index.html");
    assert_eq!(content.payload, b"<html>ok</html>");
    assert_eq!(content.depth, 3);
}

#[tokio::test]
async fn fetcher_maps_image_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let address = Address::seed(format!("{}/logo.png", server.uri()));

    let content = fetcher.fetch(&address).await.expect("fetch ok");
    assert_eq!(content.kind, "png");
    assert_eq!(content.name, "logo.png");
    assert_eq!(content.payload, vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn fetcher_sends_referer_and_user_agent() {
    let server = MockServer::start().await;
    let url = format!("{}/page", server.uri());
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("referer", url.as_str()))
        .and(header("user-agent", "collector-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>hi</p>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        user_agent: "collector-test/1.0".into(),
        ..FetchSettings::default()
    });
    let content = fetcher.fetch(&Address::seed(url)).await.expect("fetch ok");
    assert_eq!(content.name, "page");
}

#[tokio::test]
async fn fetcher_rejects_unknown_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let address = Address::seed(format!("{}/data.json", server.uri()));

    let err = fetcher.fetch(&address).await.unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::UnsupportedContentType {
            content_type: "application/json".into()
        }
    );
}

#[tokio::test]
async fn fetcher_fails_on_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let address = Address::seed(format!("{}/missing", server.uri()));

    let err = fetcher.fetch(&address).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn fetcher_rejects_invalid_url() {
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher.fetch(&Address::seed("not a url")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn fetcher_times_out_on_slow_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_raw("slow", "text/html"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(50),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);
    let address = Address::seed(format!("{}/slow", server.uri()));

    let err = fetcher.fetch(&address).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn fetcher_rejects_too_large_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html")
                .insert_header("Content-Length", "11")
                .set_body_string("01234567890"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_bytes: 10,
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);
    let address = Address::seed(format!("{}/large", server.uri()));

    let err = fetcher.fetch(&address).await.unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::TooLarge {
            max_bytes: 10,
            actual: Some(11)
        }
    );
}

#[tokio::test]
async fn fetcher_gives_up_on_a_redirect_loop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        redirect_limit: 3,
        ..FetchSettings::default()
    });
    let address = Address::seed(format!("{}/loop", server.uri()));

    let err = fetcher.fetch(&address).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::RedirectLimitExceeded);
}

#[tokio::test]
async fn fetcher_rejects_response_without_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"opaque".to_vec()))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let address = Address::seed(format!("{}/blob", server.uri()));

    let err = fetcher.fetch(&address).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::MissingContentType);
}

#[tokio::test]
async fn fetcher_sends_requests_through_the_configured_proxy() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>via proxy</p>", "text/html"))
        .expect(1)
        .mount(&proxy)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        proxies: vec![proxy.uri()],
        ..FetchSettings::default()
    });
    // The host does not resolve, so only the proxy can answer.
    let content = fetcher
        .fetch(&Address::seed("http://unreachable.invalid/p"))
        .await
        .expect("fetch through proxy");
    assert_eq!(content.kind, "html");
    assert_eq!(content.name, "p");
    assert_eq!(content.payload, b"<p>via proxy</p>");
}

#[tokio::test]
async fn fetcher_goes_direct_when_the_proxy_is_unusable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>direct</p>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        proxies: vec!["http://[not-a-host".into()],
        ..FetchSettings::default()
    });
    let address = Address::seed(format!("{}/direct", server.uri()));

    let content = fetcher.fetch(&address).await.expect("direct fetch");
    assert_eq!(content.name, "direct");
}
