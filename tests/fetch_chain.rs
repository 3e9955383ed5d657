mod common;

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use tokio::time::Instant;

use jobharvest::config::PipelineConfig;
use jobharvest::error::FetchError;
use jobharvest::fetch::FetchChain;
use jobharvest::models::source::{FetchHints, StrategyKind};

use common::{CHALLENGE_PAGE, pipeline_config};

fn with_proxy(server: &MockServer) -> PipelineConfig {
    PipelineConfig {
        render_proxy_url: Some(server.url("/render")),
        render_proxy_api_key: Some("test-key".to_string()),
        ..pipeline_config()
    }
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(15)
}

#[tokio::test]
async fn rate_limited_direct_escalates_to_render_proxy() {
    let server = MockServer::start_async().await;
    let target = server.url("/vacatures?page=1");
    let direct = server
        .mock_async(|when, then| {
            when.method(GET).path("/vacatures");
            then.status(429).body("Too Many Requests");
        })
        .await;
    let proxy = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/render")
                .query_param("api_key", "test-key")
                .query_param("url", target.as_str())
                .query_param("render", "true");
            then.status(200).body("<html><body><h2>Chef</h2></body></html>");
        })
        .await;

    let chain = FetchChain::from_config(&with_proxy(&server)).unwrap();
    assert_eq!(
        chain.available(),
        vec![StrategyKind::Direct, StrategyKind::RenderProxy]
    );

    let document = chain
        .fetch(&target, &FetchHints::default(), deadline())
        .await
        .unwrap();
    assert_eq!(document.strategy, StrategyKind::RenderProxy);
    assert_eq!(document.final_url, target);
    assert!(document.body.contains("Chef"));
    direct.assert_hits_async(1).await;
    proxy.assert_hits_async(1).await;
}

#[tokio::test]
async fn missing_page_stops_the_chain() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        })
        .await;
    let proxy = server
        .mock_async(|when, then| {
            when.method(GET).path("/render");
            then.status(200).body("<html></html>");
        })
        .await;

    let chain = FetchChain::from_config(&with_proxy(&server)).unwrap();
    let err = chain
        .fetch(&server.url("/gone"), &FetchHints::default(), deadline())
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::NotFound { status: 404 });
    proxy.assert_hits_async(0).await;
}

#[tokio::test]
async fn challenge_everywhere_reports_bot_challenge() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/jobs");
            then.status(503).body(CHALLENGE_PAGE);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/render");
            then.status(200).body(CHALLENGE_PAGE);
        })
        .await;

    let chain = FetchChain::from_config(&with_proxy(&server)).unwrap();
    let err = chain
        .fetch(&server.url("/jobs"), &FetchHints::default(), deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::BotChallenge { .. }));
    assert_eq!(err.class(), "bot-challenge");
}

#[tokio::test]
async fn refused_proxy_key_counts_as_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/render");
            then.status(401).body("invalid api key");
        })
        .await;

    let chain = FetchChain::from_config(&with_proxy(&server)).unwrap();
    let hints = FetchHints {
        pinned: Some(StrategyKind::RenderProxy),
        ..Default::default()
    };
    let err = chain
        .fetch("https://www.indeed.nl/jobs?q=kok", &hints, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Unavailable(_)));
}

#[tokio::test]
async fn pinned_proxy_skips_direct() {
    let server = MockServer::start_async().await;
    let direct = server
        .mock_async(|when, then| {
            when.method(GET).path("/listing");
            then.status(200).body("<html>direct</html>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/render").query_param("wait", "1500");
            then.status(200).body("<html>rendered</html>");
        })
        .await;

    let chain = FetchChain::from_config(&with_proxy(&server)).unwrap();
    let mut hints = FetchHints {
        pinned: Some(StrategyKind::RenderProxy),
        ..Default::default()
    };
    hints.render.wait_ms = Some(1500);

    let document = chain
        .fetch(&server.url("/listing"), &hints, deadline())
        .await
        .unwrap();
    assert!(document.body.contains("rendered"));
    direct.assert_hits_async(0).await;
}

#[tokio::test]
async fn unconfigured_strategies_are_reported_unavailable() {
    let chain = FetchChain::from_config(&pipeline_config()).unwrap();
    assert_eq!(chain.available(), vec![StrategyKind::Direct]);

    let hints = FetchHints {
        strategies: vec![StrategyKind::HeadlessBrowser],
        ..Default::default()
    };
    let err = chain
        .fetch("https://www.linkedin.com/jobs/search", &hints, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Unavailable(_)));
}

#[tokio::test]
async fn redirects_are_followed_and_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/old");
            then.status(301).header("location", "/new");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/new")
                .header_exists("accept-language");
            then.status(200).body("<html>moved</html>");
        })
        .await;

    let chain = FetchChain::from_config(&pipeline_config()).unwrap();
    let document = chain
        .fetch(&server.url("/old"), &FetchHints::default(), deadline())
        .await
        .unwrap();
    assert_eq!(document.final_url, server.url("/new"));
    assert_eq!(document.status, 200);
}

/// WebDriver endpoint that serves one session showing `title` and `source`.
async fn webdriver<'a>(server: &'a MockServer, title: &str, source: &str) -> httpmock::Mock<'a> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/session");
            then.status(200)
                .json_body(json!({ "value": { "sessionId": "s-1", "capabilities": {} } }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/session/s-1/url");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/session/s-1/title");
            then.status(200).json_body(json!({ "value": title }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/session/s-1/source");
            then.status(200).json_body(json!({ "value": source }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/session/s-1/url");
            then.status(200)
                .json_body(json!({ "value": "https://www.linkedin.com/jobs/search?keywords=rust" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/s-1");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await
}

fn with_browser(server: &MockServer) -> PipelineConfig {
    PipelineConfig {
        webdriver_url: Some(server.url("")),
        browser_settle_ms: 0,
        challenge_timeout_secs: 1,
        ..pipeline_config()
    }
}

#[tokio::test]
async fn headless_browser_returns_rendered_source() {
    let server = MockServer::start_async().await;
    let close = webdriver(&server, "Rust jobs", "<html><body><li>Rust engineer</li></body></html>").await;

    let chain = FetchChain::from_config(&with_browser(&server)).unwrap();
    let hints = FetchHints {
        pinned: Some(StrategyKind::HeadlessBrowser),
        ..Default::default()
    };
    let document = chain
        .fetch("https://www.linkedin.com/jobs/search?keywords=rust", &hints, deadline())
        .await
        .unwrap();

    assert_eq!(document.strategy, StrategyKind::HeadlessBrowser);
    assert!(document.body.contains("Rust engineer"));
    assert_eq!(
        document.final_url,
        "https://www.linkedin.com/jobs/search?keywords=rust"
    );
    close.assert_hits_async(1).await;
}

#[tokio::test]
async fn headless_browser_gives_up_on_a_persistent_challenge() {
    let server = MockServer::start_async().await;
    let close = webdriver(&server, "Just a moment...", CHALLENGE_PAGE).await;

    let chain = FetchChain::from_config(&with_browser(&server)).unwrap();
    let hints = FetchHints {
        pinned: Some(StrategyKind::HeadlessBrowser),
        ..Default::default()
    };
    let err = chain
        .fetch("https://nl.indeed.com/jobs?q=kok", &hints, deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::BotChallenge { .. }));
    close.assert_hits_async(1).await;
}

#[tokio::test]
async fn abandoned_browser_session_is_still_closed() {
    let server = MockServer::start_async().await;
    let close = webdriver(&server, "Rust jobs", "<html><body>slow page</body></html>").await;

    let config = PipelineConfig {
        browser_settle_ms: 3000,
        ..with_browser(&server)
    };
    let chain = FetchChain::from_config(&config).unwrap();
    let hints = FetchHints {
        pinned: Some(StrategyKind::HeadlessBrowser),
        ..Default::default()
    };
    let err = chain
        .fetch(
            "https://www.linkedin.com/jobs/search?keywords=rust",
            &hints,
            Instant::now() + Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)));

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        while close.hits_async().await == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(closed.is_ok(), "session left open after the deadline");
}
