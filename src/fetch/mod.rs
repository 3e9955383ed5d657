//! Fetch strategy chain.
//!
//! A source's document is requested through an ordered list of strategies.
//! Blocking responses (403/429, challenge interstitials) and unavailable
//! strategies escalate to the next one; not-found and transport failures end
//! the chain since no other strategy would fare better.

pub mod browser;
pub mod direct;
pub mod render_proxy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::models::source::{FetchHints, StrategyKind};

pub use browser::HeadlessBrowser;
pub use direct::DirectHttp;
pub use render_proxy::RenderProxy;

/// Substrings (lowercase) that identify an anti-bot interstitial instead of
/// the requested page.
const CHALLENGE_MARKERS: &[&str] = &[
    "<title>just a moment",
    "cf_chl_opt",
    "challenge-platform/h/",
    "attention required! | cloudflare",
    "checking your browser before accessing",
    "px-captcha",
    "captcha-delivery.com",
    "verify you are human",
    "access to this page has been denied",
];

/// A document returned by one of the strategies.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub strategy: StrategyKind,
}

/// One way of obtaining a document.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Upper bound for a single fetch with these hints.
    fn budget(&self, hints: &FetchHints) -> Duration;

    async fn fetch(&self, url: &str, hints: &FetchHints) -> Result<FetchedDocument, FetchError>;
}

/// The challenge marker found in `body`, if any.
pub fn detect_challenge(body: &str) -> Option<&'static str> {
    let lowered = body.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .copied()
        .find(|marker| lowered.contains(marker))
}

/// Classify an HTTP response from the target site.
pub fn classify_response(status: u16, body: &str) -> Result<(), FetchError> {
    if let Some(marker) = detect_challenge(body)
        && matches!(status, 200..=299 | 403 | 429 | 503)
    {
        return Err(FetchError::BotChallenge {
            marker: marker.to_string(),
        });
    }
    match status {
        200..=299 => Ok(()),
        403 | 429 => Err(FetchError::RateLimited { status }),
        404 | 410 => Err(FetchError::NotFound { status }),
        _ => Err(FetchError::Transport(format!("unexpected HTTP status {status}"))),
    }
}

/// Header set of a desktop browser navigating to a page.
pub(crate) fn browser_headers(config: &PipelineConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    let language = HeaderValue::from_str(&config.accept_language)
        .unwrap_or_else(|_| HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ACCEPT_LANGUAGE, language);
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers
}

/// Ordered strategies plus the logic that walks them.
#[derive(Clone)]
pub struct FetchChain {
    strategies: Vec<Arc<dyn FetchStrategy>>,
}

impl FetchChain {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Every strategy the configuration makes usable. Strategies missing here
    /// are reported as unavailable when a source asks for them.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FetchError> {
        let mut strategies: Vec<Arc<dyn FetchStrategy>> = vec![Arc::new(DirectHttp::new(config)?)];
        match config.render_proxy() {
            Some((endpoint, api_key)) => {
                strategies.push(Arc::new(RenderProxy::new(endpoint, api_key, config)?));
            }
            None => tracing::info!("Render proxy not configured; strategy disabled"),
        }
        match config.webdriver_url.as_deref().filter(|u| !u.is_empty()) {
            Some(webdriver) => strategies.push(Arc::new(HeadlessBrowser::new(webdriver, config)?)),
            None => tracing::info!("WEBDRIVER_URL not set; headless browser disabled"),
        }
        Ok(Self::new(strategies))
    }

    pub fn available(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    fn strategy(&self, kind: StrategyKind) -> Option<&Arc<dyn FetchStrategy>> {
        self.strategies.iter().find(|s| s.kind() == kind)
    }

    /// Walk the source's strategy order until one returns a document or the
    /// deadline passes. When all fail, the most telling error is returned.
    pub async fn fetch(
        &self,
        url: &str,
        hints: &FetchHints,
        deadline: Instant,
    ) -> Result<FetchedDocument, FetchError> {
        let mut failures: Vec<(StrategyKind, FetchError)> = Vec::new();

        for kind in hints.strategy_order() {
            let Some(strategy) = self.strategy(kind) else {
                tracing::debug!(strategy = %kind, "Strategy not configured, skipping");
                failures.push((kind, FetchError::Unavailable(format!("{kind} is not configured"))));
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                failures.push((kind, FetchError::Timeout(Duration::ZERO)));
                break;
            }
            let budget = strategy.budget(hints).min(remaining);

            let outcome = match tokio::time::timeout(budget, strategy.fetch(url, hints)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Timeout(budget)),
            };

            match outcome {
                Ok(document) => {
                    tracing::info!(
                        strategy = %kind,
                        url,
                        status = document.status,
                        bytes = document.body.len(),
                        "Fetched document"
                    );
                    return Ok(document);
                }
                Err(e) => {
                    let escalate = e.escalates();
                    tracing::warn!(
                        strategy = %kind,
                        url,
                        class = e.class(),
                        escalate,
                        "Fetch strategy failed: {e}"
                    );
                    failures.push((kind, e));
                    if !escalate {
                        break;
                    }
                }
            }
        }

        Err(final_error(failures))
    }
}

/// Pick the error that best describes a failed chain: the one that stopped
/// it, else the most severe.
fn final_error(mut failures: Vec<(StrategyKind, FetchError)>) -> FetchError {
    let stopped = failures.last().is_some_and(|(_, e)| !e.escalates());
    if stopped && let Some((_, e)) = failures.pop() {
        return e;
    }
    failures
        .into_iter()
        .map(|(_, e)| e)
        .reduce(|best, e| if e.severity() > best.severity() { e } else { best })
        .unwrap_or_else(|| FetchError::Unavailable("no fetch strategy permitted".to_string()))
}
