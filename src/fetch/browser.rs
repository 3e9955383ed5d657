//! Headless browser driven through the W3C WebDriver HTTP protocol
//! (chromedriver, geckodriver or a Selenium grid).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::{FetchStrategy, FetchedDocument, detect_challenge};
use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::models::source::{FetchHints, StrategyKind};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// WebDriver wraps every payload in `{"value": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DriverError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Deletes a session that is dropped before [`HeadlessBrowser::close_session`]
/// finished, e.g. when the strategy budget or the pass deadline abandons the
/// fetch mid-page.
struct SessionGuard {
    client: reqwest::Client,
    url: String,
    armed: bool,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(url = %self.url, "No runtime left to close WebDriver session");
            return;
        };
        let client = self.client.clone();
        let url = std::mem::take(&mut self.url);
        runtime.spawn(async move {
            match client.delete(&url).send().await {
                Ok(_) => tracing::debug!(url = %url, "Closed abandoned WebDriver session"),
                Err(e) => tracing::warn!(url = %url, "Failed to close abandoned WebDriver session: {e}"),
            }
        });
    }
}

pub struct HeadlessBrowser {
    client: reqwest::Client,
    webdriver_url: String,
    user_agent: String,
    accept_language: String,
    request_timeout: Duration,
    settle: Duration,
    challenge_timeout: Duration,
}

impl HeadlessBrowser {
    pub fn new(webdriver_url: &str, config: &PipelineConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            webdriver_url: webdriver_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            request_timeout: config.request_timeout(),
            settle: config.browser_settle(),
            challenge_timeout: config.challenge_timeout(),
        })
    }

    fn settle_for(&self, hints: &FetchHints) -> Duration {
        hints
            .render
            .wait_ms
            .map(Duration::from_millis)
            .unwrap_or(self.settle)
    }

    fn capabilities(&self) -> Value {
        let language = self
            .accept_language
            .split(',')
            .next()
            .unwrap_or("en-US")
            .to_string();
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--disable-gpu",
                            "--no-sandbox",
                            "--disable-dev-shm-usage",
                            "--disable-blink-features=AutomationControlled",
                            "--window-size=1366,900",
                            format!("--user-agent={}", self.user_agent),
                            format!("--lang={language}"),
                        ]
                    }
                }
            }
        })
    }

    async fn command<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.webdriver_url);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let error = resp
                .json::<Envelope<DriverError>>()
                .await
                .map(|e| e.value)
                .unwrap_or_default();
            return Err(classify_driver_error(status.as_u16(), &error));
        }

        resp.json::<Envelope<T>>()
            .await
            .map(|e| e.value)
            .map_err(|e| FetchError::Transport(format!("malformed WebDriver response: {e}")))
    }

    async fn open_session(&self) -> Result<String, FetchError> {
        let session: NewSession = self
            .command(reqwest::Method::POST, "/session", Some(self.capabilities()))
            .await
            .map_err(|e| match e {
                // A driver that cannot start a browser is an unavailable strategy.
                FetchError::Transport(msg) => FetchError::Unavailable(msg),
                other => other,
            })?;
        Ok(session.session_id)
    }

    async fn close_session(&self, session_id: &str) {
        let path = format!("/session/{session_id}");
        if let Err(e) = self
            .command::<Value>(reqwest::Method::DELETE, &path, None)
            .await
        {
            tracing::warn!(session_id, "Failed to close WebDriver session: {e}");
        }
    }

    async fn browse(
        &self,
        session_id: &str,
        url: &str,
        hints: &FetchHints,
    ) -> Result<FetchedDocument, FetchError> {
        let base = format!("/session/{session_id}");
        self.command::<Value>(
            reqwest::Method::POST,
            &format!("{base}/url"),
            Some(json!({ "url": url })),
        )
        .await?;

        tokio::time::sleep(self.settle_for(hints)).await;

        // Challenge pages usually clear themselves after a few seconds of
        // script execution; poll until the markers are gone.
        let started = Instant::now();
        let source = loop {
            let title: String = self
                .command(reqwest::Method::GET, &format!("{base}/title"), None)
                .await?;
            let source: String = self
                .command(reqwest::Method::GET, &format!("{base}/source"), None)
                .await?;

            let marker = detect_challenge(&format!("<title>{title}</title>"))
                .or_else(|| detect_challenge(&source));
            let Some(marker) = marker else {
                break source;
            };
            if started.elapsed() >= self.challenge_timeout {
                return Err(FetchError::BotChallenge {
                    marker: marker.to_string(),
                });
            }
            tracing::debug!(url, marker, "Waiting out challenge page");
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        let final_url: String = self
            .command(reqwest::Method::GET, &format!("{base}/url"), None)
            .await
            .unwrap_or_else(|_| url.to_string());

        Ok(FetchedDocument {
            body: source,
            final_url,
            status: 200,
            strategy: StrategyKind::HeadlessBrowser,
        })
    }
}

/// Map a WebDriver error response onto the fetch taxonomy.
fn classify_driver_error(status: u16, error: &DriverError) -> FetchError {
    let detail = if error.message.is_empty() {
        format!("WebDriver returned HTTP {status}")
    } else {
        format!("{}: {}", error.error, error.message)
    };
    match error.error.as_str() {
        "timeout" | "script timeout" => FetchError::Timeout(Duration::ZERO),
        "session not created" => FetchError::Unavailable(detail),
        _ => FetchError::Transport(detail),
    }
}

#[async_trait]
impl FetchStrategy for HeadlessBrowser {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HeadlessBrowser
    }

    fn budget(&self, hints: &FetchHints) -> Duration {
        self.request_timeout * 2 + self.settle_for(hints) + self.challenge_timeout
    }

    async fn fetch(&self, url: &str, hints: &FetchHints) -> Result<FetchedDocument, FetchError> {
        let session_id = self.open_session().await?;
        tracing::debug!(session_id = %session_id, url, "Opened WebDriver session");
        let mut guard = SessionGuard {
            client: self.client.clone(),
            url: format!("{}/session/{session_id}", self.webdriver_url),
            armed: true,
        };

        let outcome = self.browse(&session_id, url, hints).await;
        self.close_session(&session_id).await;
        guard.armed = false;
        outcome
    }
}
