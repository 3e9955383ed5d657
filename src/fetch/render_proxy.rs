use std::time::Duration;

use async_trait::async_trait;

use super::{FetchStrategy, FetchedDocument, detect_challenge};
use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::models::source::{FetchHints, StrategyKind};

/// Managed rendering service with a ScraperAPI-style GET interface:
/// `GET {endpoint}?api_key=..&url=..&render=true&country_code=..`.
/// The service runs the page in its own browser pool and returns the HTML.
pub struct RenderProxy {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl RenderProxy {
    pub fn new(endpoint: &str, api_key: &str, config: &PipelineConfig) -> Result<Self, FetchError> {
        // Rendering services retry internally, so the budget is wider than a
        // direct request.
        let timeout = config.request_timeout() * 2;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    fn query(&self, url: &str, hints: &FetchHints) -> Vec<(&'static str, String)> {
        let render = &hints.render;
        let mut query = vec![
            ("api_key", self.api_key.clone()),
            ("url", url.to_string()),
            ("render", render.execute_js.unwrap_or(true).to_string()),
        ];
        if let Some(wait) = render.wait_ms {
            query.push(("wait", wait.to_string()));
        }
        if let Some(country) = render.proxy_country.as_deref().filter(|c| !c.is_empty()) {
            query.push(("country_code", country.to_lowercase()));
        }
        query
    }
}

#[async_trait]
impl FetchStrategy for RenderProxy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RenderProxy
    }

    fn budget(&self, hints: &FetchHints) -> Duration {
        self.timeout + Duration::from_millis(hints.render.wait_ms.unwrap_or(0))
    }

    async fn fetch(&self, url: &str, hints: &FetchHints) -> Result<FetchedDocument, FetchError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&self.query(url, hints))
            .timeout(self.budget(hints))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        match status {
            200..=299 => {}
            // Bad key or exhausted plan: the proxy is out of play, not the target.
            401 | 402 | 403 => {
                return Err(FetchError::Unavailable(format!(
                    "render proxy refused the request (HTTP {status})"
                )));
            }
            429 => return Err(FetchError::RateLimited { status }),
            404 | 410 => return Err(FetchError::NotFound { status }),
            // The service gave up after its own retries.
            _ => {
                return Err(FetchError::Unavailable(format!(
                    "render proxy failed (HTTP {status})"
                )));
            }
        }

        if let Some(marker) = detect_challenge(&body) {
            return Err(FetchError::BotChallenge {
                marker: marker.to_string(),
            });
        }

        Ok(FetchedDocument {
            body,
            final_url: url.to_string(),
            status,
            strategy: StrategyKind::RenderProxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::RenderOptions;

    #[test]
    fn query_carries_render_options() {
        let proxy = RenderProxy::new(
            "https://render.test/",
            "k3y",
            &PipelineConfig::default(),
        )
        .unwrap();
        let hints = FetchHints {
            render: RenderOptions {
                wait_ms: Some(2500),
                execute_js: None,
                proxy_country: Some("NL".to_string()),
            },
            ..Default::default()
        };
        let query = proxy.query("https://nl.indeed.com/jobs?q=x", &hints);
        assert!(query.contains(&("api_key", "k3y".to_string())));
        assert!(query.contains(&("render", "true".to_string())));
        assert!(query.contains(&("wait", "2500".to_string())));
        assert!(query.contains(&("country_code", "nl".to_string())));
        assert_eq!(proxy.budget(&hints), Duration::from_millis(62_500));
    }
}
