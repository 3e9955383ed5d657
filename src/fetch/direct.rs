use std::time::Duration;

use async_trait::async_trait;

use super::{FetchStrategy, FetchedDocument, browser_headers, classify_response};
use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::models::source::{FetchHints, StrategyKind};

const MAX_REDIRECTS: usize = 10;

/// Plain GET with browser-like headers.
pub struct DirectHttp {
    client: reqwest::Client,
    timeout: Duration,
}

impl DirectHttp {
    pub fn new(config: &PipelineConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(browser_headers(config))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.request_timeout())
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout: config.request_timeout(),
        })
    }
}

#[async_trait]
impl FetchStrategy for DirectHttp {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn budget(&self, _hints: &FetchHints) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &str, _hints: &FetchHints) -> Result<FetchedDocument, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        classify_response(status, &body)?;

        Ok(FetchedDocument {
            body,
            final_url,
            status,
            strategy: StrategyKind::Direct,
        })
    }
}
