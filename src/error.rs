use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Classified failure of a single fetch strategy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("bot challenge detected ({marker})")]
    BotChallenge { marker: String },

    #[error("not found (HTTP {status})")]
    NotFound { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    /// Whether the chain should move on to the next strategy.
    pub fn escalates(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. }
                | FetchError::BotChallenge { .. }
                | FetchError::Timeout(_)
                | FetchError::Unavailable(_)
        )
    }

    /// Ranking used to pick the error reported once every strategy failed.
    pub(crate) fn severity(&self) -> u8 {
        match self {
            FetchError::BotChallenge { .. } => 5,
            FetchError::RateLimited { .. } => 4,
            FetchError::NotFound { .. } => 3,
            FetchError::Timeout(_) => 2,
            FetchError::Transport(_) => 1,
            FetchError::Unavailable(_) => 0,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            FetchError::RateLimited { .. } => "rate-limited",
            FetchError::BotChallenge { .. } => "bot-challenge",
            FetchError::NotFound { .. } => "not-found",
            FetchError::Transport(_) | FetchError::Timeout(_) | FetchError::Unavailable(_) => {
                "transport-error"
            }
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// The document could not be read in the format its parser expects.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unexpected document root <{0}>")]
    UnexpectedRoot(String),

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("invalid detail URL pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("cron scheduler error: {0}")]
    Cron(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a whole pass, as seen by callers of the runner.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("source {0} not found")]
    SourceNotFound(i32),

    #[error("source {0} is inactive")]
    SourceInactive(i32),

    #[error("a pass for source {0} is already running")]
    AlreadyRunning(i32),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("pass cancelled")]
    Cancelled,

    #[error("pass exceeded its {0:?} deadline")]
    TimedOut(Duration),

    #[error("source {source_id} deactivated after {cause}")]
    Deactivated {
        source_id: i32,
        cause: FetchError,
        hint: String,
    },
}

impl ScrapeError {
    /// Operator-facing advice, when there is any.
    pub fn remediation_hint(&self) -> Option<String> {
        match self {
            ScrapeError::Deactivated { hint, .. } => Some(hint.clone()),
            ScrapeError::Fetch(FetchError::BotChallenge { .. }) => Some(
                "this source is behind bot protection; enable the render proxy or a headless browser, or switch to a feed-based source".to_string(),
            ),
            ScrapeError::Fetch(FetchError::RateLimited { .. }) => Some(
                "this source is rate limiting requests; raise its scrape interval".to_string(),
            ),
            ScrapeError::Fetch(FetchError::NotFound { .. }) => {
                Some("the source URL no longer resolves; check the configured URL".to_string())
            }
            ScrapeError::Parse(_) => Some(
                "the document no longer matches the configured parser; check the parser kind and selectors".to_string(),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, hint) = match &self {
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::Scrape(e) => {
                let status = match e {
                    ScrapeError::SourceNotFound(_) => StatusCode::NOT_FOUND,
                    ScrapeError::SourceInactive(_) => StatusCode::BAD_REQUEST,
                    ScrapeError::AlreadyRunning(_) => StatusCode::CONFLICT,
                    ScrapeError::Deactivated { .. } | ScrapeError::Parse(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    ScrapeError::Fetch(_) => StatusCode::BAD_GATEWAY,
                    ScrapeError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
                    ScrapeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                    ScrapeError::Store(store) => {
                        tracing::error!("Storage error during pass: {store}");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string(), e.remediation_hint())
            }
            AppError::Scheduler(e) => {
                tracing::error!("Scheduler error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match hint {
            Some(hint) => axum::Json(json!({ "error": message, "hint": hint })),
            None => axum::Json(json!({ "error": message })),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_errors_escalate() {
        assert!(FetchError::RateLimited { status: 429 }.escalates());
        assert!(
            FetchError::BotChallenge {
                marker: "cf-chl".to_string()
            }
            .escalates()
        );
        assert!(FetchError::Unavailable("no key".to_string()).escalates());
        assert!(!FetchError::Transport("dns".to_string()).escalates());
        assert!(!FetchError::NotFound { status: 404 }.escalates());
    }

    #[test]
    fn deactivation_carries_its_hint() {
        let err = ScrapeError::Deactivated {
            source_id: 3,
            cause: FetchError::BotChallenge {
                marker: "Just a moment".to_string(),
            },
            hint: "switch to a feed".to_string(),
        };
        assert_eq!(err.remediation_hint().as_deref(), Some("switch to a feed"));
        assert!(err.to_string().contains("bot challenge"));
    }
}
