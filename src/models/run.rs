use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::source::StrategyKind;

/// Stage of a single scraping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStage {
    Idle,
    Fetching,
    Parsing,
    Normalizing,
    Upserting,
    Done,
    Failed,
}

impl PassStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStage::Idle => "idle",
            PassStage::Fetching => "fetching",
            PassStage::Parsing => "parsing",
            PassStage::Normalizing => "normalizing",
            PassStage::Upserting => "upserting",
            PassStage::Done => "done",
            PassStage::Failed => "failed",
        }
    }
}

/// Outcome of one pass over one source.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub source_id: i32,
    /// Raw jobs extracted from the document.
    pub found: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    /// Raw jobs repeating a dedup key already seen in this pass.
    pub duplicates: u32,
    pub strategy: Option<StrategyKind>,
    /// Per-record problems that did not abort the pass.
    pub stage_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn new(source_id: i32) -> Self {
        let now = Utc::now();
        Self {
            source_id,
            found: 0,
            created: 0,
            updated: 0,
            failed: 0,
            duplicates: 0,
            strategy: None,
            stage_errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn saved(&self) -> u32 {
        self.created + self.updated
    }

    /// Summary stored in the source's `last_error` when some records failed.
    pub fn error_summary(&self) -> Option<String> {
        if self.stage_errors.is_empty() {
            return None;
        }
        let first = &self.stage_errors[0];
        if self.stage_errors.len() == 1 {
            Some(first.clone())
        } else {
            Some(format!(
                "{first} (and {} more record errors)",
                self.stage_errors.len() - 1
            ))
        }
    }
}
