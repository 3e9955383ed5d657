//! One scraping pass for one source: fetch, parse, normalize, upsert, then
//! bookkeeping.
//!
//! Passes for different sources run in parallel up to the worker pool size.
//! A source never has two passes in flight: the second caller gets
//! [`ScrapeError::AlreadyRunning`].

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::PipelineConfig;
use crate::error::{FetchError, ScrapeError};
use crate::fetch::FetchChain;
use crate::models::run::{PassStage, RunResult};
use crate::models::source::{ParserKind, SourceBookkeeping, SourceDescriptor};
use crate::normalize::{NormalizeContext, normalize};
use crate::parsers::{self, ParseContext};
use crate::store::Store;
use crate::upsert::{UpsertOutcome, Upserter};

struct InFlight {
    cancel: CancellationToken,
    stage: PassStage,
}

/// A pass currently executing.
#[derive(Debug, Clone, Serialize)]
pub struct RunningPass {
    pub source_id: i32,
    pub stage: PassStage,
}

/// Removes the in-flight entry when the pass ends, however it ends.
struct PassGuard<'a> {
    in_flight: &'a DashMap<i32, InFlight>,
    source_id: i32,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.source_id);
    }
}

pub struct SourceRunner {
    store: Arc<dyn Store>,
    chain: FetchChain,
    config: Arc<PipelineConfig>,
    permits: Semaphore,
    in_flight: DashMap<i32, InFlight>,
}

impl SourceRunner {
    pub fn new(store: Arc<dyn Store>, chain: FetchChain, config: Arc<PipelineConfig>) -> Self {
        let pool_size = config.worker_pool_size.max(1);
        Self {
            store,
            chain,
            config,
            permits: Semaphore::new(pool_size),
            in_flight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one pass now and wait for its result.
    pub async fn trigger(&self, source_id: i32) -> Result<RunResult, ScrapeError> {
        self.run(source_id).await
    }

    /// Entry point for scheduled ticks. Never fails: outcomes are logged and
    /// recorded on the source.
    pub async fn run_scheduled(&self, source_id: i32) {
        match self.run(source_id).await {
            Ok(result) => tracing::debug!(source_id, saved = result.saved(), "Scheduled pass done"),
            Err(ScrapeError::AlreadyRunning(_)) => {
                tracing::info!(source_id, "Previous pass still running, skipping tick");
            }
            Err(ScrapeError::SourceInactive(_) | ScrapeError::SourceNotFound(_)) => {
                tracing::debug!(source_id, "Source no longer active, skipping tick");
            }
            Err(e) => tracing::warn!(source_id, "Scheduled pass failed: {e}"),
        }
    }

    /// Cancel the in-flight pass of a source. Returns whether one was running.
    pub fn cancel(&self, source_id: i32) -> bool {
        match self.in_flight.get(&source_id) {
            Some(pass) => {
                tracing::info!(source_id, stage = pass.stage.as_str(), "Cancelling pass");
                pass.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, source_id: i32) -> bool {
        self.in_flight.contains_key(&source_id)
    }

    pub fn running(&self) -> Vec<RunningPass> {
        let mut passes: Vec<RunningPass> = self
            .in_flight
            .iter()
            .map(|entry| RunningPass {
                source_id: *entry.key(),
                stage: entry.value().stage,
            })
            .collect();
        passes.sort_by_key(|p| p.source_id);
        passes
    }

    fn claim(&self, source_id: i32) -> Result<(PassGuard<'_>, CancellationToken), ScrapeError> {
        match self.in_flight.entry(source_id) {
            Entry::Occupied(_) => Err(ScrapeError::AlreadyRunning(source_id)),
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(InFlight {
                    cancel: cancel.clone(),
                    stage: PassStage::Idle,
                });
                Ok((
                    PassGuard {
                        in_flight: &self.in_flight,
                        source_id,
                    },
                    cancel,
                ))
            }
        }
    }

    fn set_stage(&self, source_id: i32, stage: PassStage) {
        if let Some(mut pass) = self.in_flight.get_mut(&source_id) {
            pass.stage = stage;
        }
        tracing::debug!(source_id, stage = stage.as_str(), "Pass stage");
    }

    fn stage(&self, source_id: i32) -> PassStage {
        self.in_flight
            .get(&source_id)
            .map(|pass| pass.stage)
            .unwrap_or(PassStage::Idle)
    }

    async fn run(&self, source_id: i32) -> Result<RunResult, ScrapeError> {
        let (_guard, cancel) = self.claim(source_id)?;

        let source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or(ScrapeError::SourceNotFound(source_id))?;
        if !source.is_active {
            return Err(ScrapeError::SourceInactive(source_id));
        }

        let parser = source.parser_kind();
        let pass_timeout = self.config.pass_timeout();
        let mut result = RunResult::new(source_id);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
            outcome = async {
                let Ok(_permit) = self.permits.acquire().await else {
                    return Err(ScrapeError::Cancelled);
                };
                result.started_at = Utc::now();
                tracing::info!(source_id, source = %source.name, parser = %parser, "Starting pass");

                let deadline = Instant::now() + pass_timeout;
                match tokio::time::timeout_at(deadline, self.execute(&source, parser, deadline, &mut result)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ScrapeError::TimedOut(pass_timeout)),
                }
            } => outcome,
        };

        result.finished_at = Utc::now();
        match outcome {
            Ok(()) => {
                self.set_stage(source_id, PassStage::Done);
                tracing::info!(
                    source_id,
                    found = result.found,
                    created = result.created,
                    updated = result.updated,
                    failed = result.failed,
                    duplicates = result.duplicates,
                    strategy = result.strategy.map(|s| s.as_str()),
                    "Pass completed"
                );
                self.record(
                    source_id,
                    SourceBookkeeping {
                        last_scraped_at: result.finished_at,
                        last_success_at: Some(result.finished_at),
                        last_error: Some(result.error_summary()),
                        is_active: None,
                    },
                )
                .await;
                Ok(result)
            }
            Err(error) => {
                let stage = self.stage(source_id);
                self.set_stage(source_id, PassStage::Failed);
                let error = self.escalate(&source, parser, error);
                let deactivate = matches!(error, ScrapeError::Deactivated { .. });

                if deactivate {
                    tracing::error!(source_id, stage = stage.as_str(), "Pass failed, deactivating source: {error}");
                } else {
                    tracing::warn!(source_id, stage = stage.as_str(), "Pass failed: {error}");
                }

                self.record(
                    source_id,
                    SourceBookkeeping {
                        last_scraped_at: result.finished_at,
                        last_success_at: None,
                        last_error: Some(Some(format!("{}: {error}", stage.as_str()))),
                        is_active: deactivate.then_some(false),
                    },
                )
                .await;
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        source: &SourceDescriptor,
        parser: ParserKind,
        deadline: Instant,
        result: &mut RunResult,
    ) -> Result<(), ScrapeError> {
        let source_id = source.id;

        self.set_stage(source_id, PassStage::Fetching);
        let source_url = Url::parse(&source.url)
            .map_err(|e| FetchError::Transport(format!("invalid source URL '{}': {e}", source.url)))?;
        let document = self.chain.fetch(source_url.as_str(), &source.hints, deadline).await?;
        result.strategy = Some(document.strategy);

        self.set_stage(source_id, PassStage::Parsing);
        let base = Url::parse(&document.final_url).unwrap_or(source_url);
        let parse_ctx = ParseContext::new(Some(&base), &source.hints.selectors);
        let raw_jobs = parsers::parse(parser, &document.body, &parse_ctx)?;
        result.found = raw_jobs.len() as u32;

        self.set_stage(source_id, PassStage::Normalizing);
        let normalize_ctx = NormalizeContext {
            source_id,
            default_currency: &self.config.default_currency,
            partner_branding: (parser == ParserKind::PartnerXml)
                .then_some(source.hints.branding_phrases.as_slice()),
            scraped_at: Utc::now(),
        };
        let mut records = Vec::with_capacity(raw_jobs.len());
        for (index, raw) in raw_jobs.into_iter().enumerate() {
            match normalize(raw, &normalize_ctx) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(source_id, index, "Skipping job: {e}");
                    result.failed += 1;
                    result.stage_errors.push(format!("job #{}: {e}", index + 1));
                }
            }
        }

        self.set_stage(source_id, PassStage::Upserting);
        let mut upserter = Upserter::new(self.store.as_ref());
        for record in records {
            let external_id = record.external_id.clone();
            match upserter.upsert(record).await {
                Ok(UpsertOutcome::Created(_)) => result.created += 1,
                Ok(UpsertOutcome::Updated(_)) => result.updated += 1,
                Ok(UpsertOutcome::Duplicate) => result.duplicates += 1,
                Err(e) => {
                    tracing::warn!(source_id, external_id = %external_id, "Failed to save job: {e}");
                    result.failed += 1;
                    result.stage_errors.push(format!("job {external_id}: {e}"));
                }
            }
        }

        Ok(())
    }

    /// Turn a bot challenge on a fragile source family into a deactivation.
    fn escalate(
        &self,
        source: &SourceDescriptor,
        parser: ParserKind,
        error: ScrapeError,
    ) -> ScrapeError {
        match error {
            ScrapeError::Fetch(cause @ FetchError::BotChallenge { .. })
                if self.config.is_fragile(parser) =>
            {
                ScrapeError::Deactivated {
                    source_id: source.id,
                    cause,
                    hint: format!(
                        "'{}' is blocked by bot protection and has been deactivated; switch to a feed-based source for this platform",
                        source.name
                    ),
                }
            }
            other => other,
        }
    }

    async fn record(&self, source_id: i32, update: SourceBookkeeping) {
        if let Err(e) = self
            .store
            .update_source_bookkeeping(source_id, &update)
            .await
        {
            tracing::error!(source_id, "Failed to record pass bookkeeping: {e}");
        }
    }
}
