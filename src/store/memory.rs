//! In-process store for tests and dry runs. Mirrors the constraints of the
//! PostgreSQL schema (unique `(source_id, external_id)`, non-empty text).

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::error::StoreError;
use crate::models::job::{DedupKey, JobRecord, fold_title};
use crate::models::source::{SourceBookkeeping, SourceDescriptor};

#[derive(Default)]
struct Jobs {
    next_id: i32,
    rows: BTreeMap<i32, JobRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    sources: RwLock<BTreeMap<i32, SourceDescriptor>>,
    jobs: RwLock<Jobs>,
    bookkeeping: RwLock<Vec<(i32, SourceBookkeeping)>>,
    rejected_titles: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: impl IntoIterator<Item = SourceDescriptor>) -> Self {
        Self {
            sources: RwLock::new(sources.into_iter().map(|s| (s.id, s)).collect()),
            ..Self::default()
        }
    }

    /// Insert or replace a source.
    pub async fn put_source(&self, source: SourceDescriptor) {
        self.sources.write().await.insert(source.id, source);
    }

    pub async fn remove_source(&self, id: i32) -> Option<SourceDescriptor> {
        self.sources.write().await.remove(&id)
    }

    /// Apply `f` to a stored source; returns false when it does not exist.
    pub async fn edit_source(&self, id: i32, f: impl FnOnce(&mut SourceDescriptor)) -> bool {
        match self.sources.write().await.get_mut(&id) {
            Some(source) => {
                f(source);
                true
            }
            None => false,
        }
    }

    pub async fn jobs(&self, source_id: i32) -> Vec<JobRecord> {
        self.jobs
            .read()
            .await
            .rows
            .values()
            .filter(|job| job.source_id == source_id)
            .cloned()
            .collect()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.rows.len()
    }

    /// Every bookkeeping update written for a source, oldest first.
    pub async fn bookkeeping(&self, source_id: i32) -> Vec<SourceBookkeeping> {
        self.bookkeeping
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id == source_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    /// Make every save of a job with this title fail.
    pub async fn reject_title(&self, title: &str) {
        self.rejected_titles.write().await.insert(title.to_string());
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_active_sources(&self) -> Result<Vec<SourceDescriptor>, StoreError> {
        Ok(self
            .sources
            .read()
            .await
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn get_source(&self, id: i32) -> Result<Option<SourceDescriptor>, StoreError> {
        Ok(self.sources.read().await.get(&id).cloned())
    }

    async fn update_source_bookkeeping(
        &self,
        id: i32,
        update: &SourceBookkeeping,
    ) -> Result<(), StoreError> {
        {
            let mut sources = self.sources.write().await;
            let source = sources
                .get_mut(&id)
                .ok_or_else(|| StoreError::Rejected(format!("source {id} does not exist")))?;
            source.last_scraped_at = Some(update.last_scraped_at);
            if let Some(success) = update.last_success_at {
                source.last_success_at = Some(success);
            }
            if let Some(error) = &update.last_error {
                source.last_error = error.clone();
            }
            if let Some(active) = update.is_active {
                source.is_active = active;
            }
        }
        self.bookkeeping.write().await.push((id, update.clone()));
        Ok(())
    }

    async fn find_job_by_dedup_key(
        &self,
        source_id: i32,
        key: &DedupKey,
    ) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .rows
            .values()
            .find(|job| {
                job.source_id == source_id
                    && match key {
                        DedupKey::ExternalId(id) => &job.external_id == id,
                        DedupKey::Title(folded) => &fold_title(&job.title) == folded,
                    }
            })
            .cloned())
    }

    async fn upsert_job(&self, job: &JobRecord) -> Result<i32, StoreError> {
        if self.rejected_titles.read().await.contains(&job.title) {
            return Err(StoreError::Rejected(format!("title '{}' is rejected", job.title)));
        }
        if job.title.is_empty() || job.description.is_empty() {
            return Err(StoreError::Rejected(
                "title and description must not be empty".to_string(),
            ));
        }

        let mut jobs = self.jobs.write().await;

        if let Some(id) = job.id {
            let stored = jobs
                .rows
                .get_mut(&id)
                .filter(|stored| stored.source_id == job.source_id)
                .ok_or_else(|| StoreError::Rejected(format!("job {id} does not exist")))?;
            let external_id = stored.external_id.clone();
            let id_origin = stored.id_origin;
            *stored = job.clone();
            stored.external_id = external_id;
            stored.id_origin = id_origin;
            return Ok(id);
        }

        let existing = jobs
            .rows
            .iter()
            .find(|(_, stored)| {
                stored.source_id == job.source_id && stored.external_id == job.external_id
            })
            .map(|(id, _)| *id);
        if let Some(id) = existing
            && let Some(stored) = jobs.rows.get_mut(&id)
        {
            stored.absorb(job.clone());
            return Ok(id);
        }

        jobs.next_id += 1;
        let id = jobs.next_id;
        let mut stored = job.clone();
        stored.id = Some(id);
        jobs.rows.insert(id, stored);
        Ok(id)
    }
}
