//! Record store consumed by the pipeline.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::job::{DedupKey, JobRecord};
use crate::models::source::{SourceBookkeeping, SourceDescriptor};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_active_sources(&self) -> Result<Vec<SourceDescriptor>, StoreError>;

    async fn get_source(&self, id: i32) -> Result<Option<SourceDescriptor>, StoreError>;

    async fn update_source_bookkeeping(
        &self,
        id: i32,
        update: &SourceBookkeeping,
    ) -> Result<(), StoreError>;

    async fn find_job_by_dedup_key(
        &self,
        source_id: i32,
        key: &DedupKey,
    ) -> Result<Option<JobRecord>, StoreError>;

    /// Insert a new record (`job.id` is `None`) or overwrite an existing one.
    /// Returns the storage id.
    async fn upsert_job(&self, job: &JobRecord) -> Result<i32, StoreError>;
}
