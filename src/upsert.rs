//! Insert-or-update of normalized records against the store.

use std::collections::HashSet;

use crate::error::StoreError;
use crate::models::job::{DedupKey, JobRecord};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i32),
    Updated(i32),
    /// The key was already saved earlier in this pass.
    Duplicate,
}

/// Upserts the records of one pass. Tracks saved keys so a key repeated
/// inside the batch is written once.
pub struct Upserter<'a> {
    store: &'a dyn Store,
    saved: HashSet<DedupKey>,
}

impl<'a> Upserter<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            saved: HashSet::new(),
        }
    }

    pub async fn upsert(&mut self, record: JobRecord) -> Result<UpsertOutcome, StoreError> {
        let key = record.dedup_key();
        if self.saved.contains(&key) {
            return Ok(UpsertOutcome::Duplicate);
        }

        let outcome = match self
            .store
            .find_job_by_dedup_key(record.source_id, &key)
            .await?
        {
            Some(mut existing) => {
                existing.absorb(record);
                UpsertOutcome::Updated(self.store.upsert_job(&existing).await?)
            }
            None => UpsertOutcome::Created(self.store.upsert_job(&record).await?),
        };

        self.saved.insert(key);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::job::{EmploymentType, ExternalIdOrigin, JobStatus};
    use crate::store::MemoryStore;

    fn record(external_id: &str, origin: ExternalIdOrigin, title: &str) -> JobRecord {
        JobRecord {
            id: None,
            source_id: 1,
            external_id: external_id.to_string(),
            id_origin: origin,
            external_url: None,
            title: title.to_string(),
            description: "Description".to_string(),
            company: None,
            location: None,
            salary: None,
            employment_type: EmploymentType::FullTime,
            status: JobStatus::Active,
            published_at: None,
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_pass_updates_instead_of_inserting() {
        let store = MemoryStore::new();

        let mut first = Upserter::new(&store);
        let created = first
            .upsert(record("a", ExternalIdOrigin::Supplied, "Welder"))
            .await
            .unwrap();
        assert!(matches!(created, UpsertOutcome::Created(_)));

        let mut second = Upserter::new(&store);
        let mut fresh = record("a", ExternalIdOrigin::Supplied, "Welder");
        fresh.location = Some("Delft".to_string());
        let updated = second.upsert(fresh).await.unwrap();

        assert_eq!(
            updated,
            match created {
                UpsertOutcome::Created(id) => UpsertOutcome::Updated(id),
                other => other,
            }
        );
        assert_eq!(store.job_count().await, 1);
        assert_eq!(store.jobs(1).await[0].location.as_deref(), Some("Delft"));
    }

    #[tokio::test]
    async fn hashed_records_match_on_title() {
        let store = MemoryStore::new();
        let mut upserter = Upserter::new(&store);
        upserter
            .upsert(record("job-9", ExternalIdOrigin::Url, "Painter"))
            .await
            .unwrap();

        // Same title, but this sighting had no URL and got a hashed id.
        let mut next = Upserter::new(&store);
        let outcome = next
            .upsert(record("h-0011", ExternalIdOrigin::Hashed, "Painter"))
            .await
            .unwrap();
        assert!(matches!(outcome, UpsertOutcome::Updated(_)));

        let jobs = store.jobs(1).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].external_id, "job-9");
    }

    #[tokio::test]
    async fn hashed_titles_differing_in_case_are_one_job() {
        let store = MemoryStore::new();
        let mut upserter = Upserter::new(&store);
        let first = upserter
            .upsert(record("h-77", ExternalIdOrigin::Hashed, "Night Nurse"))
            .await
            .unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));
        let second = upserter
            .upsert(record("h-77", ExternalIdOrigin::Hashed, "night  nurse"))
            .await
            .unwrap();
        assert_eq!(second, UpsertOutcome::Duplicate);

        let mut next_pass = Upserter::new(&store);
        let again = next_pass
            .upsert(record("h-77", ExternalIdOrigin::Hashed, "NIGHT NURSE"))
            .await
            .unwrap();
        assert!(matches!(again, UpsertOutcome::Updated(_)));
        assert_eq!(store.job_count().await, 1);
    }

    #[tokio::test]
    async fn repeated_key_in_one_batch_is_a_duplicate() {
        let store = MemoryStore::new();
        let mut upserter = Upserter::new(&store);
        upserter
            .upsert(record("a", ExternalIdOrigin::Supplied, "Welder"))
            .await
            .unwrap();
        let again = upserter
            .upsert(record("a", ExternalIdOrigin::Supplied, "Welder"))
            .await
            .unwrap();
        assert_eq!(again, UpsertOutcome::Duplicate);
        assert_eq!(store.job_count().await, 1);
    }
}
