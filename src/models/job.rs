use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job as extracted from a source document, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawJob {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub company: Option<String>,
    pub salary_text: Option<String>,
    /// Identifier supplied by the source itself (guid, reference number, data-jk).
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Free-text employment type published by the source ("Full-time", "Stage").
    pub employment_type_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salary {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentType {
    #[default]
    FullTime,
    PartTime,
    Contract,
    Internship,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "full-time",
            EmploymentType::PartTime => "part-time",
            EmploymentType::Contract => "contract",
            EmploymentType::Internship => "internship",
        }
    }
}

impl FromStr for EmploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full-time" => Ok(EmploymentType::FullTime),
            "part-time" => Ok(EmploymentType::PartTime),
            "contract" => Ok(EmploymentType::Contract),
            "internship" => Ok(EmploymentType::Internship),
            other => Err(format!("unknown employment type '{other}'")),
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Active,
    Closed,
    Draft,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Closed => "closed",
            JobStatus::Draft => "draft",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(JobStatus::Active),
            "closed" => Ok(JobStatus::Closed),
            "draft" => Ok(JobStatus::Draft),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Where a record's external id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalIdOrigin {
    /// Published by the source.
    Supplied,
    /// Taken from the detail URL.
    Url,
    /// Hash of source identity and title.
    Hashed,
}

impl ExternalIdOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalIdOrigin::Supplied => "supplied",
            ExternalIdOrigin::Url => "url",
            ExternalIdOrigin::Hashed => "hashed",
        }
    }
}

impl FromStr for ExternalIdOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supplied" => Ok(ExternalIdOrigin::Supplied),
            "url" => Ok(ExternalIdOrigin::Url),
            "hashed" => Ok(ExternalIdOrigin::Hashed),
            other => Err(format!("unknown id origin '{other}'")),
        }
    }
}

/// Key used to decide insert vs. update within one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    ExternalId(String),
    /// Weaker key used when the external id had to be synthesized. Holds the
    /// folded title (see [`fold_title`]).
    Title(String),
}

/// Case- and whitespace-insensitive form of a title. Synthesized ids hash
/// this, and title lookups compare against it.
pub fn fold_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Normalized, persisted job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Storage id; `None` until first saved.
    pub id: Option<i32>,
    pub source_id: i32,
    pub external_id: String,
    pub id_origin: ExternalIdOrigin,
    pub external_url: Option<String>,
    pub title: String,
    pub description: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<Salary>,
    pub employment_type: EmploymentType,
    pub status: JobStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn dedup_key(&self) -> DedupKey {
        match self.id_origin {
            ExternalIdOrigin::Hashed => DedupKey::Title(fold_title(&self.title)),
            ExternalIdOrigin::Supplied | ExternalIdOrigin::Url => {
                DedupKey::ExternalId(self.external_id.clone())
            }
        }
    }

    /// Overwrite the mutable fields of a stored record with a fresh sighting.
    /// Identity (storage id, source, external id) is kept.
    pub fn absorb(&mut self, fresh: JobRecord) {
        self.title = fresh.title;
        self.description = fresh.description;
        self.company = fresh.company.or(self.company.take());
        self.location = fresh.location;
        self.salary = fresh.salary;
        self.employment_type = fresh.employment_type;
        self.status = JobStatus::Active;
        self.external_url = fresh.external_url;
        self.published_at = fresh.published_at.or(self.published_at);
        self.scraped_at = fresh.scraped_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(origin: ExternalIdOrigin) -> JobRecord {
        JobRecord {
            id: Some(7),
            source_id: 1,
            external_id: "abc".to_string(),
            id_origin: origin,
            external_url: Some("https://jobs.test/abc".to_string()),
            title: "Welder".to_string(),
            description: "Weld things".to_string(),
            company: Some("Acme".to_string()),
            location: Some("Utrecht".to_string()),
            salary: None,
            employment_type: EmploymentType::FullTime,
            status: JobStatus::Closed,
            published_at: None,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn hashed_ids_dedup_on_title() {
        assert_eq!(
            record(ExternalIdOrigin::Hashed).dedup_key(),
            DedupKey::Title("welder".to_string())
        );
        assert_eq!(
            record(ExternalIdOrigin::Url).dedup_key(),
            DedupKey::ExternalId("abc".to_string())
        );
    }

    #[test]
    fn folded_titles_ignore_case_and_spacing() {
        assert_eq!(fold_title("  Night \t Nurse "), "night nurse");
        let mut shouting = record(ExternalIdOrigin::Hashed);
        shouting.title = "WELDER".to_string();
        assert_eq!(shouting.dedup_key(), record(ExternalIdOrigin::Hashed).dedup_key());
    }

    #[test]
    fn absorb_reactivates_and_keeps_identity() {
        let mut stored = record(ExternalIdOrigin::Supplied);
        let mut fresh = record(ExternalIdOrigin::Supplied);
        fresh.id = None;
        fresh.description = "Weld more things".to_string();
        fresh.company = None;
        fresh.employment_type = EmploymentType::Contract;

        stored.absorb(fresh);

        assert_eq!(stored.id, Some(7));
        assert_eq!(stored.status, JobStatus::Active);
        assert_eq!(stored.description, "Weld more things");
        assert_eq!(stored.company.as_deref(), Some("Acme"));
        assert_eq!(stored.employment_type, EmploymentType::Contract);
    }
}
