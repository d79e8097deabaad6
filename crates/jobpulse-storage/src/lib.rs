//! Persistence port and the batch loader that turns cleaned records into
//! relational rows with get-or-create semantics.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use jobpulse_clean::skills::category_label;
use jobpulse_clean::{validate_location, LocationCheck};
use jobpulse_core::{CleanRecord, LoadReport, SkillsByUrl};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "jobpulse-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Insertable job fact row with its dimension ids already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub title: String,
    pub company_id: Option<i64>,
    pub location_id: Option<i64>,
    pub description: String,
    pub url: String,
    pub experience_level: String,
    pub job_type: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub posted_date: Option<NaiveDate>,
    pub portal: String,
}

/// Row counts across the schema, the operator-facing health signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub jobs: i64,
    pub companies: i64,
    pub skills: i64,
    pub locations: i64,
}

/// Persistence contract for the ingestion pipeline.
///
/// Every get-or-create must resolve conflicts atomically in the adapter
/// (insert-or-ignore returning the surviving id), so concurrent writers
/// creating the same dimension value converge on one row.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Company identity is the exact, case-sensitive name.
    async fn get_or_create_company(&self, name: &str) -> Result<i64, StoreError>;

    /// Location identity is the canonical city; state is recorded on first
    /// creation only.
    async fn get_or_create_location(
        &self,
        city: &str,
        state: Option<&str>,
    ) -> Result<i64, StoreError>;

    /// Skill identity is case-insensitive; the category is set once at
    /// creation and never overwritten afterwards.
    async fn get_or_create_skill(
        &self,
        name: &str,
        category: Option<&str>,
    ) -> Result<i64, StoreError>;

    async fn skill_category(&self, name: &str) -> Result<Option<String>, StoreError>;

    async fn find_job_id_by_url(&self, url: &str) -> Result<Option<i64>, StoreError>;

    /// Insert a job, or return the existing id when the URL is already
    /// present (a concurrent writer may win the race; both end up with the
    /// same id).
    async fn insert_job(&self, job: &NewJob) -> Result<i64, StoreError>;

    /// Idempotent; re-linking an existing pair is a no-op.
    async fn link_job_skill(&self, job_id: i64, skill_id: i64) -> Result<(), StoreError>;

    /// All stored location rows, for the read-only audit pass.
    async fn list_location_cities(&self) -> Result<Vec<(i64, String)>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

enum Disposition {
    Inserted,
    Skipped,
    BadLocation,
}

/// Loads cleaned batches into a [`JobStore`], one record at a time, so a
/// single bad record never takes the batch down with it.
pub struct StorageLoader {
    store: Arc<dyn JobStore>,
}

impl StorageLoader {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, records: &[CleanRecord], skills: &SkillsByUrl) -> LoadReport {
        let mut report = LoadReport::default();
        for record in records {
            match self.load_one(record, skills.get(&record.url)).await {
                Ok(Disposition::Inserted) => report.inserted += 1,
                Ok(Disposition::Skipped) => report.skipped += 1,
                Ok(Disposition::BadLocation) => {
                    warn!(url = %record.url, city = %record.city, "record failed load-time location check");
                    report.errored += 1;
                }
                Err(err) => {
                    warn!(url = %record.url, error = %err, "record failed to load");
                    report.errored += 1;
                }
            }
        }
        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            errored = report.errored,
            "batch load complete"
        );
        report
    }

    async fn load_one(
        &self,
        record: &CleanRecord,
        skills: Option<&Vec<String>>,
    ) -> Result<Disposition, StoreError> {
        if let Some(job_id) = self.store.find_job_id_by_url(&record.url).await? {
            // Re-scrapes never mutate the job row; skill links are still
            // refreshed since linking is idempotent.
            if let Some(skills) = skills {
                self.link_skills(job_id, skills).await?;
            }
            return Ok(Disposition::Skipped);
        }

        // The cleaner already validated this record; re-check the scraped
        // location string so the store can never hold a job pointing at an
        // invalid location. The full string, not the bare city, keeps the
        // country marker that permissively accepted cities depend on.
        let LocationCheck::Valid { city, state, .. } = validate_location(&record.location) else {
            return Ok(Disposition::BadLocation);
        };

        let company_id = match &record.company {
            Some(name) => Some(self.store.get_or_create_company(name).await?),
            None => None,
        };
        let location_id = Some(
            self.store
                .get_or_create_location(&city, state.as_deref().or(record.state.as_deref()))
                .await?,
        );

        let job_id = self
            .store
            .insert_job(&NewJob {
                title: record.title.clone(),
                company_id,
                location_id,
                description: record.description.clone(),
                url: record.url.clone(),
                experience_level: record.experience_level.as_str().to_string(),
                job_type: record.job_type.as_str().to_string(),
                salary_min: record.salary_min,
                salary_max: record.salary_max,
                posted_date: record.posted_date,
                portal: record.portal.clone(),
            })
            .await?;

        if let Some(skills) = skills {
            self.link_skills(job_id, skills).await?;
        }
        Ok(Disposition::Inserted)
    }

    async fn link_skills(&self, job_id: i64, skills: &[String]) -> Result<(), StoreError> {
        for skill in skills {
            // Extracted skills carry no category; a later seed pass may have
            // set one already and it stays untouched either way.
            let skill_id = self.store.get_or_create_skill(skill, None).await?;
            self.store.link_job_skill(job_id, skill_id).await?;
        }
        Ok(())
    }
}

/// Pre-populate the skill dimension from a category -> names vocabulary.
/// Categories are assigned at creation; existing skills keep theirs.
pub async fn seed_skills(
    store: &dyn JobStore,
    seed: &BTreeMap<String, Vec<String>>,
) -> Result<usize, StoreError> {
    let mut seen = 0usize;
    for (category, names) in seed {
        let label = category_label(category);
        for name in names {
            store.get_or_create_skill(name, Some(&label)).await?;
            seen += 1;
        }
    }
    info!(skills = seen, "skill seed pass complete");
    Ok(seen)
}
