//! In-memory [`JobStore`] with the same conflict semantics as Postgres,
//! for tests and dry runs without a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{JobStore, NewJob, StoreError, StoreStats};

#[derive(Debug, Clone)]
struct SkillRow {
    name: String,
    category: Option<String>,
}

#[derive(Debug, Clone)]
struct JobRow {
    url: String,
    salary_min: Option<f64>,
    #[allow(dead_code)]
    posted_date: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Inner {
    companies: Vec<String>,
    locations: Vec<(String, Option<String>)>,
    skills: Vec<SkillRow>,
    jobs: Vec<JobRow>,
    job_skills: BTreeSet<(i64, i64)>,
    jobs_by_url: HashMap<String, i64>,
}

#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex not poisoned")
    }

    pub fn company_names(&self) -> Vec<String> {
        self.lock().companies.clone()
    }

    pub fn job_skill_count(&self) -> usize {
        self.lock().job_skills.len()
    }

    pub fn job_salary_min(&self, url: &str) -> Option<f64> {
        let inner = self.lock();
        inner
            .jobs
            .iter()
            .find(|job| job.url == url)
            .and_then(|job| job.salary_min)
    }
}

#[async_trait]
impl JobStore for MemStore {
    async fn get_or_create_company(&self, name: &str) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        if let Some(pos) = inner.companies.iter().position(|c| c == name) {
            return Ok(pos as i64 + 1);
        }
        inner.companies.push(name.to_string());
        Ok(inner.companies.len() as i64)
    }

    async fn get_or_create_location(
        &self,
        city: &str,
        state: Option<&str>,
    ) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        if let Some(pos) = inner.locations.iter().position(|(c, _)| c == city) {
            return Ok(pos as i64 + 1);
        }
        inner
            .locations
            .push((city.to_string(), state.map(String::from)));
        Ok(inner.locations.len() as i64)
    }

    async fn get_or_create_skill(
        &self,
        name: &str,
        category: Option<&str>,
    ) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        let lower = name.to_lowercase();
        if let Some(pos) = inner
            .skills
            .iter()
            .position(|s| s.name.to_lowercase() == lower)
        {
            return Ok(pos as i64 + 1);
        }
        inner.skills.push(SkillRow {
            name: name.to_string(),
            category: category.map(String::from),
        });
        Ok(inner.skills.len() as i64)
    }

    async fn skill_category(&self, name: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        let lower = name.to_lowercase();
        Ok(inner
            .skills
            .iter()
            .find(|s| s.name.to_lowercase() == lower)
            .and_then(|s| s.category.clone()))
    }

    async fn find_job_id_by_url(&self, url: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.lock().jobs_by_url.get(url).copied())
    }

    async fn insert_job(&self, job: &NewJob) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.jobs_by_url.get(&job.url) {
            return Ok(*existing);
        }
        inner.jobs.push(JobRow {
            url: job.url.clone(),
            salary_min: job.salary_min,
            posted_date: job.posted_date,
        });
        let id = inner.jobs.len() as i64;
        inner.jobs_by_url.insert(job.url.clone(), id);
        Ok(id)
    }

    async fn link_job_skill(&self, job_id: i64, skill_id: i64) -> Result<(), StoreError> {
        self.lock().job_skills.insert((job_id, skill_id));
        Ok(())
    }

    async fn list_location_cities(&self) -> Result<Vec<(i64, String)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .locations
            .iter()
            .enumerate()
            .map(|(idx, (city, _))| (idx as i64 + 1, city.clone()))
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.lock();
        Ok(StoreStats {
            jobs: inner.jobs.len() as i64,
            companies: inner.companies.len() as i64,
            skills: inner.skills.len() as i64,
            locations: inner.locations.len() as i64,
        })
    }
}
