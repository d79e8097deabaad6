//! Postgres [`JobStore`] adapter. Conflict resolution happens in SQL so
//! concurrent loaders converge without an outer transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{JobStore, NewJob, StoreError, StoreStats};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn get_or_create_company(&self, name: &str) -> Result<i64, StoreError> {
        // DO UPDATE with a no-op assignment makes RETURNING fire on both
        // branches, so the surviving id always comes back.
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO companies (company_name) VALUES ($1)
             ON CONFLICT (company_name)
             DO UPDATE SET company_name = EXCLUDED.company_name
             RETURNING company_id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_or_create_location(
        &self,
        city: &str,
        state: Option<&str>,
    ) -> Result<i64, StoreError> {
        // State stays as first recorded; later calls never rewrite it.
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO locations (city, state) VALUES ($1, $2)
             ON CONFLICT (city)
             DO UPDATE SET city = EXCLUDED.city
             RETURNING location_id",
        )
        .bind(city)
        .bind(state)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_or_create_skill(
        &self,
        name: &str,
        category: Option<&str>,
    ) -> Result<i64, StoreError> {
        // Conflicts on the lower(skill_name) expression index; the existing
        // casing and category win.
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO skills (skill_name, skill_category) VALUES ($1, $2)
             ON CONFLICT ((lower(skill_name)))
             DO UPDATE SET skill_name = skills.skill_name
             RETURNING skill_id",
        )
        .bind(name)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn skill_category(&self, name: &str) -> Result<Option<String>, StoreError> {
        let category = sqlx::query_scalar::<_, Option<String>>(
            "SELECT skill_category FROM skills WHERE lower(skill_name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category.flatten())
    }

    async fn find_job_id_by_url(&self, url: &str) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT job_id FROM jobs WHERE job_url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_job(&self, job: &NewJob) -> Result<i64, StoreError> {
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO jobs (job_title, company_id, location_id, job_description,
                               job_url, experience_level, job_type, salary_min,
                               salary_max, posted_date, source_portal)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (job_url) DO NOTHING
             RETURNING job_id",
        )
        .bind(&job.title)
        .bind(job.company_id)
        .bind(job.location_id)
        .bind(&job.description)
        .bind(&job.url)
        .bind(&job.experience_level)
        .bind(&job.job_type)
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(job.posted_date)
        .bind(&job.portal)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(id) => Ok(id),
            // A concurrent writer won the URL; hand back its row.
            None => {
                let id =
                    sqlx::query_scalar::<_, i64>("SELECT job_id FROM jobs WHERE job_url = $1")
                        .bind(&job.url)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(id)
            }
        }
    }

    async fn link_job_skill(&self, job_id: i64, skill_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO job_skills (job_id, skill_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(job_id)
        .bind(skill_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_location_cities(&self) -> Result<Vec<(i64, String)>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT location_id, city FROM locations ORDER BY location_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let jobs = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        let companies = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM companies")
            .fetch_one(&self.pool)
            .await?;
        let skills = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM skills")
            .fetch_one(&self.pool)
            .await?;
        let locations = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM locations")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            jobs,
            companies,
            skills,
            locations,
        })
    }
}
