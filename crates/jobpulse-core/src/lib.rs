//! Core domain records, vocabularies, and pipeline report types for jobpulse.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobpulse-core";

/// Currency assumed for salary figures when a portal reports none.
pub const DEFAULT_CURRENCY: &str = "INR";

/// A job posting as handed over by a portal adapter, before any cleaning.
///
/// Every field except `portal` is optional; portals differ wildly in what
/// they surface and the cleaner decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub portal: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
}

impl RawRecord {
    /// True when every payload field is absent or blank.
    pub fn is_empty(&self) -> bool {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().map(str::trim).unwrap_or("").is_empty()
        }
        blank(&self.title)
            && blank(&self.company)
            && blank(&self.location)
            && blank(&self.description)
            && blank(&self.url)
            && self.salary_min.is_none()
            && self.salary_max.is_none()
    }
}

/// Normalized experience tiers stored on job rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    #[default]
    EntryLevel,
    MidLevel,
    SeniorLevel,
    Internship,
}

impl ExperienceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EntryLevel => "Entry Level",
            Self::MidLevel => "Mid Level",
            Self::SeniorLevel => "Senior Level",
            Self::Internship => "Internship",
        }
    }
}

/// Normalized job-type vocabulary stored on job rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    #[default]
    FullTime,
    PartTime,
    Contract,
    Remote,
    Hybrid,
    OnSite,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullTime => "Full-time",
            Self::PartTime => "Part-time",
            Self::Contract => "Contract",
            Self::Remote => "Remote",
            Self::Hybrid => "Hybrid",
            Self::OnSite => "On-site",
        }
    }
}

/// A record that survived cleaning and is ready for the storage loader.
///
/// `city` is always a validated, canonical Indian city; `location` keeps the
/// scraped string it was derived from, so the loader can re-run the same
/// validation with full context; `url` is the dedup identity for the whole
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub title: String,
    pub company: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub location: String,
    pub description: String,
    pub url: String,
    pub portal: String,
    pub experience_level: ExperienceLevel,
    pub job_type: JobType,
    pub currency: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub posted_date: Option<NaiveDate>,
}

/// Extracted skill names keyed by the record's source URL.
pub type SkillsByUrl = HashMap<String, Vec<String>>;

/// Summary of a cleaning pass: what came in, what survived, and why the
/// rest was dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub original: usize,
    pub cleaned: usize,
    pub rejections: BTreeMap<String, usize>,
}

impl QualityReport {
    pub fn record_rejection(&mut self, label: impl Into<String>) {
        *self.rejections.entry(label.into()).or_default() += 1;
    }

    pub fn removal_percent(&self) -> f64 {
        if self.original == 0 {
            return 0.0;
        }
        (self.original - self.cleaned) as f64 / self.original as f64 * 100.0
    }

    /// Most frequent rejection reasons, descending, ties broken by label.
    pub fn top_rejections(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut entries: Vec<_> = self
            .rejections
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        entries.truncate(limit);
        entries
    }
}

/// Per-batch outcome of the storage loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub inserted: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl LoadReport {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.errored
    }
}
