//! Batch cleaning for scraped job records: field normalization, the
//! location gate, vocabulary mapping, and first-wins URL deduplication.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use jobpulse_core::{
    CleanRecord, ExperienceLevel, JobType, QualityReport, RawRecord, DEFAULT_CURRENCY,
};
use regex::Regex;
use tracing::info;

pub mod location;
pub mod skills;

pub use location::{validate_location, LocationCheck, RejectReason};

pub const CRATE_NAME: &str = "jobpulse-clean";

const MAX_TITLE_LEN: usize = 255;
const MAX_COMPANY_LEN: usize = 255;
const MAX_URL_LEN: usize = 500;

/// Monthly INR figures outside this range are treated as junk and nulled.
const SALARY_FLOOR: f64 = 1_000.0;
const SALARY_CEILING: f64 = 10_000_000.0;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern is valid"));
static COMPANY_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(pvt\.?|ltd\.?|private limited|limited)$")
        .expect("company suffix pattern is valid")
});

const EXPERIENCE_VOCAB: &[(&str, ExperienceLevel)] = &[
    ("entry", ExperienceLevel::EntryLevel),
    ("junior", ExperienceLevel::EntryLevel),
    ("mid", ExperienceLevel::MidLevel),
    ("senior", ExperienceLevel::SeniorLevel),
    ("lead", ExperienceLevel::SeniorLevel),
    ("principal", ExperienceLevel::SeniorLevel),
    ("staff", ExperienceLevel::SeniorLevel),
    ("intern", ExperienceLevel::Internship),
    ("internship", ExperienceLevel::Internship),
];

const JOB_TYPE_VOCAB: &[(&str, JobType)] = &[
    ("full time", JobType::FullTime),
    ("full-time", JobType::FullTime),
    ("fulltime", JobType::FullTime),
    ("part time", JobType::PartTime),
    ("part-time", JobType::PartTime),
    ("parttime", JobType::PartTime),
    ("contract", JobType::Contract),
    ("temporary", JobType::Contract),
    ("remote", JobType::Remote),
    ("hybrid", JobType::Hybrid),
    ("onsite", JobType::OnSite),
    ("on-site", JobType::OnSite),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

/// Cleans raw batches into store-ready records. Stateless; one instance can
/// serve the whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobDataCleaner;

impl JobDataCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Run the full cleaning pass over a batch.
    ///
    /// Never fails on a bad row: every drop is counted in the report and
    /// the rest of the batch continues.
    pub fn clean(&self, batch: Vec<RawRecord>) -> (Vec<CleanRecord>, QualityReport) {
        let mut report = QualityReport {
            original: batch.len(),
            ..Default::default()
        };

        let mut candidates = Vec::new();
        for raw in batch {
            if raw.is_empty() {
                report.record_rejection("empty-row");
                continue;
            }

            let location = raw.location.as_deref().unwrap_or("");
            let (city, state) = match validate_location(location) {
                LocationCheck::Valid { city, state, .. } => (city, state),
                LocationCheck::Rejected(reason) => {
                    report.record_rejection(reason.label());
                    tracing::debug!(location, %reason, "dropped out-of-domain record");
                    continue;
                }
            };

            let url = truncate_chars(&normalize_text(raw.url.as_deref().unwrap_or("")), MAX_URL_LEN);
            if url.is_empty() {
                report.record_rejection("missing-url");
                continue;
            }

            let (salary_min, salary_max) = clean_salaries(raw.salary_min, raw.salary_max);

            candidates.push(CleanRecord {
                title: truncate_chars(
                    &normalize_text(raw.title.as_deref().unwrap_or("")),
                    MAX_TITLE_LEN,
                ),
                company: clean_company(raw.company.as_deref()),
                city,
                state,
                location: normalize_text(location),
                description: normalize_text(&strip_html(raw.description.as_deref().unwrap_or(""))),
                url,
                portal: raw.portal,
                experience_level: map_experience(raw.experience_level.as_deref()),
                job_type: map_job_type(raw.job_type.as_deref()),
                currency: DEFAULT_CURRENCY.to_string(),
                salary_min,
                salary_max,
                posted_date: raw.posted_date.as_deref().and_then(parse_posted_date),
            });
        }

        // Stable first-wins dedup on source URL.
        let mut seen_urls = HashSet::new();
        let mut cleaned = Vec::with_capacity(candidates.len());
        for record in candidates {
            if !seen_urls.insert(record.url.clone()) {
                report.record_rejection("duplicate-url");
                continue;
            }
            if record.title.is_empty() {
                report.record_rejection("missing-title");
                continue;
            }
            if record.description.is_empty() {
                report.record_rejection("missing-description");
                continue;
            }
            cleaned.push(record);
        }

        report.cleaned = cleaned.len();
        info!(
            original = report.original,
            cleaned = report.cleaned,
            removed_percent = format!("{:.1}", report.removal_percent()),
            "cleaning pass complete"
        );
        (cleaned, report)
    }
}

/// Trim and collapse internal whitespace runs to single spaces.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_html(text: &str) -> String {
    HTML_TAG_RE.replace_all(text, " ").into_owned()
}

/// Character-safe truncation; cap fields, never error on length.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Normalize a company name, repeatedly stripping legal suffixes so that
/// "Acme Pvt. Ltd." and "Acme Private Limited" both become "Acme".
fn clean_company(raw: Option<&str>) -> Option<String> {
    let mut name = normalize_text(raw?);
    loop {
        let stripped = COMPANY_SUFFIX_RE.replace(&name, "").into_owned();
        if stripped == name {
            break;
        }
        name = stripped;
    }
    let name = truncate_chars(name.trim(), MAX_COMPANY_LEN);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Absent or unmapped values both fall back to the lowest tier.
fn map_experience(raw: Option<&str>) -> ExperienceLevel {
    let Some(raw) = raw else {
        return ExperienceLevel::default();
    };
    let lower = raw.trim().to_lowercase();
    EXPERIENCE_VOCAB
        .iter()
        .find(|(key, _)| *key == lower)
        .map(|(_, level)| *level)
        .unwrap_or_default()
}

fn map_job_type(raw: Option<&str>) -> JobType {
    let Some(raw) = raw else {
        return JobType::default();
    };
    let lower = raw.trim().to_lowercase();
    JOB_TYPE_VOCAB
        .iter()
        .find(|(key, _)| *key == lower)
        .map(|(_, kind)| *kind)
        .unwrap_or_default()
}

/// Coerce a raw date string through the accepted formats; unparseable
/// values become `None`, never an error.
fn parse_posted_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Timestamps come through from some portals; the date part is enough.
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Zero means "unspecified", out-of-range values are junk; both become
/// `None` rather than dropping the row. An inverted range keeps the lower
/// bound only.
fn clean_salaries(min: Option<f64>, max: Option<f64>) -> (Option<f64>, Option<f64>) {
    let sane = |v: f64| v.is_finite() && (SALARY_FLOOR..=SALARY_CEILING).contains(&v);
    let min = min.filter(|v| sane(*v));
    let mut max = max.filter(|v| sane(*v));
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo >= hi {
            max = None;
        }
    }
    (min, max)
}
