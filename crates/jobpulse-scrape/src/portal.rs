//! Portal client contract and the helpers external portal adapters build on.
//!
//! HTML structure is each portal's own problem; this module only defines the
//! search contract, the error taxonomy the retry layer keys off, and two
//! adapters: an HTTP helper that classifies transport failures, and a
//! fixture-backed portal for offline runs and tests.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use jobpulse_core::RawRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a portal failure should be treated by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortalErrorKind {
    /// Connection resets, timeouts, server hiccups; likely to succeed on retry.
    Transient,
    /// Explicit throttling signal; retry after a longer cooldown.
    RateLimited,
    /// Access-denied style response; retrying is futile.
    Blocked,
    /// The portal has nothing further to give for this query.
    Exhausted,
}

impl fmt::Display for PortalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate-limited",
            Self::Blocked => "blocked",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} portal failure: {message}")]
pub struct PortalError {
    pub kind: PortalErrorKind,
    pub message: String,
}

impl PortalError {
    pub fn new(kind: PortalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Transient, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::RateLimited, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Blocked, message)
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Exhausted, message)
    }
}

/// One external job portal, abstracted away from its HTML.
#[async_trait]
pub trait PortalClient: Send + Sync {
    fn portal_id(&self) -> &str;

    /// Fetch up to `limit` raw records for a search term in a city.
    async fn search(
        &self,
        term: &str,
        city: &str,
        limit: usize,
    ) -> Result<Vec<RawRecord>, PortalError>;
}

/// Classify an HTTP status into the portal error taxonomy.
pub fn classify_status(status: reqwest::StatusCode) -> Option<PortalErrorKind> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        429 => PortalErrorKind::RateLimited,
        401 | 403 => PortalErrorKind::Blocked,
        408 => PortalErrorKind::Transient,
        s if (500..600).contains(&s) => PortalErrorKind::Transient,
        _ => PortalErrorKind::Blocked,
    })
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> PortalErrorKind {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PortalErrorKind::Transient
    } else {
        PortalErrorKind::Blocked
    }
}

/// Shared HTTP plumbing for portal adapters: user agent, timeout, and
/// classification of failures into [`PortalError`]s.
#[derive(Debug, Clone)]
pub struct PortalHttp {
    client: reqwest::Client,
}

impl PortalHttp {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building portal http client")?;
        Ok(Self { client })
    }

    pub async fn get_text(&self, url: &str) -> Result<String, PortalError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| PortalError::new(classify_reqwest_error(&err), err.to_string()))?;

        let status = response.status();
        if let Some(kind) = classify_status(status) {
            return Err(PortalError::new(
                kind,
                format!("http status {status} for {url}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|err| PortalError::transient(err.to_string()))
    }
}

/// A portal that serves pre-captured raw records from JSON files, laid out
/// as `<root>/<portal>/<city>/<term>.json`. Missing files mean an empty
/// result page, not an error.
#[derive(Debug, Clone)]
pub struct FixturePortal {
    portal: String,
    root: PathBuf,
}

impl FixturePortal {
    pub fn new(portal: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            portal: portal.into(),
            root: root.into(),
        }
    }

    fn fixture_path(&self, term: &str, city: &str) -> PathBuf {
        self.root
            .join(&self.portal)
            .join(slug(city))
            .join(format!("{}.json", slug(term)))
    }
}

fn slug(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[async_trait]
impl PortalClient for FixturePortal {
    fn portal_id(&self) -> &str {
        &self.portal
    }

    async fn search(
        &self,
        term: &str,
        city: &str,
        limit: usize,
    ) -> Result<Vec<RawRecord>, PortalError> {
        let path = self.fixture_path(term, city);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(PortalError::transient(format!(
                    "reading {}: {err}",
                    path.display()
                )))
            }
        };

        let mut records: Vec<RawRecord> = serde_json::from_str(&text).map_err(|err| {
            PortalError::blocked(format!("malformed fixture {}: {err}", path.display()))
        })?;
        for record in &mut records {
            if record.portal.is_empty() {
                record.portal = self.portal.clone();
            }
        }
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fixture_portal_reads_truncates_and_tags_records() {
        let dir = tempdir().expect("tempdir");
        let city_dir = dir.path().join("indeed").join("bengaluru");
        std::fs::create_dir_all(&city_dir).expect("fixture dir");
        std::fs::write(
            city_dir.join("software-engineer.json"),
            r#"[{"portal":"","title":"A"},{"portal":"","title":"B"},{"portal":"","title":"C"}]"#,
        )
        .expect("fixture file");

        let portal = FixturePortal::new("indeed", dir.path());
        let records = portal
            .search("Software Engineer", "Bengaluru", 2)
            .await
            .expect("search");

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.portal == "indeed"));
    }

    #[tokio::test]
    async fn missing_fixture_is_an_empty_page() {
        let dir = tempdir().expect("tempdir");
        let portal = FixturePortal::new("indeed", dir.path());
        let records = portal.search("devops", "Pune", 10).await.expect("search");
        assert!(records.is_empty());
    }

    #[test]
    fn status_classification_matches_the_taxonomy() {
        use reqwest::StatusCode;
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(PortalErrorKind::RateLimited)
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            Some(PortalErrorKind::Blocked)
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(PortalErrorKind::Transient)
        );
    }
}
