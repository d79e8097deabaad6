//! Scrape orchestration: deterministic iteration over cities, search terms,
//! and portals, with retries delegated entirely to the retry layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobpulse_core::RawRecord;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub mod portal;
pub mod retry;

pub use portal::{FixturePortal, PortalClient, PortalError, PortalErrorKind, PortalHttp};
pub use retry::{DelayWindow, PortalThrottle, RetryError, RetryExecutor, RetryPolicy};

pub const CRATE_NAME: &str = "jobpulse-scrape";

/// Run-level scrape parameters, loadable from the environment.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub cities: Vec<String>,
    pub search_terms: Vec<String>,
    pub per_call_limit: usize,
    pub delay_window: DelayWindow,
    pub retry_policy: RetryPolicy,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            cities: ["Bengaluru", "Mumbai", "Pune", "Delhi"]
                .map(String::from)
                .to_vec(),
            search_terms: ["software engineer", "developer", "data analyst", "tech"]
                .map(String::from)
                .to_vec(),
            per_call_limit: 50,
            delay_window: DelayWindow::default(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let list = |key: &str, fallback: Vec<String>| {
            std::env::var(key)
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        let millis = |key: &str, fallback: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            cities: list("SCRAPE_CITIES", defaults.cities),
            search_terms: list("SCRAPE_TERMS", defaults.search_terms),
            per_call_limit: std::env::var("SCRAPE_PER_CALL_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.per_call_limit),
            delay_window: DelayWindow::new(
                millis("SCRAPE_DELAY_MIN_MS", defaults.delay_window.min),
                millis("SCRAPE_DELAY_MAX_MS", defaults.delay_window.max),
            ),
            retry_policy: defaults.retry_policy,
        }
    }
}

/// Cooperative run-level cancellation: stops issuing new requests promptly
/// while keeping everything already accumulated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One failed (city, term, portal) combination and why it yielded nothing.
#[derive(Debug, Clone, Serialize)]
pub struct TripleFailure {
    pub city: String,
    pub term: String,
    pub portal: String,
    pub reason: String,
}

/// Everything a scrape run produced, failures included. The run itself
/// succeeds as long as the orchestrator finished iterating, nonzero results
/// or not.
#[derive(Debug, Serialize)]
pub struct ScrapeOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<RawRecord>,
    pub failures: Vec<TripleFailure>,
    pub calls: usize,
    pub cancelled: bool,
}

/// Iterates cities x search terms x portals in a fixed order and funnels
/// every call through the owning portal's throttle and retry executor.
pub struct ScrapeOrchestrator {
    clients: Vec<Arc<dyn PortalClient>>,
    config: ScrapeConfig,
    cancel: CancelToken,
}

impl ScrapeOrchestrator {
    pub fn new(clients: Vec<Arc<dyn PortalClient>>, config: ScrapeConfig) -> Self {
        Self {
            clients,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Handle for cancelling this run from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> ScrapeOutcome {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            cities = self.config.cities.len(),
            terms = self.config.search_terms.len(),
            portals = self.clients.len(),
            "starting scrape run"
        );

        // One throttle per portal, shared across the whole run.
        let workers: Vec<(&Arc<dyn PortalClient>, RetryExecutor)> = self
            .clients
            .iter()
            .map(|client| {
                (
                    client,
                    RetryExecutor::new(
                        self.config.retry_policy,
                        Arc::new(PortalThrottle::new(self.config.delay_window)),
                    ),
                )
            })
            .collect();

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut calls = 0usize;
        let mut cancelled = false;

        'run: for city in &self.config.cities {
            for term in &self.config.search_terms {
                for (client, executor) in &workers {
                    if self.cancel.is_cancelled() {
                        warn!(%run_id, "scrape run cancelled, keeping accumulated results");
                        cancelled = true;
                        break 'run;
                    }

                    let portal = client.portal_id().to_string();
                    calls += 1;
                    let result = executor
                        .execute(|| client.search(term, city, self.config.per_call_limit))
                        .await;
                    match result {
                        Ok(mut page) => {
                            info!(city, term, portal, found = page.len(), "portal page collected");
                            records.append(&mut page);
                        }
                        Err(err) => {
                            warn!(city, term, portal, error = %err, "portal call failed terminally");
                            failures.push(TripleFailure {
                                city: city.clone(),
                                term: term.clone(),
                                portal,
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let finished_at = Utc::now();
        info!(
            %run_id,
            records = records.len(),
            failures = failures.len(),
            calls,
            cancelled,
            "scrape run complete"
        );
        ScrapeOutcome {
            run_id,
            started_at,
            finished_at,
            records,
            failures,
            calls,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    struct ScriptedPortal {
        id: String,
        calls: AtomicUsize,
        log: Arc<StdMutex<Vec<String>>>,
        fail_kind: Option<PortalErrorKind>,
    }

    impl ScriptedPortal {
        fn new(id: &str, log: Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                id: id.to_string(),
                calls: AtomicUsize::new(0),
                log,
                fail_kind: None,
            }
        }

        fn failing(id: &str, log: Arc<StdMutex<Vec<String>>>, kind: PortalErrorKind) -> Self {
            Self {
                fail_kind: Some(kind),
                ..Self::new(id, log)
            }
        }
    }

    #[async_trait]
    impl PortalClient for ScriptedPortal {
        fn portal_id(&self) -> &str {
            &self.id
        }

        async fn search(
            &self,
            term: &str,
            city: &str,
            _limit: usize,
        ) -> Result<Vec<RawRecord>, PortalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .expect("log lock")
                .push(format!("{}/{city}/{term}", self.id));
            if let Some(kind) = self.fail_kind {
                return Err(PortalError::new(kind, "scripted failure"));
            }
            Ok(vec![RawRecord {
                portal: self.id.clone(),
                title: Some(format!("{term} in {city}")),
                url: Some(format!("https://{}/{city}/{term}", self.id)),
                ..Default::default()
            }])
        }
    }

    fn test_config() -> ScrapeConfig {
        ScrapeConfig {
            cities: vec!["Pune".into(), "Delhi".into()],
            search_terms: vec!["rust".into(), "go".into()],
            per_call_limit: 10,
            delay_window: DelayWindow::none(),
            retry_policy: RetryPolicy::immediate(2),
        }
    }

    #[tokio::test]
    async fn iteration_order_is_deterministic() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let orchestrator = ScrapeOrchestrator::new(
            vec![
                Arc::new(ScriptedPortal::new("indeed", log.clone())),
                Arc::new(ScriptedPortal::new("linkedin", log.clone())),
            ],
            test_config(),
        );

        let outcome = orchestrator.run().await;

        assert_eq!(outcome.records.len(), 8);
        assert_eq!(outcome.calls, 8);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.cancelled);
        let calls = log.lock().expect("log lock").clone();
        assert_eq!(
            calls,
            vec![
                "indeed/Pune/rust",
                "linkedin/Pune/rust",
                "indeed/Pune/go",
                "linkedin/Pune/go",
                "indeed/Delhi/rust",
                "linkedin/Delhi/rust",
                "indeed/Delhi/go",
                "linkedin/Delhi/go",
            ]
        );
    }

    #[tokio::test]
    async fn failed_triples_contribute_zero_records_without_aborting() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let orchestrator = ScrapeOrchestrator::new(
            vec![
                Arc::new(ScriptedPortal::failing(
                    "blocked-portal",
                    log.clone(),
                    PortalErrorKind::Blocked,
                )),
                Arc::new(ScriptedPortal::new("indeed", log.clone())),
            ],
            test_config(),
        );

        let outcome = orchestrator.run().await;

        // 2 cities x 2 terms from the healthy portal; 4 recorded failures.
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.failures.len(), 4);
        assert!(outcome
            .failures
            .iter()
            .all(|f| f.portal == "blocked-portal"));
    }

    #[tokio::test]
    async fn run_completes_even_when_every_call_fails() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let orchestrator = ScrapeOrchestrator::new(
            vec![Arc::new(ScriptedPortal::failing(
                "down",
                log.clone(),
                PortalErrorKind::Transient,
            ))],
            test_config(),
        );

        let outcome = orchestrator.run().await;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failures.len(), 4);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn cancellation_stops_new_requests_and_keeps_results() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let orchestrator = ScrapeOrchestrator::new(
            vec![Arc::new(ScriptedPortal::new("indeed", log.clone()))],
            test_config(),
        );

        orchestrator.cancel_token().cancel();
        let outcome = orchestrator.run().await;

        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.calls, 0);
    }

    #[test]
    fn env_config_falls_back_to_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.cities.first().map(String::as_str), Some("Bengaluru"));
        assert_eq!(config.search_terms.len(), 4);
        assert_eq!(config.per_call_limit, 50);
    }
}
