//! Live works fetch
//!
//! When local results for a first-page query are sparse, the controller
//! fetches the external works corpus and merges the results through the
//! ingestion pipeline. A per-scope cooldown stops repeated upstream hits
//! for the same query, and the fetch itself runs on a detached task so a
//! caller dropping the request cannot abort a merge already underway.

use scholargraph_common::config::LiveFetchConfig;
use scholargraph_common::errors::EngineError;
use scholargraph_common::model::{LiveFetchReason, LiveFetchReport};
use scholargraph_common::store::WorksClient;
use scholargraph_ingestion::UpsertPipeline;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

/// Decides whether to fetch, runs the fetch, and reports the outcome
pub struct LiveFetchController {
    config: LiveFetchConfig,
    works: Arc<dyn WorksClient>,
    pipeline: Arc<UpsertPipeline>,
    api_key_present: bool,
    /// Last fetch instant per query scope
    cooldowns: Mutex<HashMap<String, Instant>>,
}

/// Cooldown scope: queries differing only in case or whitespace share one
/// cooldown window.
pub fn scope_key(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl LiveFetchController {
    pub fn new(
        config: LiveFetchConfig,
        works: Arc<dyn WorksClient>,
        pipeline: Arc<UpsertPipeline>,
        api_key_present: bool,
    ) -> Self {
        Self {
            config,
            works,
            pipeline,
            api_key_present,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate the guard ladder and, when it passes, fetch and merge.
    ///
    /// `now` is injected so cooldown behavior is testable with synthetic
    /// clocks; callers pass `Instant::now()`.
    pub async fn run(
        &self,
        query: &str,
        page: u32,
        local_results: usize,
        now: Instant,
    ) -> LiveFetchReport {
        let enabled = self.config.enabled;

        if !enabled {
            return self.skipped(LiveFetchReason::Disabled);
        }
        if query.trim().is_empty() {
            return self.skipped(LiveFetchReason::EmptyQuery);
        }
        if page > 1 {
            return self.skipped(LiveFetchReason::PageNotSupported);
        }
        if local_results >= self.config.min_local_results {
            return self.skipped(LiveFetchReason::SufficientLocal);
        }
        if !self.api_key_present {
            return self.skipped(LiveFetchReason::MissingApiKey);
        }

        let scope = scope_key(query);
        {
            let mut cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(last) = cooldowns.get(&scope) {
                if now.duration_since(*last) < self.config.cooldown() {
                    return self.skipped(LiveFetchReason::Cooldown);
                }
            }
            // The window opens at the attempt, success or not, so a flaky
            // upstream is not hammered once per request
            cooldowns.insert(scope, now);
        }

        let started = Instant::now();
        let works = self.works.clone();
        let pipeline = self.pipeline.clone();
        let owned_query = query.to_string();
        let fetch_limit = self.config.fetch_limit;
        let timeout = self.config.timeout();

        // Detached so caller cancellation cannot abort a committed merge
        let handle = tokio::spawn(async move {
            tokio::time::timeout(timeout, async {
                let page = works.fetch_works(&owned_query, None, fetch_limit).await?;
                pipeline.merge_works(&owned_query, &page.works).await
            })
            .await
            .map_err(|_| EngineError::ExternalFetchTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        });

        match handle.await {
            Ok(Ok(Ok(outcome))) => {
                info!(
                    query,
                    processed = outcome.works_processed,
                    touched = outcome.documents_touched(),
                    "Live fetch merged"
                );
                metrics::counter!("live_fetch_success_total").increment(1);
                LiveFetchReport {
                    enabled,
                    attempted: true,
                    reason: LiveFetchReason::Fetched,
                    works_processed: outcome.works_processed,
                    documents_touched: outcome.documents_touched(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Ok(Ok(Err(err))) | Ok(Err(err)) => self.failed(enabled, started, err.to_string()),
            Err(join_err) => self.failed(enabled, started, join_err.to_string()),
        }
    }

    fn skipped(&self, reason: LiveFetchReason) -> LiveFetchReport {
        LiveFetchReport::skipped(self.config.enabled, reason)
    }

    fn failed(&self, enabled: bool, started: Instant, error: String) -> LiveFetchReport {
        warn!(error = %error, "Live fetch failed");
        metrics::counter!("live_fetch_failure_total").increment(1);
        LiveFetchReport {
            enabled,
            attempted: true,
            reason: LiveFetchReason::Failed,
            works_processed: 0,
            documents_touched: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(error),
        }
    }
}
