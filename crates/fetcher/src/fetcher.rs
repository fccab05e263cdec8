//! One discovery pass.
//!
//! ```text
//! for scope in (groups | all):
//!     page = 1
//!     loop:
//!         list(scope, page, batch_size)      <- races shutdown
//!         publish one WorkItem per project   (best effort)
//!         append BatchStats(running total)   (best effort)
//!         no next page -> scope done
//!         sleep(cool_off)                    <- races shutdown
//! ```
//!
//! A failing group is logged and skipped; a failing global listing ends
//! the pass. Shutdown ends the pass in both modes.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use sbomer_core::config::{BindingConfig, FetcherConfig};
use sbomer_core::metrics as m;
use sbomer_core::pipeline::{ProjectSource, ResultStore};
use sbomer_core::types::{BatchStats, ProjectSummary, Scope, WorkItem};
use sbomer_queue::Publisher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetcherError;

/// Pass parameters, resolved from `[fetcher]` and `[queue.discovery]`.
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub batch_size: u32,
    pub cool_off: Duration,
    pub group_ids: Vec<String>,
    pub include_topics: Vec<String>,
    pub exclude_topics: Vec<String>,
    pub exchange: String,
    pub routing_key: String,
}

impl FetcherSettings {
    pub fn from_config(fetcher: &FetcherConfig, discovery: &BindingConfig) -> Self {
        Self {
            batch_size: fetcher.batch_size,
            cool_off: Duration::from_secs(fetcher.cool_off_secs),
            group_ids: fetcher.group_ids.clone(),
            include_topics: fetcher.include_topics.clone(),
            exclude_topics: fetcher.exclude_topics.clone(),
            exchange: discovery.exchange.clone(),
            routing_key: discovery.routing_key.clone(),
        }
    }

    /// Scopes of one pass: every configured group, or the global listing.
    pub fn scopes(&self) -> Vec<Scope> {
        if self.group_ids.is_empty() {
            vec![Scope::All]
        } else {
            self.group_ids.iter().cloned().map(Scope::Group).collect()
        }
    }

    /// Topic filter. Excludes win over includes.
    pub fn admits(&self, topics: &[String]) -> bool {
        if topics.iter().any(|t| self.exclude_topics.contains(t)) {
            return false;
        }
        self.include_topics.is_empty() || topics.iter().any(|t| self.include_topics.contains(t))
    }
}

/// Outcome of one pass.
#[derive(Debug)]
pub struct PassReport {
    /// Projects listed across all scopes, including filtered ones and
    /// ones whose publish failed.
    pub projects: u64,
    /// Why the pass ended early, if it did. Failed groups are not
    /// reported here; they are logged and skipped.
    pub error: Option<FetcherError>,
}

impl PassReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn result_label(&self) -> &'static str {
        match &self.error {
            None => "success",
            Some(e) if e.is_cancelled() => "cancelled",
            Some(_) => "failed",
        }
    }
}

/// Running totals shared by every scope of a pass.
struct PassProgress {
    projects: u64,
    started: Instant,
}

/// Discovery pass runner.
pub struct Fetcher<S, P, R> {
    source: S,
    publisher: P,
    store: R,
    settings: FetcherSettings,
}

impl<S, P, R> Fetcher<S, P, R>
where
    S: ProjectSource,
    P: Publisher,
    R: ResultStore,
{
    pub fn new(source: S, publisher: P, store: R, settings: FetcherSettings) -> Self {
        Self {
            source,
            publisher,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    /// Runs one full discovery pass.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> PassReport {
        let mut progress = PassProgress {
            projects: 0,
            started: Instant::now(),
        };
        let scopes = self.settings.scopes();
        let group_mode = !self.settings.group_ids.is_empty();

        info!(
            scopes = scopes.len(),
            batch_size = self.settings.batch_size,
            "discovery pass started"
        );

        let mut error = None;
        for scope in &scopes {
            match self.run_scope(scope, &mut progress, cancel).await {
                Ok(()) => {}
                Err(e) if group_mode && !e.is_cancelled() => {
                    warn!(scope = %scope, error = %e, "group listing failed, continuing with next group");
                }
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        let report = PassReport {
            projects: progress.projects,
            error,
        };
        counter!(m::FETCHER_PASSES_TOTAL, m::LABEL_RESULT => report.result_label()).increment(1);

        let elapsed = progress.started.elapsed().as_secs_f64();
        match &report.error {
            None => info!(projects = report.projects, elapsed_secs = elapsed, "discovery pass completed"),
            Some(e) => warn!(projects = report.projects, elapsed_secs = elapsed, error = %e, "discovery pass ended early"),
        }
        report
    }

    async fn run_scope(
        &self,
        scope: &Scope,
        progress: &mut PassProgress,
        cancel: &CancellationToken,
    ) -> Result<(), FetcherError> {
        let mut page = 1;

        loop {
            let listing = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetcherError::Cancelled),
                result = self.source.list_projects(scope, page, self.settings.batch_size) => {
                    result.map_err(|source| FetcherError::Listing {
                        scope: scope.to_string(),
                        page,
                        source,
                    })?
                }
            };

            let listed = listing.projects.len();
            counter!(m::FETCHER_PROJECTS_DISCOVERED_TOTAL, m::LABEL_SCOPE => scope.to_string())
                .increment(u64::try_from(listed).unwrap_or(u64::MAX));

            for project in &listing.projects {
                progress.projects += 1;
                self.enqueue(project).await;
            }

            self.record_batch(progress).await;
            debug!(scope = %scope, page, listed, total = progress.projects, "page processed");

            let next = match listing.next_page {
                None => return Ok(()),
                Some(next) if next <= page => {
                    warn!(scope = %scope, page, next, "pagination cursor did not advance, ending scope");
                    return Ok(());
                }
                Some(next) => next,
            };
            page = next;

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetcherError::Cancelled),
                () = tokio::time::sleep(self.settings.cool_off) => {}
            }
        }
    }

    /// Publishes one work item. Failures are logged and counted only.
    async fn enqueue(&self, project: &ProjectSummary) {
        if !self.settings.admits(&project.topics) {
            debug!(project_id = project.id, topics = ?project.topics, "project filtered by topics");
            counter!(m::FETCHER_PROJECTS_FILTERED_TOTAL).increment(1);
            return;
        }

        let item = match WorkItem::new(project.id) {
            Ok(item) => item,
            Err(e) => {
                warn!(project_id = project.id, error = %e, "skipping project");
                return;
            }
        };

        let body = Bytes::from(item.to_bytes());
        if let Err(e) = self
            .publisher
            .publish(&self.settings.exchange, &self.settings.routing_key, body)
            .await
        {
            warn!(project_id = project.id, error = %e, "failed to publish work item");
            counter!(m::FETCHER_PUBLISH_FAILURES_TOTAL).increment(1);
        }
    }

    async fn record_batch(&self, progress: &PassProgress) {
        let stats = BatchStats {
            projects_count: i64::try_from(progress.projects).unwrap_or(i64::MAX),
            batch_size: i64::from(self.settings.batch_size),
            duration_seconds: progress.started.elapsed().as_secs_f64(),
            created_at: Utc::now(),
        };

        match self.store.append_batch_stats(&stats).await {
            Ok(id) => debug!(stats_id = id, projects = stats.projects_count, "batch stats recorded"),
            Err(e) => warn!(error = %e, "failed to record batch stats"),
        }
    }
}
