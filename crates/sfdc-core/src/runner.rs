//! Instance runner
//!
//! Executes one planned run of an instance. Each query is executed,
//! shaped and committed on its own; a failing query keeps its old
//! watermark and does not disturb its siblings. Forwarded ids reach the
//! dedup cache only after the watermark commit, so a retried window is
//! forwarded in full.

use crate::error::{QueryError, RunError};
use crate::executor::QueryExecutor;
use crate::planner::{plan, PlannedQuery, QueryFailure, RunPlan};
use crate::records::{
    is_log_file_response, EventTypeFields, LogBatch, LogFileRecord, PendingIds, RecordShaper,
    LOG_FILE_SCOPE,
};
use chrono::{DateTime, Utc};
use sfdc_config::InstanceConfig;
use sfdc_query::{Clock, ExtractionWindow, QueryKey, Watermark};
use sfdc_state::{DedupCache, WatermarkStore};

/// Query that ran to completion
#[derive(Debug, Clone)]
pub struct QuerySuccess {
    /// Watermark key
    pub key: QueryKey,
    /// Window that was extracted
    pub window: ExtractionWindow,
    /// Watermark committed for the next run
    pub committed: Watermark,
    /// Entries forwarded
    pub rows: usize,
    /// Shaped entries, ready for the sink
    pub batches: Vec<LogBatch>,
}

/// Outcome of one run of one instance
#[derive(Debug)]
pub struct RunReport {
    /// Instance name
    pub instance: String,
    /// Clock reading of the run
    pub now: DateTime<Utc>,
    /// Completed queries, in configuration order
    pub successes: Vec<QuerySuccess>,
    /// Failed queries
    pub failures: Vec<QueryFailure>,
}

impl RunReport {
    /// Whether every query succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total entries forwarded
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.successes.iter().map(|s| s.rows).sum()
    }
}

/// Runs the queries of one instance
pub struct Runner<'a> {
    instance: &'a InstanceConfig,
    store: &'a dyn WatermarkStore,
    clock: &'a dyn Clock,
    cache: Option<&'a dyn DedupCache>,
    event_type_fields: Option<&'a EventTypeFields>,
}

impl<'a> Runner<'a> {
    /// Create runner for an instance
    ///
    /// # Arguments
    /// * `instance` - Validated instance configuration
    /// * `store` - Watermark persistence
    /// * `clock` - Time source, read once per run
    #[must_use]
    pub fn new(
        instance: &'a InstanceConfig,
        store: &'a dyn WatermarkStore,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            instance,
            store,
            clock,
            cache: None,
            event_type_fields: None,
        }
    }

    /// Skip records already forwarded
    ///
    /// Ignored unless the instance enables its cache.
    #[must_use]
    pub fn with_cache(mut self, cache: &'a dyn DedupCache) -> Self {
        if self.instance.cache.enabled {
            self.cache = Some(cache);
        }
        self
    }

    /// Forward only the listed log file columns per event type
    #[must_use]
    pub fn with_event_type_fields(mut self, fields: &'a EventTypeFields) -> Self {
        self.event_type_fields = Some(fields);
        self
    }

    /// Resolve every query without executing anything
    ///
    /// # Errors
    /// `RunError::Clock` if the window arithmetic overflows
    pub fn plan(&self) -> Result<RunPlan, RunError> {
        plan(
            &self.instance.defaults,
            &self.instance.queries,
            self.store,
            self.clock,
        )
    }

    /// Plan and execute one run
    ///
    /// # Errors
    /// `RunError::Clock` if the run cannot be planned; per-query failures
    /// are reported in the returned [`RunReport`]
    pub fn run(&self, executor: &dyn QueryExecutor) -> Result<RunReport, RunError> {
        let plan = self.plan()?;
        let mut report = RunReport {
            instance: plan.instance,
            now: plan.now,
            successes: Vec::with_capacity(plan.planned.len()),
            failures: plan.failures,
        };

        for planned in plan.planned {
            match self.execute(executor, &planned, plan.now) {
                Ok(success) => {
                    tracing::info!(
                        key = %success.key,
                        window = %success.window,
                        rows = success.rows,
                        "query completed"
                    );
                    report.successes.push(success);
                }
                Err(error) => {
                    tracing::error!(key = %planned.key, %error, "query failed, watermark unchanged");
                    report.failures.push(QueryFailure {
                        key: planned.key,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            instance = %report.instance,
            succeeded = report.successes.len(),
            failed = report.failures.len(),
            rows = report.total_rows(),
            "run finished"
        );
        Ok(report)
    }

    fn execute(
        &self,
        executor: &dyn QueryExecutor,
        planned: &PlannedQuery,
        now: DateTime<Utc>,
    ) -> Result<QuerySuccess, QueryError> {
        let resolved = &planned.resolved;
        let window = *resolved.window();
        let mut entries = Vec::new();
        let mut pending = PendingIds::new();

        if window.is_empty() {
            tracing::debug!(key = %planned.key, %window, "empty window, nothing to extract");
        } else {
            tracing::debug!(key = %planned.key, query = resolved.query(), "executing query");
            let rows = executor.execute(resolved)?;
            let shaper = RecordShaper::new(resolved.effective(), now)
                .with_cache(self.cache)
                .with_event_type_fields(self.event_type_fields);

            if is_log_file_response(&rows) {
                for row in &rows {
                    let file = LogFileRecord::from_row(row)?;
                    if self.already_processed(&file) {
                        tracing::info!(file = %file.id, "log file already processed, skipping download");
                        continue;
                    }
                    let csv_rows = executor.fetch_log_file(resolved, &file)?;
                    tracing::debug!(file = %file.id, rows = csv_rows.len(), "log file downloaded");
                    entries.extend(shaper.shape_log_file(&file, csv_rows, &mut pending)?);
                    if self.cache.is_some() {
                        pending.stage(LOG_FILE_SCOPE, &file.id);
                    }
                }
            } else {
                for row in rows {
                    let shaped = shaper.shape_event(planned.key.as_str(), row, &mut pending)?;
                    entries.extend(shaped);
                }
            }
        }

        let committed = resolved.candidate_watermark();
        self.store.commit(&planned.key, committed)?;
        if let Some(cache) = self.cache {
            tracing::debug!(key = %planned.key, ids = pending.len(), "recording forwarded ids");
            pending.record_into(cache);
        }

        Ok(QuerySuccess {
            key: planned.key.clone(),
            window,
            committed,
            rows: entries.len(),
            batches: LogBatch::chunk(entries),
        })
    }

    fn already_processed(&self, file: &LogFileRecord) -> bool {
        file.is_hourly()
            && self
                .cache
                .is_some_and(|cache| cache.contains(LOG_FILE_SCOPE, &file.id))
    }
}
