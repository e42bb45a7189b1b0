//! Run planner
//!
//! Reads the clock once per run and resolves every query of an instance
//! against that single instant, so all queries share the same upper bound.
//! Template problems fail only their own query; clock problems fail the run.

use crate::error::{QueryError, RunError};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use sfdc_config::ConfigLoader;
use sfdc_query::{
    Clock, ClockError, ExtractionWindow, InstanceDefaults, QueryKey, QueryResolver, QueryTemplate,
    ResolveError, ResolvedQuery,
};
use sfdc_state::WatermarkStore;
use std::path::Path;

/// Query resolved and ready to execute
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    /// Watermark key
    pub key: QueryKey,
    /// Substituted query and its window
    pub resolved: ResolvedQuery,
}

/// Query that could not be planned or run
#[derive(Debug)]
pub struct QueryFailure {
    /// Watermark key
    pub key: QueryKey,
    /// Cause
    pub error: QueryError,
}

/// Every query of one instance for one run
#[derive(Debug)]
pub struct RunPlan {
    /// Instance name
    pub instance: String,
    /// Clock reading shared by all queries
    pub now: DateTime<Utc>,
    /// Resolved queries, in configuration order
    pub planned: Vec<PlannedQuery>,
    /// Queries that failed to resolve, in configuration order
    pub failures: Vec<QueryFailure>,
}

/// Resolve every template of an instance for the current run
///
/// # Arguments
/// * `defaults` - Instance defaults
/// * `templates` - Query list, already merged
/// * `store` - Source of prior watermarks
/// * `clock` - Read exactly once
///
/// # Errors
/// `RunError::Clock` if the window arithmetic overflows for this clock reading
pub fn plan<S, C>(
    defaults: &InstanceDefaults,
    templates: &[QueryTemplate],
    store: &S,
    clock: &C,
) -> Result<RunPlan, RunError>
where
    S: WatermarkStore + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let first_run = ExtractionWindow::compute(defaults, None, now)?;
    tracing::debug!(instance = %defaults.name, %now, window = %first_run, "planning run");

    let resolver = QueryResolver::new(defaults.clone());
    let outcomes = templates
        .par_iter()
        .map(|template| {
            let key = QueryKey::for_template(&defaults.name, template);
            plan_one(&resolver, store, key, template, now)
        })
        .collect::<Result<Vec<_>, ClockError>>()?;

    let mut planned = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(query) => planned.push(query),
            Err(failure) => {
                tracing::warn!(key = %failure.key, error = %failure.error, "query skipped");
                failures.push(failure);
            }
        }
    }

    tracing::info!(
        instance = %defaults.name,
        planned = planned.len(),
        failed = failures.len(),
        "run planned"
    );
    Ok(RunPlan {
        instance: defaults.name.clone(),
        now,
        planned,
        failures,
    })
}

fn plan_one<S: WatermarkStore + ?Sized>(
    resolver: &QueryResolver,
    store: &S,
    key: QueryKey,
    template: &QueryTemplate,
    now: DateTime<Utc>,
) -> Result<Result<PlannedQuery, QueryFailure>, ClockError> {
    let watermark = match store.load(&key) {
        Ok(watermark) => watermark,
        Err(e) => return Ok(Err(QueryFailure { key, error: e.into() })),
    };
    match resolver.resolve(template, watermark.as_ref(), now) {
        Ok(resolved) => Ok(Ok(PlannedQuery { key, resolved })),
        Err(ResolveError::Template(e)) => Ok(Err(QueryFailure { key, error: e.into() })),
        Err(ResolveError::Clock(e)) => Err(e),
    }
}

/// Load a configuration file and plan every instance
///
/// # Errors
/// `RunError::Config` if the configuration is invalid, `RunError::Clock`
/// if any instance's window arithmetic overflows
pub fn plan_from_config<S, C>(
    path: impl AsRef<Path>,
    store: &S,
    clock: &C,
) -> Result<Vec<RunPlan>, RunError>
where
    S: WatermarkStore + ?Sized,
    C: Clock + ?Sized,
{
    let instances = ConfigLoader::new().load(path)?;
    instances
        .iter()
        .map(|instance| plan(&instance.defaults, &instance.queries, store, clock))
        .collect()
}
