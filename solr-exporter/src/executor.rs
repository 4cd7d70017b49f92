//! Scrape cycle execution.
//!
//! A cycle runs every registered job against the resolved Solr deployment on
//! a bounded pool of tasks. Each job succeeds or fails as a unit: a failure
//! is counted and logged, and never affects the other jobs of the cycle.
//! Jobs whose mode excludes the deployment (cloud-only jobs against a
//! standalone node) are skipped and produce neither samples nor failures.
//!
//! [`ScrapeExecutor`] lets at most one cycle run at a time. Callers arriving
//! while a cycle is in flight wait for that cycle and share its outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Sample, Snapshot, aggregate};
use crate::config::JobScope;
use crate::context::ExporterContext;
use crate::extraction::{ExtractionError, RequestContext, Variable};
use crate::registry::ScrapeJob;

/// Reasons a single job fails.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed response: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("node discovery failed: {0}")]
    Discovery(String),
}

/// Errors surfaced to callers of [`ScrapeExecutor::scrape`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("scrape cycle aborted")]
    CycleAborted,
}

/// Outcome of one job in one cycle.
#[derive(Debug, Clone)]
pub enum ScrapeResult {
    Success {
        job: Arc<ScrapeJob>,
        samples: Vec<Sample>,
    },
    Failure {
        job: Arc<ScrapeJob>,
        cause: String,
    },
}

impl ScrapeResult {
    pub fn job(&self) -> &Arc<ScrapeJob> {
        match self {
            ScrapeResult::Success { job, .. } | ScrapeResult::Failure { job, .. } => job,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScrapeResult::Failure { .. })
    }
}

/// A job that failed in a cycle, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub job: String,
    pub cause: String,
}

/// Published result of a scrape cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub snapshot: Snapshot,
    /// Failed jobs, in registry order.
    pub failures: Vec<JobFailure>,
    /// Wall-clock time of the cycle.
    pub duration: Duration,
}

/// Run one scrape cycle: every job once, then aggregate.
pub async fn run_cycle(ctx: &Arc<ExporterContext>) -> CycleOutcome {
    let started = Instant::now();

    let cloud = ctx.target.is_cloud();
    let jobs: Vec<Arc<ScrapeJob>> = ctx
        .registry
        .jobs()
        .iter()
        .filter(|job| job.mode.runs_in(cloud))
        .cloned()
        .collect();
    let skipped = ctx.registry.len() - jobs.len();
    if skipped > 0 {
        debug!(skipped, cloud, "Skipping jobs for another deployment mode");
    }

    let bases = match ctx.discovery.live_node_urls().await {
        Ok(bases) => Ok(bases),
        Err(e) => {
            warn!(connection = %ctx.target, error = %e, "Node discovery failed");
            Err(e.to_string())
        }
    };
    let bases = Arc::new(bases);

    let semaphore = Arc::new(Semaphore::new(ctx.concurrency));
    let mut set = JoinSet::new();
    let mut task_index = HashMap::with_capacity(jobs.len());

    for (index, job) in jobs.iter().enumerate() {
        let ctx = Arc::clone(ctx);
        let job = Arc::clone(job);
        let semaphore = Arc::clone(&semaphore);
        let bases = Arc::clone(&bases);

        let handle = set.spawn(async move {
            // Held until the job finishes; the semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();

            let result = match bases.as_ref() {
                Err(cause) => Err(JobError::Discovery(cause.clone())),
                Ok(bases) => tokio::time::timeout(ctx.job_timeout, run_job(&ctx, &job, bases))
                    .await
                    .unwrap_or(Err(JobError::Timeout(ctx.job_timeout))),
            };
            (index, result)
        });
        task_index.insert(handle.id(), index);
    }

    let mut slots: Vec<Option<ScrapeResult>> = (0..jobs.len()).map(|_| None).collect();

    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, (index, Ok(samples)))) => {
                slots[index] = Some(ScrapeResult::Success {
                    job: Arc::clone(&jobs[index]),
                    samples,
                });
            }
            Ok((_, (index, Err(e)))) => {
                slots[index] = Some(ScrapeResult::Failure {
                    job: Arc::clone(&jobs[index]),
                    cause: e.to_string(),
                });
            }
            Err(e) => {
                if let Some(&index) = task_index.get(&e.id()) {
                    slots[index] = Some(ScrapeResult::Failure {
                        job: Arc::clone(&jobs[index]),
                        cause: format!("job task failed: {}", e),
                    });
                }
            }
        }
    }

    let results: Vec<ScrapeResult> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| ScrapeResult::Failure {
                job: Arc::clone(&jobs[index]),
                cause: "job did not complete".to_string(),
            })
        })
        .collect();

    let mut failures = Vec::new();
    for result in &results {
        if let ScrapeResult::Failure { job, cause } = result {
            let total = ctx.errors.record();
            warn!(job = %job.name, error = %cause, errors_total = total, "Scrape job failed");
            failures.push(JobFailure {
                job: job.name.clone(),
                cause: cause.clone(),
            });
        }
    }

    let snapshot = aggregate(&results);
    let duration = started.elapsed();

    info!(
        jobs = results.len(),
        skipped,
        failures = failures.len(),
        families = snapshot.families.len(),
        samples = snapshot.sample_count(),
        duration_ms = duration.as_millis() as u64,
        "Scrape cycle completed"
    );

    CycleOutcome {
        snapshot,
        failures,
        duration,
    }
}

/// Run one job against the given node bases.
async fn run_job(
    ctx: &ExporterContext,
    job: &ScrapeJob,
    bases: &[String],
) -> Result<Vec<Sample>, JobError> {
    let targets = match job.scope {
        JobScope::Node => bases,
        JobScope::Cluster => &bases[..bases.len().min(1)],
    };
    if targets.is_empty() {
        return Err(JobError::Discovery("no live Solr nodes".to_string()));
    }

    let mut samples = Vec::new();

    for base in targets {
        let values: Vec<Option<String>> = match job.endpoint.expansion() {
            Some(Variable::Core) => wrap(ctx.client.list_cores(base).await?),
            Some(Variable::Collection) if ctx.target.is_cloud() => {
                wrap(ctx.client.list_collections(base).await?)
            }
            Some(Variable::Collection) => wrap(ctx.client.list_cores(base).await?),
            Some(Variable::BaseUrl) | None => vec![None],
        };

        for value in values {
            let path = job.endpoint.render(value.as_deref());
            let doc = ctx.client.get_json(base, &path).await?;

            let mut request = RequestContext::new(base.as_str());
            match job.endpoint.expansion() {
                Some(Variable::Core) => request.core = value,
                Some(Variable::Collection) => request.collection = value,
                _ => {}
            }

            for rule in &job.rules {
                samples.extend(rule.apply(&doc, &job.label_names, &request)?);
            }
        }
    }

    debug!(job = %job.name, samples = samples.len(), "Scrape job succeeded");
    Ok(samples)
}

fn wrap(values: Vec<String>) -> Vec<Option<String>> {
    values.into_iter().map(Some).collect()
}

type InFlight = watch::Receiver<Option<Arc<CycleOutcome>>>;

/// Runs scrape cycles, at most one at a time.
pub struct ScrapeExecutor {
    ctx: Arc<ExporterContext>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    cycles: Arc<AtomicU64>,
}

impl ScrapeExecutor {
    pub fn new(ctx: Arc<ExporterContext>) -> Self {
        Self {
            ctx,
            in_flight: Arc::new(Mutex::new(None)),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn context(&self) -> &Arc<ExporterContext> {
        &self.ctx
    }

    /// Total failed jobs since start.
    pub fn error_count(&self) -> u64 {
        self.ctx.errors.get()
    }

    /// Number of cycles started since start.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Run a cycle, or join the one already in flight.
    ///
    /// The cycle runs on its own task, so dropping the returned future does
    /// not cancel it for the other waiters.
    pub async fn scrape(&self) -> Result<Arc<CycleOutcome>, ScrapeError> {
        let ctx = Arc::clone(&self.ctx);
        self.scrape_with(move || async move { run_cycle(&ctx).await }).await
    }

    /// Like [`scrape`](Self::scrape), with `cycle` building the task run
    /// when no cycle is in flight.
    pub(crate) async fn scrape_with<F, Fut>(
        &self,
        cycle: F,
    ) -> Result<Arc<CycleOutcome>, ScrapeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CycleOutcome> + Send + 'static,
    {
        let mut rx = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(rx) => {
                    debug!("Joining in-flight scrape cycle");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());
                    self.spawn_cycle(tx, cycle());
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ScrapeError::CycleAborted)?;
        outcome.clone().ok_or(ScrapeError::CycleAborted)
    }

    fn spawn_cycle<Fut>(&self, tx: watch::Sender<Option<Arc<CycleOutcome>>>, cycle: Fut)
    where
        Fut: Future<Output = CycleOutcome> + Send + 'static,
    {
        self.cycles.fetch_add(1, Ordering::Relaxed);

        let in_flight = Arc::clone(&self.in_flight);
        let cycle = tokio::spawn(cycle);

        tokio::spawn(async move {
            let joined = cycle.await;
            in_flight.lock().take();

            match joined {
                Ok(outcome) => {
                    tx.send_replace(Some(Arc::new(outcome)));
                }
                // Dropping the sender wakes the waiters with an error.
                Err(e) => error!(error = %e, "Scrape cycle task failed"),
            }
        });
    }
}
