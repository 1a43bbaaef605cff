//! Job processing service for background tasks.
//!
//! An in-memory queue for work that must not fail the request that
//! triggered it: ranking retries, badge checks and counter reconciliation.

use std::sync::Arc;
use std::time::Duration;

use rankx_common::WorkerConfig;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::badge::BadgeService;
use super::ranking::RankingEngine;
use super::reconcile::ReconcileService;

/// Upper bound for the delay between ranking retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Job types that can be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Recompute a category's ranking. `attempt` starts at 1.
    RecalculateRankings { category_id: String, attempt: u32 },
    /// Evaluate badges for a user, including rank badges when a
    /// category is given.
    CheckBadges {
        user_id: String,
        category_id: Option<String>,
    },
    /// Recompute every denormalized counter from the vote ledger.
    ReconcileCounters,
}

/// Job sender for enqueueing jobs.
#[derive(Clone)]
pub struct JobSender {
    sender: mpsc::Sender<Job>,
}

impl JobSender {
    /// Enqueue a job without waiting for queue space.
    pub fn enqueue(&self, job: Job) -> Result<(), &'static str> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => "Job queue is full",
            mpsc::error::TrySendError::Closed(_) => "Job queue is closed",
        })
    }

    /// Enqueue a job, waiting for queue space.
    pub async fn send(&self, job: Job) -> Result<(), &'static str> {
        self.sender
            .send(job)
            .await
            .map_err(|_| "Job queue is closed")
    }

    /// Enqueue a ranking recompute retry.
    pub fn retry_rankings(&self, category_id: String, attempt: u32) -> Result<(), &'static str> {
        self.enqueue(Job::RecalculateRankings {
            category_id,
            attempt,
        })
    }

    /// Enqueue a badge check.
    pub fn check_badges(
        &self,
        user_id: String,
        category_id: Option<String>,
    ) -> Result<(), &'static str> {
        self.enqueue(Job::CheckBadges {
            user_id,
            category_id,
        })
    }

    /// Enqueue a counter reconciliation.
    pub fn reconcile_counters(&self) -> Result<(), &'static str> {
        self.enqueue(Job::ReconcileCounters)
    }
}

/// Job worker context containing services needed for job processing.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub ranking: RankingEngine,
    pub badges: Option<BadgeService>,
    pub reconcile: Option<ReconcileService>,
    /// Used to re-enqueue ranking retries.
    pub sender: JobSender,
    pub ranking_max_attempts: u32,
}

/// Job processing service.
pub struct JobService {
    sender: mpsc::Sender<Job>,
    receiver: mpsc::Receiver<Job>,
    max_workers: usize,
}

impl JobService {
    /// Create a new job service.
    #[must_use]
    pub fn new(config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        Self {
            sender,
            receiver,
            max_workers: config.max_workers.max(1),
        }
    }

    /// Get a job sender for enqueueing jobs.
    #[must_use]
    pub fn sender(&self) -> JobSender {
        JobSender {
            sender: self.sender.clone(),
        }
    }

    /// Start the job processor with the given context.
    ///
    /// The processor stops once every sender is dropped and the queue is
    /// drained. The context holds a sender for retries, so in practice it
    /// runs until the runtime shuts down.
    pub fn start(self, context: JobWorkerContext) -> JoinHandle<()> {
        let Self {
            sender,
            receiver,
            max_workers,
        } = self;
        drop(sender);
        let context = Arc::new(context);

        tokio::spawn(async move {
            info!("Job worker starting with {} workers", max_workers);
            run_job_processor(receiver, context, max_workers).await;
            info!("Job worker stopped");
        })
    }
}

impl Default for JobService {
    fn default() -> Self {
        Self::new(&WorkerConfig::default())
    }
}

/// Delay before the given ranking retry attempt.
#[must_use]
pub fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_millis(250)
        .saturating_mul(1 << exp)
        .min(MAX_RETRY_DELAY)
}

/// Run the job processor.
async fn run_job_processor(
    mut receiver: mpsc::Receiver<Job>,
    context: Arc<JobWorkerContext>,
    max_workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(max_workers));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let ctx = context.clone();

        tokio::spawn(async move {
            let _permit = permit;
            process_job(job, &ctx).await;
        });
    }
}

/// Process a single job.
async fn process_job(job: Job, context: &JobWorkerContext) {
    match job {
        Job::RecalculateRankings {
            category_id,
            attempt,
        } => {
            process_ranking(context, category_id, attempt).await;
        }
        Job::CheckBadges {
            user_id,
            category_id,
        } => {
            process_badges(context, &user_id, category_id.as_deref()).await;
        }
        Job::ReconcileCounters => {
            process_reconcile(context).await;
        }
    }
}

/// Process a ranking recompute, scheduling the next attempt on failure.
async fn process_ranking(context: &JobWorkerContext, category_id: String, attempt: u32) {
    match context.ranking.recalculate(&category_id).await {
        Ok(members) => {
            debug!(
                category_id = %category_id,
                attempt = attempt,
                members = members,
                "Ranking recompute succeeded"
            );
        }
        Err(e) if attempt < context.ranking_max_attempts => {
            let delay = retry_delay(attempt + 1);
            warn!(
                category_id = %category_id,
                attempt = attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "Ranking recompute failed, retrying"
            );

            let sender = context.sender.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let job = Job::RecalculateRankings {
                    category_id: category_id.clone(),
                    attempt: attempt + 1,
                };
                if let Err(qe) = sender.send(job).await {
                    error!(category_id = %category_id, error = %qe, "Failed to re-enqueue ranking retry");
                }
            });
        }
        Err(e) => {
            error!(
                category_id = %category_id,
                attempt = attempt,
                error = %e,
                "Ranking recompute failed, giving up"
            );
        }
    }
}

/// Process a badge check.
async fn process_badges(context: &JobWorkerContext, user_id: &str, category_id: Option<&str>) {
    let Some(ref badges) = context.badges else {
        debug!("Badge service not available, skipping check");
        return;
    };

    match badges.check_all(user_id, category_id).await {
        Ok(awarded) => {
            if !awarded.is_empty() {
                info!(user_id = %user_id, badges = ?awarded, "Badges awarded");
            }
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Badge check failed");
        }
    }
}

/// Process a counter reconciliation.
async fn process_reconcile(context: &JobWorkerContext) {
    let Some(ref reconcile) = context.reconcile else {
        debug!("Reconcile service not available, skipping");
        return;
    };

    match reconcile.reconcile_counters().await {
        Ok(report) => {
            info!(
                drifts = report.drifts.len(),
                orphaned_votes = report.orphaned_votes.len(),
                "Counter reconciliation finished"
            );
        }
        Err(e) => {
            error!(error = %e, "Counter reconciliation failed");
        }
    }
}
