use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fore_core::config::SchedulerConfig;
use fore_core::PostStatus;
use fore_publisher::PublishPipeline;
use fore_store::PostStore;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Upper bound (ten years) for configured look-ahead and stale windows.
const MAX_WINDOW_SECS: u64 = 3650 * 24 * 60 * 60;

/// Counters for one poller tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Posts the store reported as due.
    pub due: usize,
    /// Posts this poller claimed and handed to the pipeline.
    pub claimed: usize,
    /// Posts another poller claimed first.
    pub conflicts: usize,
    /// Due posts left for a later tick because every publish slot was busy.
    pub deferred: usize,
    /// Posts stuck in `posting` past the stale threshold.
    pub stale: usize,
}

/// Finds due posts on a fixed interval, claims them and runs the publishing
/// pipeline on each claimed post as a background task.
///
/// Several pollers (in one process or many) may share a store; the
/// conditional claim makes sure each post is published by at most one.
pub struct Poller {
    store: Arc<dyn PostStore>,
    pipeline: Arc<PublishPipeline>,
    interval: Duration,
    advance: chrono::Duration,
    stale_after: chrono::Duration,
    permits: Arc<Semaphore>,
    in_flight: Mutex<JoinSet<()>>,
}

impl Poller {
    pub fn new(pipeline: Arc<PublishPipeline>, cfg: &SchedulerConfig) -> Self {
        Self {
            store: pipeline.store().clone(),
            pipeline,
            interval: Duration::from_secs(cfg.interval_secs.max(1)),
            advance: window(cfg.advance_secs),
            stale_after: window(cfg.stale_after_secs),
            permits: Arc::new(Semaphore::new(cfg.max_concurrency.max(1))),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One scan: claim what is due and can start now, report stuck claims.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut in_flight = self.in_flight.lock().await;
        reap(&mut in_flight);

        let now = Utc::now();
        let due = self.store.find_due(now, self.advance)?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for (i, mut post) in due.into_iter().enumerate() {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                report.deferred = report.due - i;
                debug!(deferred = report.deferred, "publish slots busy, deferring");
                break;
            };

            if !self.store.try_claim(&post.id, PostStatus::Scheduled)? {
                debug!(post_id = %post.id, "post already claimed elsewhere");
                report.conflicts += 1;
                continue;
            }
            report.claimed += 1;
            post.status = PostStatus::Posting;

            let pipeline = Arc::clone(&self.pipeline);
            in_flight.spawn(async move {
                let _permit = permit;
                let id = post.id.clone();
                match pipeline.publish(post).await {
                    Ok(_) => {}
                    Err(e) if e.marks_failed() => debug!(post_id = %id, code = e.code(), "publish recorded as failed"),
                    Err(e) => error!(post_id = %id, error = %e, "publish did not complete"),
                }
            });
        }

        for post in self.store.find_stale_claims(now - self.stale_after)? {
            report.stale += 1;
            warn!(
                post_id = %post.id,
                claimed_at = ?post.claimed_at,
                attempts = post.attempt_count,
                "post stuck in posting"
            );
        }

        if report.due > 0 || report.stale > 0 {
            info!(
                due = report.due,
                claimed = report.claimed,
                conflicts = report.conflicts,
                deferred = report.deferred,
                stale = report.stale,
                "poller tick"
            );
        }
        Ok(report)
    }

    /// Wait until every publish started so far has finished.
    pub async fn wait_idle(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "publish task panicked");
            }
        }
    }

    /// Main loop. Ticks every interval until `shutdown` broadcasts `true`,
    /// then lets in-flight publishes finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs_f64(), "poller started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("poller tick error: {e}");
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("poller shutting down, waiting for in-flight publishes");
        self.wait_idle().await;
        info!("poller stopped");
    }
}

/// Config seconds as a chrono span, saturating at [`MAX_WINDOW_SECS`] so
/// date arithmetic on it cannot overflow.
fn window(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(res) = in_flight.try_join_next() {
        if let Err(e) = res {
            error!(error = %e, "publish task panicked");
        }
    }
}
