//! Continuous scheduler
//!
//! Drives the [`Publisher`] from a periodic timer. Each tick runs one cycle:
//! list unpublished posts, keep the eligible ones, publish them one after the
//! other in store order. At most one cycle runs at a time; a tick that arrives
//! while a cycle is still running is dropped, not queued.
//!
//! ```text
//! Idle --tick--> RunningCycle --cycle complete--> Idle
//!                RunningCycle --tick--> (dropped)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::eligibility::is_eligible;
use crate::error::{FanoutError, Result};
use crate::events::Event;
use crate::orchestrator::Publisher;
use crate::types::{PostFilter, PublishResult};

const IDLE: u8 = 0;
const RUNNING_CYCLE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    RunningCycle,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(SweepSummary),
    /// Another cycle was still running
    Skipped,
}

/// Counts for one pass over the unpublished posts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Posts released to at least one platform
    pub published: usize,
    /// Eligible posts that were not released
    pub failed: usize,
    /// Unpublished posts whose time has not come yet
    pub skipped: usize,
    /// Results for every post that reached the orchestrator
    pub results: Vec<PublishResult>,
}

/// Periodic driver for the publish orchestrator
#[derive(Clone)]
pub struct Scheduler {
    publisher: Publisher,
    interval: Duration,
    state: Arc<AtomicU8>,
}

/// Returns the scheduler to `Idle` when the cycle ends, however it ends
struct CycleGuard<'a>(&'a AtomicU8);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(publisher: Publisher, interval: Duration) -> Self {
        Self {
            publisher,
            interval,
            state: Arc::new(AtomicU8::new(IDLE)),
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING_CYCLE => SchedulerState::RunningCycle,
            _ => SchedulerState::Idle,
        }
    }

    /// Run one cycle unless another is in progress
    ///
    /// # Errors
    ///
    /// Returns an error only if the unpublished posts cannot be listed. Errors
    /// publishing an individual post are logged and counted as failures.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        if self
            .state
            .compare_exchange(IDLE, RUNNING_CYCLE, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Previous cycle still running, dropping tick");
            self.publisher.events().emit(Event::CycleSkipped);
            return Ok(CycleOutcome::Skipped);
        }
        let _guard = CycleGuard(&self.state);

        self.sweep(now).await.map(CycleOutcome::Completed)
    }

    /// Publish every unpublished post that is eligible at `now`
    ///
    /// This is the body of a cycle without the overlap guard; the one-shot
    /// commands call it directly.
    ///
    /// # Errors
    ///
    /// Returns an error only if the unpublished posts cannot be listed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let posts = self
            .publisher
            .database()
            .list_posts(PostFilter::unpublished())
            .await?;

        let (eligible, waiting): (Vec<_>, Vec<_>) =
            posts.into_iter().partition(|post| is_eligible(post, now));

        let mut summary = SweepSummary {
            skipped: waiting.len(),
            ..Default::default()
        };

        info!(
            "Starting publish cycle: {} eligible, {} waiting",
            eligible.len(),
            waiting.len()
        );
        self.publisher.events().emit(Event::CycleStarted {
            eligible: eligible.len(),
        });

        for post in eligible {
            match self.publisher.publish(&post.id).await {
                Ok(result) => {
                    if result.success {
                        summary.published += 1;
                    } else {
                        summary.failed += 1;
                    }
                    summary.results.push(result);
                }
                Err(FanoutError::AlreadyPublished(id) | FanoutError::PublishInProgress(id)) => {
                    debug!("Post {} was published elsewhere during the cycle", id);
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("Failed to publish post {}: {}", post.id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Publish cycle complete: {} published, {} failed, {} skipped",
            summary.published, summary.failed, summary.skipped
        );
        self.publisher.events().emit(Event::CycleCompleted {
            published: summary.published,
            failed: summary.failed,
            skipped: summary.skipped,
        });

        Ok(summary)
    }

    /// Tick every interval until `shutdown` becomes true
    ///
    /// The first tick fires immediately. Each tick runs on its own task so a
    /// slow cycle never delays the timer. On shutdown the timer stops and any
    /// cycle already under way finishes before this returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        info!(
            "Scheduler started, ticking every {}",
            humantime::format_duration(self.interval)
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    in_flight.retain(|handle| !handle.is_finished());
                    let scheduler = self.clone();
                    in_flight.push(tokio::spawn(async move {
                        if let Err(e) = scheduler.tick(Utc::now()).await {
                            error!("Publish cycle failed: {}", e);
                        }
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed, stopping scheduler");
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopping, waiting for the current cycle to finish");
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("Publish cycle task failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}
