//! Recurring passes: one cron job per active source, reconciled against the
//! store on a fixed cadence and on demand.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::source::MIN_SCRAPE_INTERVAL_MINUTES;
use crate::runner::SourceRunner;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Hour steps that divide a day evenly.
const HOUR_STEPS: [u32; 8] = [1, 2, 3, 4, 6, 8, 12, 24];

/// Cron expression (with a leading seconds field) for a polling interval.
///
/// - under an hour: `*/n` minutes when `n` divides 60, otherwise the explicit
///   minute offsets `0, n, 2n, ..` within each hour
/// - under a day: the divisor-of-24 hour step nearest to the interval, the
///   longer one on a tie
/// - a day or more: daily, or every `n` days
pub fn interval_to_cron(minutes: u32) -> String {
    let minutes = minutes.max(MIN_SCRAPE_INTERVAL_MINUTES as u32);

    if minutes < 60 {
        if 60 % minutes == 0 {
            return format!("0 */{minutes} * * * *");
        }
        let offsets: Vec<String> = (0..60)
            .step_by(minutes as usize)
            .map(|m: u32| m.to_string())
            .collect();
        return format!("0 {} * * * *", offsets.join(","));
    }

    if minutes < MINUTES_PER_DAY {
        let hours = minutes as f64 / 60.0;
        // Ties go to the longer step.
        let step = HOUR_STEPS
            .iter()
            .rev()
            .copied()
            .min_by(|a, b| {
                let da = (*a as f64 - hours).abs();
                let db = (*b as f64 - hours).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(1);
        return match step {
            1 => "0 0 * * * *".to_string(),
            24 => "0 0 0 * * *".to_string(),
            h => format!("0 0 */{h} * * *"),
        };
    }

    let days = ((minutes as f64 / MINUTES_PER_DAY as f64).round() as u32).max(1);
    if days == 1 {
        "0 0 0 * * *".to_string()
    } else {
        format!("0 0 0 */{days} * *")
    }
}

/// A source's recurring job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub source_id: i32,
    pub job_id: Uuid,
    pub interval_minutes: u32,
    pub cron: String,
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<i32>,
    pub replaced: Vec<i32>,
    pub removed: Vec<i32>,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !(self.created.is_empty() && self.replaced.is_empty() && self.removed.is_empty())
    }
}

/// Maps a source's interval in minutes to a cron expression.
pub type Cadence = fn(u32) -> String;

pub struct Scheduler {
    runner: Arc<SourceRunner>,
    cron: JobScheduler,
    cadence: Cadence,
    tasks: DashMap<i32, ScheduledTask>,
    reconciling: Mutex<()>,
}

impl Scheduler {
    pub async fn new(runner: Arc<SourceRunner>) -> Result<Self, SchedulerError> {
        Self::with_cadence(runner, interval_to_cron).await
    }

    /// A scheduler whose jobs fire on `cadence` instead of [`interval_to_cron`].
    pub async fn with_cadence(
        runner: Arc<SourceRunner>,
        cadence: Cadence,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            runner,
            cron: JobScheduler::new().await?,
            cadence,
            tasks: DashMap::new(),
            reconciling: Mutex::new(()),
        })
    }

    pub fn runner(&self) -> &Arc<SourceRunner> {
        &self.runner
    }

    /// Start firing jobs.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.cron.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Remove every job and stop the cron loop.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let ids: Vec<i32> = self.tasks.iter().map(|t| *t.key()).collect();
        for source_id in ids {
            self.remove_task(source_id).await;
        }
        self.cron.clone().shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by_key(|t| t.source_id);
        tasks
    }

    /// Bring the job set in line with the active sources: create missing
    /// jobs, replace jobs whose interval changed, drop (and cancel) jobs of
    /// sources that are gone or inactive.
    pub async fn reconcile(&self) -> Result<ReconcileReport, SchedulerError> {
        let _guard = self.reconciling.lock().await;

        let wanted: BTreeMap<i32, u32> = self
            .runner
            .store()
            .list_active_sources()
            .await?
            .into_iter()
            .map(|source| (source.id, source.effective_interval_minutes()))
            .collect();

        let mut report = ReconcileReport::default();

        let mut stale: Vec<i32> = self
            .tasks
            .iter()
            .map(|t| *t.key())
            .filter(|id| !wanted.contains_key(id))
            .collect();
        stale.sort_unstable();
        for source_id in stale {
            self.remove_task(source_id).await;
            self.runner.cancel(source_id);
            report.removed.push(source_id);
        }

        for (&source_id, &interval) in &wanted {
            let current = self.tasks.get(&source_id).map(|t| t.interval_minutes);
            match current {
                Some(existing) if existing == interval => report.unchanged += 1,
                Some(_) => {
                    self.remove_task(source_id).await;
                    match self.add_task(source_id, interval).await {
                        Ok(()) => report.replaced.push(source_id),
                        Err(e) => tracing::error!(source_id, "Failed to reschedule source: {e}"),
                    }
                }
                None => match self.add_task(source_id, interval).await {
                    Ok(()) => report.created.push(source_id),
                    Err(e) => tracing::error!(source_id, "Failed to schedule source: {e}"),
                },
            }
        }

        if report.changed() {
            tracing::info!(
                created = report.created.len(),
                replaced = report.replaced.len(),
                removed = report.removed.len(),
                unchanged = report.unchanged,
                "Reconciled scheduled sources"
            );
        }
        Ok(report)
    }

    async fn add_task(&self, source_id: i32, interval_minutes: u32) -> Result<(), SchedulerError> {
        let cron = (self.cadence)(interval_minutes);
        let runner = Arc::clone(&self.runner);
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                runner.run_scheduled(source_id).await;
            })
        })?;
        let job_id = self.cron.add(job).await?;

        tracing::info!(source_id, interval_minutes, cron = %cron, "Scheduled source");
        self.tasks.insert(
            source_id,
            ScheduledTask {
                source_id,
                job_id,
                interval_minutes,
                cron,
            },
        );
        Ok(())
    }

    async fn remove_task(&self, source_id: i32) {
        let Some((_, task)) = self.tasks.remove(&source_id) else {
            return;
        };
        if let Err(e) = self.cron.remove(&task.job_id).await {
            tracing::warn!(source_id, "Failed to remove scheduled job: {e}");
        }
        tracing::info!(source_id, "Unscheduled source");
    }

    /// Reconcile every `every` until `shutdown` fires.
    pub fn spawn_reconcile_loop(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.reconcile().await {
                            tracing::error!("Scheduler reconciliation failed: {e}");
                        }
                    }
                }
            }
            tracing::debug!("Reconcile loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_hour_intervals() {
        assert_eq!(interval_to_cron(5), "0 */5 * * * *");
        assert_eq!(interval_to_cron(15), "0 */15 * * * *");
        assert_eq!(interval_to_cron(30), "0 */30 * * * *");
        assert_eq!(interval_to_cron(45), "0 0,45 * * * *");
        assert_eq!(interval_to_cron(25), "0 0,25,50 * * * *");
        // Below the minimum is clamped.
        assert_eq!(interval_to_cron(1), "0 */5 * * * *");
    }

    #[test]
    fn sub_day_intervals_snap_to_hour_steps() {
        assert_eq!(interval_to_cron(60), "0 0 * * * *");
        assert_eq!(interval_to_cron(90), "0 0 */2 * * *");
        assert_eq!(interval_to_cron(180), "0 0 */3 * * *");
        assert_eq!(interval_to_cron(240), "0 0 */4 * * *");
        assert_eq!(interval_to_cron(300), "0 0 */6 * * *");
        assert_eq!(interval_to_cron(480), "0 0 */8 * * *");
        assert_eq!(interval_to_cron(600), "0 0 */12 * * *");
        assert_eq!(interval_to_cron(1200), "0 0 0 * * *");
    }

    #[test]
    fn day_intervals() {
        assert_eq!(interval_to_cron(1440), "0 0 0 * * *");
        assert_eq!(interval_to_cron(2 * 1440), "0 0 0 */2 * *");
        assert_eq!(interval_to_cron(7 * 1440 + 30), "0 0 0 */7 * *");
    }
}
