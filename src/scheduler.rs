//! Quota-governed job dispatch.
//!
//! A fixed tick drives [`Scheduler::dispatch_batch`], which drains pending
//! jobs in FIFO order under a daily processing quota. Job failures are
//! recorded as state and never abort the surrounding batch.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rand::Rng;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::client::CrawlError;
use crate::config::SchedulerConfig;
use crate::crawler::Crawler;
use crate::jobs::JobStore;
use crate::models::{CrawlJob, JobType};
use crate::mutuals;
use crate::store::GraphStore;

/// Daily-quota bookkeeping owned by the scheduler. Reset is a pure function
/// of the stored date versus the current date — never of elapsed time, so
/// restarts cannot drift the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub date: NaiveDate,
    pub processed: u32,
}

impl QuotaState {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, processed: 0 }
    }

    /// Zero the counter when the calendar date has changed.
    pub fn roll(&mut self, today: NaiveDate) {
        if today != self.date {
            self.date = today;
            self.processed = 0;
        }
    }

    pub fn remaining(&self, quota: u32) -> u32 {
        quota.saturating_sub(self.processed)
    }
}

/// Enroll a target: one pending job per type, unless the target already has
/// a queued job or one started inside the dedup window. Returns whether
/// jobs were created.
pub async fn enroll_target(
    jobs: &JobStore,
    dedup_days: u32,
    handle: &str,
) -> Result<bool> {
    let window_secs = i64::from(dedup_days) * 86_400;
    if jobs.has_recent_job(handle, window_secs).await? {
        info!(%handle, "target already has recent jobs, skipping enrollment");
        return Ok(false);
    }

    for job_type in [JobType::Profile, JobType::Followers, JobType::Following] {
        jobs.create_pending(handle, job_type).await?;
    }
    info!(%handle, "enrolled target for crawling");
    Ok(true)
}

pub struct Scheduler {
    store: GraphStore,
    jobs: JobStore,
    crawler: Crawler,
    config: SchedulerConfig,
    quota: QuotaState,
}

impl Scheduler {
    pub fn new(store: GraphStore, jobs: JobStore, crawler: Crawler, config: SchedulerConfig) -> Self {
        Self {
            store,
            jobs,
            crawler,
            config,
            quota: QuotaState::new(Utc::now().date_naive()),
        }
    }

    pub fn quota(&self) -> QuotaState {
        self.quota
    }

    pub async fn enroll(&self, handle: &str) -> Result<bool> {
        enroll_target(&self.jobs, self.config.dedup_days, handle).await
    }

    /// One dispatch tick: pull up to `min(remaining quota, batch size)`
    /// pending jobs and process them sequentially. Returns the number of
    /// jobs that completed successfully.
    pub async fn dispatch_batch(&mut self) -> Result<u32> {
        self.quota.roll(Utc::now().date_naive());

        if self.quota.processed >= self.config.daily_quota {
            info!(
                quota = self.config.daily_quota,
                "daily quota reached, deferring until tomorrow"
            );
            return Ok(0);
        }

        let remaining = self.quota.remaining(self.config.daily_quota);
        let limit = remaining.min(self.config.batch_size);
        let batch = self.jobs.pending_batch(i64::from(limit)).await?;

        if batch.is_empty() {
            info!("no pending jobs");
            return Ok(0);
        }

        let mut succeeded = 0u32;
        for job in batch {
            self.pause_between_jobs().await;
            info!(
                job_id = job.job_id,
                target = %job.target_username,
                kind = job.job_type.as_str(),
                "processing job"
            );

            match self.run_job(&job).await {
                Ok(()) => {
                    self.quota.processed += 1;
                    succeeded += 1;
                    self.maybe_compute_mutuals(&job).await;
                }
                Err(e) => {
                    // The crawler already flipped the job to failed; the
                    // batch keeps going and the quota is not charged.
                    error!(job_id = job.job_id, error = %e, "job failed");
                    self.jobs.fail(job.job_id, &e.to_string()).await?;
                }
            }
        }

        info!(
            processed_today = self.quota.processed,
            quota = self.config.daily_quota,
            "dispatch batch finished"
        );
        Ok(succeeded)
    }

    async fn run_job(&self, job: &CrawlJob) -> Result<(), CrawlError> {
        match job.job_type {
            JobType::Profile => {
                self.crawler
                    .fetch_profile(&job.target_username, Some(job.job_id))
                    .await?;
            }
            JobType::Followers => {
                self.crawler
                    .fetch_followers(&job.target_username, Some(job.job_id), None)
                    .await?;
            }
            JobType::Following => {
                self.crawler
                    .fetch_following(&job.target_username, Some(job.job_id), None)
                    .await?;
            }
        }
        Ok(())
    }

    /// After a listing job completes, derive mutuals once its sibling
    /// listing has also completed. Derivation failures are logged, not
    /// fatal: the next completed listing for the target retries it.
    async fn maybe_compute_mutuals(&self, job: &CrawlJob) {
        let Some(sibling) = job.job_type.sibling() else {
            return;
        };

        let ready = match self
            .jobs
            .sibling_completed(&job.target_username, sibling)
            .await
        {
            Ok(ready) => ready,
            Err(e) => {
                error!(target = %job.target_username, error = %e, "sibling lookup failed");
                return;
            }
        };
        if !ready {
            return;
        }

        match self.store.user_id_for(&job.target_username).await {
            Ok(Some(user_id)) => {
                if let Err(e) = mutuals::compute_mutuals(&self.store, &user_id).await {
                    error!(target = %job.target_username, error = %e, "mutual computation failed");
                }
            }
            Ok(None) => {
                warn!(target = %job.target_username, "target has no stored account record");
            }
            Err(e) => {
                error!(target = %job.target_username, error = %e, "account lookup failed");
            }
        }
    }

    async fn pause_between_jobs(&self) {
        let min = self.config.job_delay_min_secs;
        let max = self.config.job_delay_max_secs;
        if max == 0 {
            return;
        }
        let secs = rand::thread_rng().gen_range(min as f64..=max as f64);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Tick-driven dispatch loop; runs until the process is interrupted.
    pub async fn run(&mut self) -> Result<()> {
        let tick = Duration::from_secs(self.config.tick_minutes * 60);
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            if let Err(e) = self.dispatch_batch().await {
                error!(error = %e, "dispatch batch errored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn roll_keeps_count_within_same_day() {
        let mut quota = QuotaState::new(day("2025-03-01"));
        quota.processed = 42;
        quota.roll(day("2025-03-01"));
        assert_eq!(quota.processed, 42);
    }

    #[test]
    fn roll_resets_on_date_change() {
        let mut quota = QuotaState::new(day("2025-03-01"));
        quota.processed = 42;
        quota.roll(day("2025-03-02"));
        assert_eq!(quota, QuotaState::new(day("2025-03-02")));
    }

    #[test]
    fn roll_resets_once_per_date_change() {
        let mut quota = QuotaState::new(day("2025-03-01"));
        quota.processed = 7;
        quota.roll(day("2025-03-02"));
        quota.processed = 3;
        // Further ticks on the same day keep the counter
        quota.roll(day("2025-03-02"));
        assert_eq!(quota.processed, 3);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let mut quota = QuotaState::new(day("2025-03-01"));
        quota.processed = 250;
        assert_eq!(quota.remaining(200), 0);
    }
}
