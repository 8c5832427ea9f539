//! Paginated follow-graph retrieval with rate limiting and checkpointing.
//!
//! Each operation wraps a crawl job end to end: claim or create the job,
//! walk the listing item by item under the rate limiter, persist edges as
//! they arrive, checkpoint progress, and leave the job `completed` or
//! `failed`. Partial edges committed before a failure stay in the store —
//! there is no rollback, so a later run can pick up incrementally.

use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

use crate::client::{CrawlError, CrawlerClient};
use crate::config::CrawlerConfig;
use crate::jobs::JobStore;
use crate::models::{JobType, Profile};
use crate::store::GraphStore;

/// Enforces a minimum spacing between item fetches, with 0–5 s of uniform
/// jitter on top whenever a wait is needed.
pub struct RateLimiter {
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
        }
    }

    /// Base wait required to keep `min_delay` between requests, before
    /// jitter. `None` when enough time has already passed.
    fn required_delay(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request?;
        let elapsed = now.duration_since(last);
        if elapsed >= self.min_delay {
            None
        } else {
            Some(self.min_delay - elapsed)
        }
    }

    fn mark_request(&mut self, now: Instant) {
        self.last_request = Some(now);
    }
}

async fn throttle(limiter: &Mutex<RateLimiter>) {
    let base = limiter.lock().unwrap().required_delay(Instant::now());
    if let Some(base) = base {
        let jitter = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..5.0));
        tokio::time::sleep(base + jitter).await;
    }
    limiter.lock().unwrap().mark_request(Instant::now());
}

enum Listing {
    Followers,
    Following,
}

/// Drives retrieval of one account's profile, followers, or following list.
pub struct Crawler {
    store: GraphStore,
    jobs: JobStore,
    client: Arc<dyn CrawlerClient>,
    limiter: Mutex<RateLimiter>,
    checkpoint_every: i64,
}

impl Crawler {
    pub fn new(
        store: GraphStore,
        jobs: JobStore,
        client: Arc<dyn CrawlerClient>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            store,
            jobs,
            client,
            limiter: Mutex::new(RateLimiter::new(Duration::from_secs(config.min_delay_secs))),
            checkpoint_every: config.checkpoint_every,
        }
    }

    /// Retrieve one profile snapshot and overwrite the stored account
    /// record. Wraps the given queued job if there is one.
    pub async fn fetch_profile(
        &self,
        handle: &str,
        job_id: Option<i64>,
    ) -> Result<Profile, CrawlError> {
        let job_id = match job_id {
            Some(id) => {
                self.jobs.claim(id).await?;
                id
            }
            None => self.jobs.create_in_progress(handle, JobType::Profile).await?,
        };

        match self.fetch_profile_inner(handle).await {
            Ok(profile) => {
                self.jobs.complete(job_id, 1).await?;
                info!(%handle, "stored profile snapshot");
                Ok(profile)
            }
            Err(e) => {
                self.jobs.fail(job_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn fetch_profile_inner(&self, handle: &str) -> Result<Profile, CrawlError> {
        throttle(&self.limiter).await;
        let profile = self.client.fetch_profile(handle).await?;
        self.store.upsert_profile(&profile).await?;
        Ok(profile)
    }

    /// Walk the target's follower listing, inserting accounts and
    /// follower-direction edges. `max_count` bounds the walk for test and
    /// sampling runs.
    pub async fn fetch_followers(
        &self,
        handle: &str,
        job_id: Option<i64>,
        max_count: Option<i64>,
    ) -> Result<i64, CrawlError> {
        self.fetch_listing(handle, Listing::Followers, job_id, max_count)
            .await
    }

    /// Walk the target's following listing, inserting accounts and
    /// following-direction edges.
    pub async fn fetch_following(
        &self,
        handle: &str,
        job_id: Option<i64>,
        max_count: Option<i64>,
    ) -> Result<i64, CrawlError> {
        self.fetch_listing(handle, Listing::Following, job_id, max_count)
            .await
    }

    async fn fetch_listing(
        &self,
        handle: &str,
        listing: Listing,
        job_id: Option<i64>,
        max_count: Option<i64>,
    ) -> Result<i64, CrawlError> {
        let job_type = match listing {
            Listing::Followers => JobType::Followers,
            Listing::Following => JobType::Following,
        };

        let job_id = match job_id {
            Some(id) => {
                self.jobs.claim(id).await?;
                id
            }
            None => self.jobs.create_in_progress(handle, job_type).await?,
        };

        match self.walk_listing(handle, listing, job_id, max_count).await {
            Ok(count) => {
                self.jobs.complete(job_id, count).await?;
                info!(%handle, kind = job_type.as_str(), count, "listing crawl completed");
                Ok(count)
            }
            Err(e) => {
                // Edges committed so far stay put; only the job flips to
                // failed.
                self.jobs.fail(job_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn walk_listing(
        &self,
        handle: &str,
        listing: Listing,
        job_id: i64,
        max_count: Option<i64>,
    ) -> Result<i64, CrawlError> {
        throttle(&self.limiter).await;
        let profile = self.client.fetch_profile(handle).await?;
        self.store.upsert_profile(&profile).await?;
        let user_id = profile.user_id;

        let mut pager = match listing {
            Listing::Followers => self.client.list_followers(handle).await?,
            Listing::Following => self.client.list_following(handle).await?,
        };

        let mut processed: i64 = 0;
        loop {
            throttle(&self.limiter).await;
            let Some(account) = pager.next().await? else {
                break;
            };

            self.store.ensure_account(&account).await?;
            match listing {
                Listing::Followers => {
                    self.store.insert_follower(&user_id, &account.user_id).await?;
                }
                Listing::Following => {
                    self.store.insert_following(&user_id, &account.user_id).await?;
                }
            }

            processed += 1;
            if processed % self.checkpoint_every == 0 {
                self.jobs
                    .record_progress(job_id, processed, pager.cursor())
                    .await?;
            }
            if max_count.is_some_and(|max| processed >= max) {
                break;
            }
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delay_before_first_request() {
        let limiter = RateLimiter::new(Duration::from_secs(3));
        assert_eq!(limiter.required_delay(Instant::now()), None);
    }

    #[test]
    fn delay_covers_remaining_spacing() {
        let mut limiter = RateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();
        limiter.mark_request(start);

        let one_sec_later = start + Duration::from_secs(1);
        let needed = limiter.required_delay(one_sec_later).unwrap();
        assert_eq!(needed, Duration::from_secs(2));
    }

    #[test]
    fn no_delay_once_spacing_elapsed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();
        limiter.mark_request(start);
        assert_eq!(limiter.required_delay(start + Duration::from_secs(3)), None);
        assert_eq!(limiter.required_delay(start + Duration::from_secs(10)), None);
    }
}
