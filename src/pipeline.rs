//! Top-level run modes tying the components together.
//!
//! Three ways to drive the pipeline: `scheduled` (enroll seed targets and
//! loop the dispatcher), `manual` (one target end to end, right now), and
//! `analysis` (interest classification only). All three start from the
//! same idempotent database setup.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};

use crate::classifier::OpenAiClassifier;
use crate::client::HttpCrawlerClient;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::db;
use crate::interests::InterestClassifier;
use crate::jobs::JobStore;
use crate::migrate;
use crate::mutuals;
use crate::proxy::ProxyPool;
use crate::scheduler::{self, Scheduler};
use crate::store::GraphStore;
use crate::taxonomy;

/// Connect and bring the schema and taxonomy up to date.
pub async fn setup(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    taxonomy::seed_taxonomy(&pool).await?;
    Ok(pool)
}

fn build_crawler(config: &Config, pool: &SqlitePool) -> Crawler {
    let proxies = ProxyPool::from_config(&config.proxy);
    let client = Arc::new(HttpCrawlerClient::new(&config.crawler, proxies));
    Crawler::new(
        GraphStore::new(pool.clone()),
        JobStore::new(pool.clone()),
        client,
        &config.crawler,
    )
}

/// Enroll one target into the crawl queue. Returns whether jobs were
/// created (false when the dedup window suppressed them).
pub async fn enroll(config: &Config, handle: &str) -> Result<bool> {
    let pool = setup(config).await?;
    let jobs = JobStore::new(pool);
    scheduler::enroll_target(&jobs, config.scheduler.dedup_days, handle).await
}

/// Enroll the seed targets, then run the dispatch loop until interrupted.
pub async fn run_scheduled(config: &Config, seeds: &[String]) -> Result<()> {
    let pool = setup(config).await?;
    let jobs = JobStore::new(pool.clone());

    for handle in seeds {
        scheduler::enroll_target(&jobs, config.scheduler.dedup_days, handle).await?;
    }

    let crawler = build_crawler(config, &pool);
    let mut sched = Scheduler::new(
        GraphStore::new(pool.clone()),
        jobs,
        crawler,
        config.scheduler.clone(),
    );

    info!(tick_minutes = config.scheduler.tick_minutes, "starting scheduled pipeline");
    sched.run().await
}

/// Crawl one target end to end: profile, followers, following, mutuals,
/// interest classification. Errors are logged and folded into the returned
/// success flag rather than propagated.
pub async fn run_manual(config: &Config, handle: &str) -> Result<bool> {
    let pool = setup(config).await?;
    let store = GraphStore::new(pool.clone());
    let crawler = build_crawler(config, &pool);

    info!(%handle, "running manual crawl");
    match manual_steps(config, &store, &crawler, handle).await {
        Ok(()) => Ok(true),
        Err(e) => {
            error!(%handle, error = %e, "manual crawl failed");
            Ok(false)
        }
    }
}

async fn manual_steps(
    config: &Config,
    store: &GraphStore,
    crawler: &Crawler,
    handle: &str,
) -> Result<()> {
    let profile = crawler.fetch_profile(handle, None).await?;
    crawler.fetch_followers(handle, None, None).await?;
    crawler.fetch_following(handle, None, None).await?;
    mutuals::compute_mutuals(store, &profile.user_id).await?;

    let classifier = Arc::new(OpenAiClassifier::new(&config.classify)?);
    let interests =
        InterestClassifier::new(store.clone(), classifier, config.classify.clone()).await?;
    interests.classify_account(&profile.user_id).await?;

    Ok(())
}

/// Run the interest-analysis loop until interrupted.
pub async fn run_analysis(config: &Config) -> Result<()> {
    let pool = setup(config).await?;
    let classifier = Arc::new(OpenAiClassifier::new(&config.classify)?);
    let interests = InterestClassifier::new(
        GraphStore::new(pool),
        classifier,
        config.classify.clone(),
    )
    .await?;

    info!(
        interval_secs = config.classify.analysis_interval_secs,
        "starting interest analysis loop"
    );
    interests.run().await
}
