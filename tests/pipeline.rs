//! End-to-end pipeline tests over an in-memory database, with mock
//! retrieval and classification capabilities standing in for the network.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use sociograph::classifier::{Classifier, ClassifyError};
use sociograph::client::{CrawlError, CrawlerClient, FollowPager};
use sociograph::config::{ClassifyConfig, CrawlerConfig, SchedulerConfig};
use sociograph::crawler::Crawler;
use sociograph::interests::InterestClassifier;
use sociograph::jobs::JobStore;
use sociograph::migrate;
use sociograph::models::{
    AccountRef, ClassifiedAccount, ClassifyResponse, JobStatus, JobType, Profile, Subject,
};
use sociograph::mutuals::compute_mutuals;
use sociograph::scheduler::{enroll_target, Scheduler};
use sociograph::store::GraphStore;
use sociograph::taxonomy;

async fn mem_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    // A single shared connection: every handle sees the same in-memory DB.
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    migrate::run_migrations(&pool).await.unwrap();
    taxonomy::seed_taxonomy(&pool).await.unwrap();
    pool
}

fn acct(handle: &str) -> AccountRef {
    AccountRef {
        user_id: format!("id_{handle}"),
        username: handle.to_string(),
        full_name: Some(format!("{handle} name")),
        profile_pic_url: None,
        is_private: false,
    }
}

fn profile_for(handle: &str) -> Profile {
    Profile {
        user_id: format!("id_{handle}"),
        username: handle.to_string(),
        full_name: Some(format!("{handle} name")),
        bio: Some(format!("bio of {handle}")),
        profile_pic_url: None,
        follower_count: 0,
        following_count: 0,
        is_private: false,
    }
}

fn test_crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        gateway_url: "http://localhost:0".to_string(),
        timeout_secs: 5,
        min_delay_secs: 0,
        checkpoint_every: 10,
    }
}

fn test_scheduler_config(daily_quota: u32) -> SchedulerConfig {
    SchedulerConfig {
        daily_quota,
        batch_size: 10,
        dedup_days: 7,
        tick_minutes: 30,
        job_delay_min_secs: 0,
        job_delay_max_secs: 0,
    }
}

fn test_classify_config() -> ClassifyConfig {
    ClassifyConfig {
        model: "test-model".to_string(),
        batch_size: 20,
        batch_delay_secs: 0,
        account_delay_secs: 0,
        pending_limit: 5,
        max_retries: 0,
        timeout_secs: 5,
        analysis_interval_secs: 300,
    }
}

/// Canned retrieval client: listings per handle, optional mid-listing
/// failure after a fixed number of yielded items.
#[derive(Clone, Default)]
struct MockClient {
    followers: HashMap<String, Vec<AccountRef>>,
    following: HashMap<String, Vec<AccountRef>>,
    fail_listing_after: Option<usize>,
}

struct MockPager {
    items: VecDeque<AccountRef>,
    yielded: usize,
    cursor: Option<String>,
    fail_after: Option<usize>,
}

#[async_trait]
impl FollowPager for MockPager {
    async fn next(&mut self) -> Result<Option<AccountRef>, CrawlError> {
        if let Some(limit) = self.fail_after {
            if self.yielded >= limit {
                return Err(CrawlError::Transient("connection reset by peer".to_string()));
            }
        }
        match self.items.pop_front() {
            Some(item) => {
                self.yielded += 1;
                self.cursor = Some(format!("offset:{}", self.yielded));
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}

impl MockClient {
    fn pager(&self, items: Option<&Vec<AccountRef>>) -> Box<dyn FollowPager> {
        Box::new(MockPager {
            items: items.cloned().unwrap_or_default().into(),
            yielded: 0,
            cursor: None,
            fail_after: self.fail_listing_after,
        })
    }
}

#[async_trait]
impl CrawlerClient for MockClient {
    async fn fetch_profile(&self, handle: &str) -> Result<Profile, CrawlError> {
        Ok(profile_for(handle))
    }

    async fn list_followers(&self, handle: &str) -> Result<Box<dyn FollowPager>, CrawlError> {
        Ok(self.pager(self.followers.get(handle)))
    }

    async fn list_following(&self, handle: &str) -> Result<Box<dyn FollowPager>, CrawlError> {
        Ok(self.pager(self.following.get(handle)))
    }
}

/// Assigns a fixed (category, confidence) per username; subjects without an
/// assignment are omitted from the response.
struct MockClassifier {
    assignments: HashMap<String, (String, f64)>,
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(
        &self,
        _taxonomy: &[String],
        subjects: &[Subject],
    ) -> Result<ClassifyResponse, ClassifyError> {
        let results = subjects
            .iter()
            .filter_map(|s| {
                self.assignments.get(&s.username).map(|(category, confidence)| {
                    ClassifiedAccount {
                        username: s.username.clone(),
                        category: category.clone(),
                        confidence: *confidence,
                    }
                })
            })
            .collect();
        Ok(ClassifyResponse { results })
    }
}

struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(
        &self,
        _taxonomy: &[String],
        _subjects: &[Subject],
    ) -> Result<ClassifyResponse, ClassifyError> {
        Err(ClassifyError::Format("response was not JSON".to_string()))
    }
}

fn build_crawler(pool: &SqlitePool, client: MockClient) -> Crawler {
    Crawler::new(
        GraphStore::new(pool.clone()),
        JobStore::new(pool.clone()),
        Arc::new(client),
        &test_crawler_config(),
    )
}

async fn edge_count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn follow_edge_insert_is_idempotent() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    store.ensure_account(&acct("t")).await.unwrap();
    store.ensure_account(&acct("x")).await.unwrap();

    assert!(store.insert_follower("id_t", "id_x").await.unwrap());
    assert!(!store.insert_follower("id_t", "id_x").await.unwrap());
    assert_eq!(edge_count(&pool, "followers").await, 1);
}

#[tokio::test]
async fn listing_accounts_never_clobber_profile_data() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    store.upsert_profile(&profile_for("x")).await.unwrap();
    // Re-sighting the same account in a listing must not erase the bio.
    store.ensure_account(&acct("x")).await.unwrap();

    let bio: Option<String> = sqlx::query_scalar("SELECT bio FROM users WHERE user_id = 'id_x'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(bio.as_deref(), Some("bio of x"));
}

#[tokio::test]
async fn mutuals_are_exactly_the_intersection() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    for handle in ["t", "x", "y", "z"] {
        store.ensure_account(&acct(handle)).await.unwrap();
    }
    store.insert_follower("id_t", "id_x").await.unwrap();
    store.insert_follower("id_t", "id_y").await.unwrap();
    store.insert_following("id_t", "id_y").await.unwrap();
    store.insert_following("id_t", "id_z").await.unwrap();

    assert_eq!(
        store.follower_ids("id_t").await.unwrap(),
        vec!["id_x", "id_y"]
    );
    assert_eq!(
        store.following_ids("id_t").await.unwrap(),
        vec!["id_y", "id_z"]
    );

    let inserted = compute_mutuals(&store, "id_t").await.unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(store.mutual_ids("id_t").await.unwrap(), vec!["id_y"]);

    // Unchanged edge set: recomputation inserts nothing
    let inserted_again = compute_mutuals(&store, "id_t").await.unwrap();
    assert_eq!(inserted_again, 0);
    assert_eq!(edge_count(&pool, "mutuals").await, 1);
}

#[tokio::test]
async fn mutuals_with_empty_edge_set_is_safe() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    store.ensure_account(&acct("lonely")).await.unwrap();
    assert_eq!(compute_mutuals(&store, "id_lonely").await.unwrap(), 0);
}

#[tokio::test]
async fn enrollment_creates_three_jobs_then_dedups() {
    let pool = mem_pool().await;
    let jobs = JobStore::new(pool.clone());

    assert!(enroll_target(&jobs, 7, "acct1").await.unwrap());
    assert_eq!(jobs.count_by_status(JobStatus::Pending).await.unwrap(), 3);

    // Inside the dedup window: no additional jobs
    assert!(!enroll_target(&jobs, 7, "acct1").await.unwrap());
    assert_eq!(jobs.count_by_status(JobStatus::Pending).await.unwrap(), 3);
}

#[tokio::test]
async fn followers_fetch_respects_max_count() {
    let pool = mem_pool().await;
    let mut client = MockClient::default();
    client.followers.insert(
        "acct1".to_string(),
        (0..12).map(|i| acct(&format!("f{i}"))).collect(),
    );
    let crawler = build_crawler(&pool, client);

    let processed = crawler
        .fetch_followers("acct1", None, Some(5))
        .await
        .unwrap();
    assert_eq!(processed, 5);
    assert_eq!(edge_count(&pool, "followers").await, 5);

    let jobs = JobStore::new(pool.clone());
    let job = jobs.get(1).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.job_type, JobType::Followers);
    assert_eq!(job.processed_items, 5);
    assert_eq!(job.total_items, Some(5));
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn listing_failure_marks_job_failed_and_keeps_partial_edges() {
    let pool = mem_pool().await;
    let mut client = MockClient::default();
    client.followers.insert(
        "acct1".to_string(),
        (0..20).map(|i| acct(&format!("f{i}"))).collect(),
    );
    client.fail_listing_after = Some(13);
    let crawler = build_crawler(&pool, client);

    let err = crawler
        .fetch_followers("acct1", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Transient(_)));

    // Committed edges survive the failure; the checkpoint shows how far the
    // walk got.
    assert_eq!(edge_count(&pool, "followers").await, 13);
    let jobs = JobStore::new(pool.clone());
    let job = jobs.get(1).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.processed_items, 10);
    assert_eq!(job.last_cursor.as_deref(), Some("offset:10"));
    assert!(job.error_message.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn dispatch_completes_jobs_and_derives_mutuals() {
    let pool = mem_pool().await;
    let mut client = MockClient::default();
    client
        .followers
        .insert("acct1".to_string(), vec![acct("x"), acct("y")]);
    client
        .following
        .insert("acct1".to_string(), vec![acct("y"), acct("z")]);

    let store = GraphStore::new(pool.clone());
    let jobs = JobStore::new(pool.clone());
    enroll_target(&jobs, 7, "acct1").await.unwrap();

    let crawler = build_crawler(&pool, client);
    let mut scheduler = Scheduler::new(
        store.clone(),
        jobs.clone(),
        crawler,
        test_scheduler_config(200),
    );

    assert_eq!(scheduler.dispatch_batch().await.unwrap(), 3);
    assert_eq!(jobs.count_by_status(JobStatus::Completed).await.unwrap(), 3);
    assert_eq!(jobs.count_by_status(JobStatus::Pending).await.unwrap(), 0);

    // Mutuals were derived once both listing jobs completed
    assert_eq!(store.mutual_ids("id_acct1").await.unwrap(), vec!["id_y"]);

    // Nothing left to do on the next tick
    assert_eq!(scheduler.dispatch_batch().await.unwrap(), 0);
}

#[tokio::test]
async fn dispatch_never_exceeds_daily_quota() {
    let pool = mem_pool().await;
    let jobs = JobStore::new(pool.clone());
    enroll_target(&jobs, 7, "acct1").await.unwrap();
    enroll_target(&jobs, 7, "acct2").await.unwrap();

    let crawler = build_crawler(&pool, MockClient::default());
    let mut scheduler = Scheduler::new(
        GraphStore::new(pool.clone()),
        jobs.clone(),
        crawler,
        test_scheduler_config(4),
    );

    assert_eq!(scheduler.dispatch_batch().await.unwrap(), 4);
    assert_eq!(scheduler.quota().processed, 4);
    assert_eq!(jobs.count_by_status(JobStatus::Pending).await.unwrap(), 2);

    // Quota exhausted: dispatch defers without touching the queue
    assert_eq!(scheduler.dispatch_batch().await.unwrap(), 0);
    assert_eq!(scheduler.quota().processed, 4);
    assert_eq!(jobs.count_by_status(JobStatus::Pending).await.unwrap(), 2);
}

#[tokio::test]
async fn failed_jobs_do_not_consume_quota() {
    let pool = mem_pool().await;
    let jobs = JobStore::new(pool.clone());
    enroll_target(&jobs, 7, "acct1").await.unwrap();

    // Listings die on the first item; the profile job still succeeds
    let mut client = MockClient::default();
    client
        .followers
        .insert("acct1".to_string(), vec![acct("x")]);
    client
        .following
        .insert("acct1".to_string(), vec![acct("y")]);
    client.fail_listing_after = Some(0);

    let crawler = build_crawler(&pool, client);
    let mut scheduler = Scheduler::new(
        GraphStore::new(pool.clone()),
        jobs.clone(),
        crawler,
        test_scheduler_config(200),
    );

    assert_eq!(scheduler.dispatch_batch().await.unwrap(), 1);
    assert_eq!(scheduler.quota().processed, 1);
    assert_eq!(jobs.count_by_status(JobStatus::Failed).await.unwrap(), 2);
    assert_eq!(jobs.count_by_status(JobStatus::Completed).await.unwrap(), 1);
}

#[tokio::test]
async fn interest_scores_are_last_write_wins() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());
    store.ensure_account(&acct("x")).await.unwrap();

    let categories = taxonomy::category_map(&pool).await.unwrap();
    let music = categories["Music"];

    store.upsert_interest("id_x", music, 0.9).await.unwrap();
    // A later merge overwrites unconditionally, even with a lower score
    store.upsert_interest("id_x", music, 0.4).await.unwrap();

    assert_eq!(store.interest_count("id_x").await.unwrap(), 1);
    assert_eq!(
        store.interest_confidence("id_x", music).await.unwrap(),
        Some(0.4)
    );
}

#[tokio::test]
async fn unknown_categories_are_discarded_without_failing_the_batch() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    for handle in ["t", "a", "b", "c"] {
        store.ensure_account(&acct(handle)).await.unwrap();
    }
    for followed in ["a", "b", "c"] {
        store
            .insert_following("id_t", &format!("id_{followed}"))
            .await
            .unwrap();
    }

    let mut assignments = HashMap::new();
    assignments.insert("a".to_string(), ("Astrology".to_string(), 0.9));
    assignments.insert("b".to_string(), ("Music".to_string(), 0.8));
    assignments.insert("c".to_string(), ("Sports".to_string(), 0.7));

    let interests = InterestClassifier::new(
        store.clone(),
        Arc::new(MockClassifier { assignments }),
        test_classify_config(),
    )
    .await
    .unwrap();

    let stored = interests.classify_account("id_t").await.unwrap();
    assert_eq!(stored, 2);

    // "Astrology" is outside the taxonomy: no row for that subject
    assert_eq!(store.interest_count("id_a").await.unwrap(), 0);
    assert_eq!(store.interest_count("id_b").await.unwrap(), 1);
    assert_eq!(store.interest_count("id_c").await.unwrap(), 1);
}

#[tokio::test]
async fn classify_with_no_following_data_is_a_noop() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());
    store.ensure_account(&acct("t")).await.unwrap();

    let interests = InterestClassifier::new(
        store.clone(),
        Arc::new(MockClassifier {
            assignments: HashMap::new(),
        }),
        test_classify_config(),
    )
    .await
    .unwrap();

    assert_eq!(interests.classify_account("id_t").await.unwrap(), 0);
    assert_eq!(edge_count(&pool, "interests").await, 0);
}

#[tokio::test]
async fn failed_classification_batch_leaves_subjects_unclassified() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    for handle in ["t", "a", "b"] {
        store.ensure_account(&acct(handle)).await.unwrap();
    }
    store.insert_following("id_t", "id_a").await.unwrap();
    store.insert_following("id_t", "id_b").await.unwrap();

    let interests = InterestClassifier::new(
        store.clone(),
        Arc::new(FailingClassifier),
        test_classify_config(),
    )
    .await
    .unwrap();

    // The batch is skipped, not fatal
    assert_eq!(interests.classify_account("id_t").await.unwrap(), 0);
    assert_eq!(edge_count(&pool, "interests").await, 0);
}

#[tokio::test]
async fn process_pending_picks_accounts_with_completed_following_crawls() {
    let pool = mem_pool().await;
    let store = GraphStore::new(pool.clone());

    // acct1 has a completed following crawl and followed accounts on record
    let mut client = MockClient::default();
    client
        .following
        .insert("acct1".to_string(), vec![acct("a"), acct("b")]);
    let crawler = build_crawler(&pool, client);
    crawler.fetch_following("acct1", None, None).await.unwrap();

    let mut assignments = HashMap::new();
    assignments.insert("a".to_string(), ("Travel".to_string(), 0.6));
    assignments.insert("b".to_string(), ("Food".to_string(), 0.9));

    let interests = InterestClassifier::new(
        store.clone(),
        Arc::new(MockClassifier { assignments }),
        test_classify_config(),
    )
    .await
    .unwrap();

    let pending = interests.pending_accounts().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].1, "acct1");

    assert_eq!(interests.process_pending().await.unwrap(), 1);
    assert_eq!(store.interest_count("id_a").await.unwrap(), 1);
    assert_eq!(store.interest_count("id_b").await.unwrap(), 1);
}
