//! Batched interest classification over the follow graph.
//!
//! An account's interests are inferred from the accounts it follows: the
//! following set is partitioned into fixed-size batches, each batch goes to
//! the classifier with the full taxonomy, and validated results are merged
//! into interest scores with last-write-wins semantics. A failed batch is
//! skipped — its subjects stay unclassified for a future run — and a result
//! naming a category outside the taxonomy is discarded on its own.

use anyhow::Result;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::classifier::Classifier;
use crate::config::ClassifyConfig;
use crate::store::GraphStore;

pub struct InterestClassifier {
    store: GraphStore,
    classifier: Arc<dyn Classifier>,
    config: ClassifyConfig,
    /// Exact-match category lookup, loaded once from the seeded taxonomy.
    categories: HashMap<String, i64>,
    taxonomy: Vec<String>,
}

impl InterestClassifier {
    pub async fn new(
        store: GraphStore,
        classifier: Arc<dyn Classifier>,
        config: ClassifyConfig,
    ) -> Result<Self> {
        let categories = crate::taxonomy::category_map(store.pool()).await?;
        if categories.is_empty() {
            anyhow::bail!("interest taxonomy is empty; run init first");
        }

        let mut taxonomy: Vec<String> = categories.keys().cloned().collect();
        taxonomy.sort();

        Ok(Self {
            store,
            classifier,
            config,
            categories,
            taxonomy,
        })
    }

    /// Classify the accounts `user_id` follows. Returns the number of
    /// scores stored.
    pub async fn classify_account(&self, user_id: &str) -> Result<usize> {
        let followed = self.store.following_accounts(user_id).await?;
        if followed.is_empty() {
            warn!(%user_id, "no following data to classify");
            return Ok(0);
        }

        // Results name subjects by username; map back to account ids for
        // storage.
        let ids_by_username: HashMap<&str, &str> = followed
            .iter()
            .map(|f| (f.subject.username.as_str(), f.user_id.as_str()))
            .collect();

        let batches: Vec<&[_]> = followed.chunks(self.config.batch_size).collect();
        let total_batches = batches.len();
        let mut stored = 0usize;

        for (index, batch) in batches.into_iter().enumerate() {
            info!(
                %user_id,
                batch = index + 1,
                total_batches,
                "classifying batch"
            );

            let subjects: Vec<_> = batch.iter().map(|f| f.subject.clone()).collect();
            match self.classifier.classify(&self.taxonomy, &subjects).await {
                Ok(response) => {
                    stored += self.merge_results(&response.results, &ids_by_username).await?;
                }
                Err(e) => {
                    // Whole batch skipped; its accounts stay unclassified
                    // and can be retried on a future run.
                    error!(%user_id, batch = index + 1, error = %e, "classification batch failed");
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.batch_delay_secs)).await;
        }

        info!(%user_id, stored, "classification finished");
        Ok(stored)
    }

    async fn merge_results(
        &self,
        results: &[crate::models::ClassifiedAccount],
        ids_by_username: &HashMap<&str, &str>,
    ) -> Result<usize> {
        let mut stored = 0usize;
        for result in results {
            let Some(category_id) = self.categories.get(&result.category) else {
                warn!(
                    username = %result.username,
                    category = %result.category,
                    "category not in taxonomy, discarding result"
                );
                continue;
            };

            let Some(subject_id) = ids_by_username.get(result.username.as_str()) else {
                warn!(username = %result.username, "result names an unknown subject, discarding");
                continue;
            };

            self.store
                .upsert_interest(subject_id, *category_id, result.confidence.clamp(0.0, 1.0))
                .await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Accounts with a completed `following` crawl but no scores yet, up to
    /// the configured limit.
    pub async fn pending_accounts(&self) -> sqlx::Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.user_id, u.username
            FROM users u
            JOIN scrape_jobs sj
              ON u.username = sj.target_username
             AND sj.job_type = 'following'
             AND sj.status = 'completed'
            LEFT JOIN interests i ON u.user_id = i.user_id
            WHERE i.id IS NULL
            ORDER BY u.user_id
            LIMIT ?
            "#,
        )
        .bind(self.config.pending_limit)
        .fetch_all(self.store.pool())
        .await?;

        rows.into_iter()
            .map(|row| Ok((row.try_get("user_id")?, row.try_get("username")?)))
            .collect()
    }

    /// One analysis pass: classify each pending account with a fixed delay
    /// in between. Per-account failures are logged and skipped.
    pub async fn process_pending(&self) -> Result<usize> {
        let pending = self.pending_accounts().await?;
        if pending.is_empty() {
            info!("no pending accounts for interest analysis");
            return Ok(0);
        }

        let mut processed = 0usize;
        for (user_id, username) in &pending {
            info!(%username, "running interest analysis");
            match self.classify_account(user_id).await {
                Ok(_) => processed += 1,
                Err(e) => error!(%username, error = %e, "interest analysis failed"),
            }
            tokio::time::sleep(Duration::from_secs(self.config.account_delay_secs)).await;
        }

        info!(processed, "interest analysis pass finished");
        Ok(processed)
    }

    /// Periodic analysis loop; runs until the process is interrupted.
    pub async fn run(&self) -> Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.analysis_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = self.process_pending().await {
                error!(error = %e, "interest analysis pass errored");
            }
        }
    }
}
