//! Durable storage for accounts, follow edges, and classification scores.
//!
//! Every write commits before the caller moves to the next unit of work, so
//! an interrupted crawl loses at most the in-flight item.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::models::{AccountRef, FollowedAccount, Profile, Subject};

/// Follow-graph side of the relational store. Owns `users`, `followers`,
/// `following`, `mutuals`, and `interests`; the job queue lives in
/// [`crate::jobs::JobStore`].
#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store a full profile snapshot, overwriting every attribute of an
    /// existing record.
    pub async fn upsert_profile(&self, profile: &Profile) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users
                (user_id, username, full_name, bio, profile_pic_url,
                 follower_count, following_count, is_private, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                full_name = excluded.full_name,
                bio = excluded.bio,
                profile_pic_url = excluded.profile_pic_url,
                follower_count = excluded.follower_count,
                following_count = excluded.following_count,
                is_private = excluded.is_private,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.username)
        .bind(&profile.full_name)
        .bind(&profile.bio)
        .bind(&profile.profile_pic_url)
        .bind(profile.follower_count)
        .bind(profile.following_count)
        .bind(profile.is_private)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a minimal account record if the account has never been seen.
    /// Never overwrites richer data from an earlier profile fetch.
    pub async fn ensure_account(&self, account: &AccountRef) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, full_name, profile_pic_url, is_private, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(&account.user_id)
        .bind(&account.username)
        .bind(&account.full_name)
        .bind(&account.profile_pic_url)
        .bind(account.is_private)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record that `follower_id` follows `user_id`. Duplicate inserts are
    /// no-ops; returns whether a row was actually written.
    pub async fn insert_follower(&self, user_id: &str, follower_id: &str) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO followers (user_id, follower_id, follow_date) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(follower_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that `user_id` follows `following_id`. Duplicate inserts are
    /// no-ops; returns whether a row was actually written.
    pub async fn insert_following(&self, user_id: &str, following_id: &str) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO following (user_id, following_id, follow_date) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(following_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn user_id_for(&self, username: &str) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar("SELECT user_id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn follower_ids(&self, user_id: &str) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar("SELECT follower_id FROM followers WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn following_ids(&self, user_id: &str) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar("SELECT following_id FROM following WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn mutual_ids(&self, user_id: &str) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar("SELECT mutual_id FROM mutuals WHERE user_id = ? ORDER BY mutual_id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Load the accounts `user_id` follows as classification subjects.
    pub async fn following_accounts(&self, user_id: &str) -> sqlx::Result<Vec<FollowedAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT u.user_id, u.username, u.full_name, u.bio
            FROM following f
            JOIN users u ON f.following_id = u.user_id
            WHERE f.user_id = ?
            ORDER BY f.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            accounts.push(FollowedAccount {
                user_id: row.try_get("user_id")?,
                subject: Subject {
                    username: row.try_get("username")?,
                    full_name: row
                        .try_get::<Option<String>, _>("full_name")?
                        .unwrap_or_default(),
                    bio: row.try_get::<Option<String>, _>("bio")?.unwrap_or_default(),
                },
            });
        }

        Ok(accounts)
    }

    /// Merge one classification score, last-write-wins on the
    /// (account, category) pair.
    pub async fn upsert_interest(
        &self,
        user_id: &str,
        category_id: i64,
        confidence: f64,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interests (user_id, category_id, confidence_score, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, category_id) DO UPDATE SET
                confidence_score = excluded.confidence_score,
                created_at = excluded.created_at
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(confidence)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn interest_count(&self, user_id: &str) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM interests WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn interest_confidence(
        &self,
        user_id: &str,
        category_id: i64,
    ) -> sqlx::Result<Option<f64>> {
        sqlx::query_scalar(
            "SELECT confidence_score FROM interests WHERE user_id = ? AND category_id = ?",
        )
        .bind(user_id)
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await
    }
}
