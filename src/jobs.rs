//! Durable crawl-job queue over the `scrape_jobs` table.
//!
//! Jobs move `pending → in_progress → {completed, failed}`; terminal rows
//! are never re-enqueued here — a failed target needs operator
//! re-enrollment.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::models::{CrawlJob, JobStatus, JobType};

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether the target already has a job that blocks re-enrollment: any
    /// still-queued job, or one started inside the dedup window.
    pub async fn has_recent_job(&self, target: &str, window_secs: i64) -> sqlx::Result<bool> {
        let cutoff = Utc::now().timestamp() - window_secs;
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM scrape_jobs
            WHERE target_username = ?
              AND job_type IN ('profile', 'followers', 'following')
              AND (status = 'pending' OR started_at > ?)
            "#,
        )
        .bind(target)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn create_pending(&self, target: &str, job_type: JobType) -> sqlx::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO scrape_jobs (target_username, job_type, status) VALUES (?, ?, 'pending')",
        )
        .bind(target)
        .bind(job_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Create a job that starts immediately, bypassing the queue. Used by
    /// manual runs where no pending row exists.
    pub async fn create_in_progress(&self, target: &str, job_type: JobType) -> sqlx::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO scrape_jobs (target_username, job_type, status, started_at)
            VALUES (?, ?, 'in_progress', ?)
            "#,
        )
        .bind(target)
        .bind(job_type.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Move a queued job to `in_progress` and stamp its start time.
    pub async fn claim(&self, job_id: i64) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE scrape_jobs SET status = 'in_progress', started_at = ? WHERE job_id = ?",
        )
        .bind(Utc::now().timestamp())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Pending jobs in creation (FIFO) order, up to `limit`.
    pub async fn pending_batch(&self, limit: i64) -> sqlx::Result<Vec<CrawlJob>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, target_username, job_type, status, started_at, completed_at,
                   last_cursor, total_items, processed_items, error_message
            FROM scrape_jobs
            WHERE status = 'pending'
            ORDER BY job_id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Checkpoint progress mid-crawl so an interrupted job records how far
    /// it got and where pagination stood.
    pub async fn record_progress(
        &self,
        job_id: i64,
        processed: i64,
        cursor: Option<&str>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE scrape_jobs SET processed_items = ?, last_cursor = ? WHERE job_id = ?",
        )
        .bind(processed)
        .bind(cursor)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn complete(&self, job_id: i64, total: i64) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            UPDATE scrape_jobs
            SET status = 'completed', completed_at = ?, total_items = ?, processed_items = ?
            WHERE job_id = ?
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(total)
        .bind(total)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fail(&self, job_id: i64, message: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE scrape_jobs SET status = 'failed', error_message = ? WHERE job_id = ?")
            .bind(message)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Whether the paired listing job (followers vs. following) for the
    /// target has completed.
    pub async fn sibling_completed(&self, target: &str, sibling: JobType) -> sqlx::Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM scrape_jobs
            WHERE target_username = ? AND job_type = ? AND status = 'completed'
            "#,
        )
        .bind(target)
        .bind(sibling.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn get(&self, job_id: i64) -> sqlx::Result<Option<CrawlJob>> {
        let row = sqlx::query(
            r#"
            SELECT job_id, target_username, job_type, status, started_at, completed_at,
                   last_cursor, total_items, processed_items, error_message
            FROM scrape_jobs
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn count_by_status(&self, status: JobStatus) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM scrape_jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
    }
}

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<CrawlJob> {
    let type_str: String = row.try_get("job_type")?;
    let status_str: String = row.try_get("status")?;

    let job_type = JobType::parse(&type_str)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown job_type: {type_str}").into()))?;
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown job status: {status_str}").into()))?;

    Ok(CrawlJob {
        job_id: row.try_get("job_id")?,
        target_username: row.try_get("target_username")?,
        job_type,
        status,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_cursor: row.try_get("last_cursor")?,
        total_items: row.try_get("total_items")?,
        processed_items: row.try_get("processed_items")?,
        error_message: row.try_get("error_message")?,
    })
}
