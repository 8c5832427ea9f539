use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Account records, keyed by the network's stable account id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            full_name TEXT,
            bio TEXT,
            profile_pic_url TEXT,
            follower_count INTEGER,
            following_count INTEGER,
            is_private INTEGER NOT NULL DEFAULT 0,
            last_updated INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Follower-direction edges
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS followers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(user_id),
            follower_id TEXT NOT NULL REFERENCES users(user_id),
            follow_date INTEGER NOT NULL,
            UNIQUE(user_id, follower_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Following-direction edges
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS following (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(user_id),
            following_id TEXT NOT NULL REFERENCES users(user_id),
            follow_date INTEGER NOT NULL,
            UNIQUE(user_id, following_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Derived mutual-follow edges, monotonically grown
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mutuals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(user_id),
            mutual_id TEXT NOT NULL REFERENCES users(user_id),
            created_at INTEGER NOT NULL,
            UNIQUE(user_id, mutual_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Fixed interest taxonomy (two-level tree)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interest_categories (
            category_id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_name TEXT NOT NULL UNIQUE,
            parent_category_id INTEGER REFERENCES interest_categories(category_id),
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Classification scores, one row per (account, category)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(user_id),
            category_id INTEGER NOT NULL REFERENCES interest_categories(category_id),
            confidence_score REAL NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(user_id, category_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Crawl job queue
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_jobs (
            job_id INTEGER PRIMARY KEY AUTOINCREMENT,
            target_username TEXT NOT NULL,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            started_at INTEGER,
            completed_at INTEGER,
            last_cursor TEXT,
            total_items INTEGER,
            processed_items INTEGER NOT NULL DEFAULT 0,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_followers_user_id ON followers(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_following_user_id ON following(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scrape_jobs_status ON scrape_jobs(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scrape_jobs_target ON scrape_jobs(target_username)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
