//! Mutual-follow derivation.

use chrono::Utc;
use tracing::info;

use crate::store::GraphStore;

/// Intersect the target's follower and following edge sets and insert a
/// mutual edge for each pair not already present. Returns the number of
/// newly inserted rows, so repeated runs over an unchanged graph return 0.
///
/// Safe when either edge set is empty: the intersection is empty and
/// nothing is inserted.
pub async fn compute_mutuals(store: &GraphStore, user_id: &str) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO mutuals (user_id, mutual_id, created_at)
        SELECT f1.user_id, f1.follower_id, ?
        FROM followers f1
        JOIN following f2
          ON f1.user_id = f2.user_id AND f1.follower_id = f2.following_id
        WHERE f1.user_id = ?
        "#,
    )
    .bind(Utc::now().timestamp())
    .bind(user_id)
    .execute(store.pool())
    .await?;

    let inserted = result.rows_affected();
    info!(%user_id, inserted, "computed mutual followers");
    Ok(inserted)
}
