//! Fixed interest taxonomy.
//!
//! The category set is a closed enumeration seeded once at startup; the
//! classifier must answer from it and anything else is discarded
//! downstream. Names are matched case-sensitively.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

/// (name, parent name, description). Parents precede their children.
pub const CATEGORIES: &[(&str, Option<&str>, &str)] = &[
    ("Fashion", None, "Clothing, style, and fashion trends"),
    (
        "Technology",
        None,
        "Technology products, software, and digital innovation",
    ),
    ("Sports", None, "Athletic activities, teams, and sporting events"),
    ("Fitness", None, "Exercise, workouts, and physical health"),
    ("Food", None, "Cooking, recipes, restaurants, and culinary content"),
    ("Travel", None, "Destinations, trips, and travel experiences"),
    ("Art", None, "Visual arts, painting, sculpture, and artistic content"),
    ("Music", None, "Musicians, bands, concerts, and music content"),
    ("Photography", None, "Photos, cameras, and photography techniques"),
    ("Beauty", None, "Makeup, skincare, and beauty products"),
    ("Gaming", None, "Video games, gaming culture, and esports"),
    (
        "Business",
        None,
        "Entrepreneurship, finance, and professional content",
    ),
    ("Entertainment", None, "Movies, TV shows, and celebrity content"),
    ("Education", None, "Learning, teaching, and educational resources"),
    ("Science", None, "Scientific discoveries, research, and concepts"),
    ("Politics", None, "Political figures, events, and discussions"),
    (
        "Lifestyle",
        None,
        "Home, family, personal development, and daily life",
    ),
    ("Humor", None, "Comedy, memes, and funny content"),
    ("Streetwear", Some("Fashion"), "Urban and casual fashion styles"),
    (
        "Luxury Fashion",
        Some("Fashion"),
        "High-end designer clothing and accessories",
    ),
    (
        "Sustainable Fashion",
        Some("Fashion"),
        "Eco-friendly and ethical fashion",
    ),
    (
        "Mobile Tech",
        Some("Technology"),
        "Smartphones, tablets, and mobile accessories",
    ),
    (
        "AI & Machine Learning",
        Some("Technology"),
        "Artificial intelligence and machine learning",
    ),
    ("Programming", Some("Technology"), "Software development and coding"),
    ("Football", Some("Sports"), "Soccer/football teams and events"),
    ("Basketball", Some("Sports"), "Basketball teams and events"),
    ("Formula 1", Some("Sports"), "Formula 1 racing"),
];

/// Seed the taxonomy. Idempotent: re-seeding only refreshes descriptions.
/// A duplicate name in the seed list is a hard error.
pub async fn seed_taxonomy(pool: &SqlitePool) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, _, _) in CATEGORIES {
        if !seen.insert(*name) {
            bail!("duplicate category name in taxonomy: {name}");
        }
    }

    for (name, parent, description) in CATEGORIES {
        let parent_id: Option<i64> = match parent {
            Some(parent_name) => Some(
                sqlx::query_scalar(
                    "SELECT category_id FROM interest_categories WHERE category_name = ?",
                )
                .bind(parent_name)
                .fetch_one(pool)
                .await?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO interest_categories (category_name, parent_category_id, description)
            VALUES (?, ?, ?)
            ON CONFLICT(category_name) DO UPDATE SET description = excluded.description
            "#,
        )
        .bind(name)
        .bind(parent_id)
        .bind(description)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Category name → id, for exact-match validation of classifier output.
pub async fn category_map(pool: &SqlitePool) -> sqlx::Result<HashMap<String, i64>> {
    let rows = sqlx::query("SELECT category_id, category_name FROM interest_categories")
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| {
            let id: i64 = row.try_get("category_id")?;
            let name: String = row.try_get("category_name")?;
            Ok((name, id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_list_has_no_duplicates() {
        let mut seen = HashSet::new();
        for (name, _, _) in CATEGORIES {
            assert!(seen.insert(*name), "duplicate category: {name}");
        }
    }

    #[test]
    fn parents_precede_children() {
        let mut defined = HashSet::new();
        for (name, parent, _) in CATEGORIES {
            if let Some(parent) = parent {
                assert!(defined.contains(parent), "{name} listed before {parent}");
            }
            defined.insert(*name);
        }
    }
}
