//! Postgres-backed feedback store.
//!
//! Reads the `feedback` table written by the submission endpoint:
//! `feedback(id UUID, category TEXT, created_at TIMESTAMPTZ, ...)`.
//! A single grouped read; the store's own snapshot isolation gives a
//! consistent point-in-time count.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::FeedbackStore;
use crate::types::{FeedbackCategory, WindowBounds, WindowQuery};

const COUNT_HALF_OPEN: &str = r#"
    SELECT category, COUNT(*)::BIGINT AS n
    FROM feedback
    WHERE created_at >= $1
      AND created_at < $2
      AND category = ANY($3)
    GROUP BY category
"#;

const COUNT_INCLUSIVE: &str = r#"
    SELECT category, COUNT(*)::BIGINT AS n
    FROM feedback
    WHERE created_at BETWEEN $1 AND $2
      AND category = ANY($3)
    GROUP BY category
"#;

/// Service over the feedback table
#[derive(Clone, Debug)]
pub struct PgFeedbackStore {
    pool: PgPool,
}

impl PgFeedbackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool; the monitor issues one query per cycle.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to feedback database")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn count_overrides(&self, window: &WindowQuery) -> Result<Vec<(FeedbackCategory, u64)>> {
        let categories: Vec<String> = window
            .counted_categories()
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();

        let sql = match window.bounds {
            WindowBounds::HalfOpen => COUNT_HALF_OPEN,
            WindowBounds::Inclusive => COUNT_INCLUSIVE,
        };

        let rows: Vec<(String, i64)> = sqlx::query_as(sql)
            .bind(window.start)
            .bind(window.end)
            .bind(categories)
            .fetch_all(&self.pool)
            .await
            .context("Failed to count feedback overrides")?;

        let mut counts = Vec::with_capacity(rows.len());
        for (category, n) in rows {
            match category.parse::<FeedbackCategory>() {
                Ok(c) => counts.push((c, n.max(0) as u64)),
                Err(_) => {
                    tracing::warn!(category = %category, "Ignoring unknown feedback category from store");
                }
            }
        }
        Ok(counts)
    }
}
