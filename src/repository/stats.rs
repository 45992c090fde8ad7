//! Dashboard counters

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres};

use crate::error::AppResult;

/// Catalog and circulation counters at one instant
#[derive(Debug, Clone, FromRow)]
pub struct CirculationCounts {
    pub total_titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub damaged_titles: i64,
    pub lost_titles: i64,
    pub active_borrowings: i64,
    pub overdue_borrowings: i64,
    pub due_today: i64,
}

#[derive(Clone)]
pub struct StatsRepository {
    pool: Pool<Postgres>,
}

impl StatsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn circulation(&self, now: DateTime<Utc>) -> AppResult<CirculationCounts> {
        let counts = sqlx::query_as::<_, CirculationCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM books) AS total_titles,
                (SELECT COALESCE(SUM(total_copies), 0)::BIGINT FROM books) AS total_copies,
                (SELECT COALESCE(SUM(available_copies), 0)::BIGINT FROM books) AS available_copies,
                (SELECT COUNT(*) FROM books WHERE status = 'damaged') AS damaged_titles,
                (SELECT COUNT(*) FROM books WHERE status = 'lost') AS lost_titles,
                (SELECT COUNT(*) FROM borrowings
                  WHERE status = 'active' AND returned_date IS NULL) AS active_borrowings,
                (SELECT COUNT(*) FROM borrowings
                  WHERE status = 'active' AND returned_date IS NULL AND due_date < $1) AS overdue_borrowings,
                (SELECT COUNT(*) FROM borrowings
                  WHERE status = 'active' AND returned_date IS NULL
                    AND due_date >= date_trunc('day', $1)
                    AND due_date < date_trunc('day', $1) + INTERVAL '1 day') AS due_today
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }
}
