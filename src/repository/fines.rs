//! Fines repository

use chrono::Utc;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::fine::{Fine, FineQuery, FineTotals, IssueFine, MarkFinePaid},
};

pub(crate) async fn insert_fine(conn: &mut PgConnection, data: &IssueFine) -> AppResult<Fine> {
    let fine = sqlx::query_as::<_, Fine>(
        r#"
        INSERT INTO fines (user_id, book_id, borrowing_id, fine_type, amount, due_date, status,
                           reason, notes)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.book_id)
    .bind(data.borrowing_id)
    .bind(data.fine_type)
    .bind(data.amount)
    .bind(data.due_date)
    .bind(&data.reason)
    .bind(&data.notes)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::NotFound("Fine references an unknown user or book".to_string())
        }
        other => other.into(),
    })?;
    Ok(fine)
}

pub(crate) async fn lock_fine(conn: &mut PgConnection, id: i32) -> AppResult<Fine> {
    sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
}

/// Overdue fine promoted from a borrowing, whatever its status
pub(crate) async fn find_promoted_fine(
    conn: &mut PgConnection,
    borrowing_id: i32,
) -> AppResult<Option<Fine>> {
    let fine = sqlx::query_as::<_, Fine>(
        "SELECT * FROM fines WHERE borrowing_id = $1 AND fine_type = 'overdue' ORDER BY id LIMIT 1",
    )
    .bind(borrowing_id)
    .fetch_optional(conn)
    .await?;
    Ok(fine)
}

/// Write back status and payment fields. A paid overdue fine also flags the
/// charge on its borrowing as paid.
pub(crate) async fn save_fine_state(conn: &mut PgConnection, fine: &Fine) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE fines SET
            status = $1,
            payment_date = $2,
            payment_method = $3,
            payment_reference = $4,
            notes = $5
        WHERE id = $6
        "#,
    )
    .bind(fine.status)
    .bind(fine.payment_date)
    .bind(&fine.payment_method)
    .bind(&fine.payment_reference)
    .bind(&fine.notes)
    .bind(fine.id)
    .execute(&mut *conn)
    .await?;

    if let Some(borrowing_id) = fine.settles_borrowing() {
        sqlx::query("UPDATE borrowings SET fine_paid = TRUE WHERE id = $1")
            .bind(borrowing_id)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(
            fine_id = fine.id,
            borrowing_id,
            "Overdue charge settled through the ledger"
        );
    }
    Ok(())
}

#[derive(Clone)]
pub struct FinesRepository {
    pool: Pool<Postgres>,
}

impl FinesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get fine by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    /// List fines, newest first
    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
        let offset = (page - 1) * per_page;

        const FILTER: &str = r#"
            WHERE ($1::INT IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR fine_type = $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM fines {}", FILTER))
            .bind(query.user_id)
            .bind(query.status)
            .bind(query.fine_type)
            .fetch_one(&self.pool)
            .await?;

        let fines = sqlx::query_as::<_, Fine>(&format!(
            "SELECT * FROM fines {} ORDER BY date_issued DESC LIMIT $4 OFFSET $5",
            FILTER
        ))
        .bind(query.user_id)
        .bind(query.status)
        .bind(query.fine_type)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((fines, total))
    }

    /// All fines of one user, newest first
    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<Fine>> {
        let fines = sqlx::query_as::<_, Fine>(
            "SELECT * FROM fines WHERE user_id = $1 ORDER BY date_issued DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    pub async fn issue(&self, data: &IssueFine) -> AppResult<Fine> {
        let mut conn = self.pool.acquire().await?;
        insert_fine(&mut conn, data).await
    }

    /// Mark a pending fine paid
    pub async fn mark_paid(&self, id: i32, data: &MarkFinePaid) -> AppResult<Fine> {
        let mut tx = self.pool.begin().await?;
        let mut fine = lock_fine(&mut tx, id).await?;

        fine.mark_paid(
            data.payment_method.as_deref(),
            data.payment_reference.as_deref(),
            data.notes.as_deref(),
            Utc::now(),
        )?;
        save_fine_state(&mut tx, &fine).await?;

        tx.commit().await?;
        Ok(fine)
    }

    pub async fn cancel(&self, id: i32) -> AppResult<Fine> {
        let mut tx = self.pool.begin().await?;
        let mut fine = lock_fine(&mut tx, id).await?;

        fine.cancel();
        save_fine_state(&mut tx, &fine).await?;

        tx.commit().await?;
        Ok(fine)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM fines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Fine with id {} not found", id)));
        }
        Ok(())
    }

    /// Pending/paid totals for one user, or library-wide when `user_id` is None
    pub async fn totals(&self, user_id: Option<i32>) -> AppResult<FineTotals> {
        let totals = sqlx::query_as::<_, FineTotals>(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0) AS pending_total,
                COALESCE(SUM(amount) FILTER (WHERE status = 'paid'), 0) AS paid_total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_count
            FROM fines
            WHERE ($1::INT IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}
