//! Borrowings repository: the borrow and return transactions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, PgConnection, Pool, Postgres, Row};

use super::{
    books::{lock_book, save_copy_state},
    fines::{find_promoted_fine, insert_fine},
    users::lock_user,
};
use crate::{
    config::LibraryPolicy,
    error::{is_unique_violation, AppError, AppResult, LendingError},
    models::{
        book::BookShort,
        borrowing::{
            self, Borrowing, BorrowingDetails, BorrowingQuery, BorrowingState, ReturnCondition,
            ReturnOutcome,
        },
        user::UserShort,
    },
};

/// Partial unique index over open borrowings per (user, book)
const ONE_ACTIVE_PER_USER_BOOK: &str = "borrowings_one_active_per_user_book";

const DETAILS_SELECT: &str = r#"
    SELECT br.*,
           b.isbn AS book_isbn, b.title AS book_title,
           u.username, u.full_name, u.role
    FROM borrowings br
    JOIN books b ON b.id = br.book_id
    JOIN users u ON u.id = br.user_id
"#;

/// SQL predicate for a derived state; `$3` is "now"
fn state_condition(state: BorrowingState) -> &'static str {
    match state {
        BorrowingState::Active => {
            "br.status = 'active' AND br.returned_date IS NULL AND br.due_date >= $3"
        }
        BorrowingState::Overdue => {
            "br.status = 'active' AND br.returned_date IS NULL AND br.due_date < $3"
        }
        BorrowingState::Returned => "br.status IN ('returned', 'overdue')",
        BorrowingState::Lost => "br.status = 'lost'",
        BorrowingState::Damaged => "br.status = 'damaged'",
    }
}

/// Whether the predicate compares against "now"
fn state_uses_now(state: BorrowingState) -> bool {
    matches!(state, BorrowingState::Active | BorrowingState::Overdue)
}

async fn lock_borrowing(conn: &mut PgConnection, id: i32) -> AppResult<Borrowing> {
    sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LendingError::NotFound.into())
}

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrowing by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LendingError::NotFound.into())
    }

    pub async fn get_details(
        &self,
        id: i32,
        now: DateTime<Utc>,
        fine_per_day: Decimal,
    ) -> AppResult<BorrowingDetails> {
        let row = sqlx::query(&format!("{} WHERE br.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LendingError::NotFound)?;

        details_from_row(&row, now, fine_per_day)
    }

    /// Borrowings of one user, open ones first
    pub async fn list_for_user(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
        fine_per_day: Decimal,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let rows = sqlx::query(&format!(
            "{} WHERE br.user_id = $1 ORDER BY (br.returned_date IS NULL) DESC, br.borrowed_date DESC",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| details_from_row(row, now, fine_per_day))
            .collect()
    }

    /// List borrowings with filters and pagination
    pub async fn list(
        &self,
        query: &BorrowingQuery,
        now: DateTime<Utc>,
        fine_per_day: Decimal,
    ) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
        let offset = (page - 1) * per_page;

        let mut conditions = vec![
            "($1::INT IS NULL OR br.user_id = $1)".to_string(),
            "($2::INT IS NULL OR br.book_id = $2)".to_string(),
        ];
        if let Some(state) = query.state {
            conditions.push(state_condition(state).to_string());
        }
        let where_clause = format!("WHERE {}", conditions.join(" AND "));
        let bind_now = query.state.map_or(false, state_uses_now);

        let count_q = format!("SELECT COUNT(*) FROM borrowings br {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q)
            .bind(query.user_id)
            .bind(query.book_id);
        if bind_now {
            count_builder = count_builder.bind(now);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            "{} {} ORDER BY br.borrowed_date DESC LIMIT {} OFFSET {}",
            DETAILS_SELECT, where_clause, per_page, offset
        );
        let mut builder = sqlx::query(&select_q)
            .bind(query.user_id)
            .bind(query.book_id);
        if bind_now {
            builder = builder.bind(now);
        }
        let rows = builder.fetch_all(&self.pool).await?;

        let items = rows
            .iter()
            .map(|row| details_from_row(row, now, fine_per_day))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((items, total))
    }

    /// Borrow one copy of a book for a user.
    ///
    /// Locks the user row, then the book row, so concurrent requests for the
    /// same user or the same title see the counts the insert will commit against.
    pub async fn borrow(
        &self,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
        policy: &LibraryPolicy,
    ) -> AppResult<Borrowing> {
        let mut tx = self.pool.begin().await?;

        lock_user(&mut tx, user_id).await?;
        let mut book = lock_book(&mut tx, book_id).await?;

        let active = sqlx::query_as::<_, Borrowing>(
            "SELECT * FROM borrowings WHERE user_id = $1 AND status = 'active' AND returned_date IS NULL",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let new = borrowing::borrow(user_id, &mut book, &active, now, policy)?;

        let created = sqlx::query_as::<_, Borrowing>(
            r#"
            INSERT INTO borrowings (user_id, book_id, borrowed_date, due_date, status)
            VALUES ($1, $2, $3, $4, 'active')
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.book_id)
        .bind(new.borrowed_date)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, ONE_ACTIVE_PER_USER_BOOK) {
                AppError::from(LendingError::DuplicateBorrowing)
            } else {
                AppError::from(e)
            }
        })?;

        save_copy_state(&mut tx, &book).await?;
        tx.commit().await?;

        Ok(created)
    }

    /// Return a borrowing in the given condition, issuing any penalty fines
    /// in the same transaction.
    pub async fn return_book(
        &self,
        borrowing_id: i32,
        condition: ReturnCondition,
        notes: Option<&str>,
        now: DateTime<Utc>,
        policy: &LibraryPolicy,
    ) -> AppResult<ReturnOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut borrowing = lock_borrowing(&mut tx, borrowing_id).await?;
        let mut book = lock_book(&mut tx, borrowing.book_id).await?;

        let effects = borrowing.mark_returned(&mut book, condition, notes, now, policy)?;

        sqlx::query(
            "UPDATE borrowings SET returned_date = $1, status = $2, fine_amount = $3 WHERE id = $4",
        )
        .bind(borrowing.returned_date)
        .bind(borrowing.status)
        .bind(borrowing.fine_amount)
        .bind(borrowing.id)
        .execute(&mut *tx)
        .await?;

        save_copy_state(&mut tx, &book).await?;

        let mut fines_issued = Vec::with_capacity(effects.fines_to_issue.len());
        for fine in &effects.fines_to_issue {
            fines_issued.push(insert_fine(&mut tx, fine).await?);
        }

        tx.commit().await?;

        Ok(ReturnOutcome {
            borrowing,
            book_released: effects.book_released,
            book_status: effects.book_status,
            charged_fine: effects.charged_fine,
            fines_issued,
        })
    }

    /// Mark the charged overdue fine of a returned borrowing as paid
    pub async fn settle_fine(&self, borrowing_id: i32) -> AppResult<Borrowing> {
        let mut tx = self.pool.begin().await?;
        let mut borrowing = lock_borrowing(&mut tx, borrowing_id).await?;
        let promoted = find_promoted_fine(&mut tx, borrowing_id).await?;

        borrowing.settle_fine(promoted.as_ref())?;

        sqlx::query("UPDATE borrowings SET fine_paid = TRUE WHERE id = $1")
            .bind(borrowing.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(borrowing)
    }
}

fn details_from_row(
    row: &PgRow,
    now: DateTime<Utc>,
    fine_per_day: Decimal,
) -> AppResult<BorrowingDetails> {
    let borrowing = Borrowing {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        book_id: row.try_get("book_id")?,
        borrowed_date: row.try_get("borrowed_date")?,
        due_date: row.try_get("due_date")?,
        returned_date: row.try_get("returned_date")?,
        fine_amount: row.try_get("fine_amount")?,
        fine_paid: row.try_get("fine_paid")?,
        status: row.try_get("status")?,
    };

    let book = BookShort {
        id: borrowing.book_id,
        isbn: row.try_get("book_isbn")?,
        title: row.try_get("book_title")?,
    };

    let user = UserShort {
        id: borrowing.user_id,
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        role: row.try_get("role")?,
    };

    Ok(BorrowingDetails::new(&borrowing, book, Some(user), now, fine_per_day))
}
