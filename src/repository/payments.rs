//! Payments repository

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, PgConnection, Pool, Postgres};

use super::{
    fines::{lock_fine, save_fine_state},
    users::{lock_user, save_subscription},
};
use crate::{
    config::LibraryPolicy,
    error::{is_unique_violation, AppError, AppResult, LendingError},
    models::{
        fine::FineStatus,
        payment::{
            subscription_extension, CompletionEffect, Payment, PaymentMethod, PaymentQuery,
            PaymentType,
        },
    },
};

const TRANSACTION_ID_KEY: &str = "payments_transaction_id_key";
const GATEWAY_REFERENCE_KEY: &str = "payments_gateway_reference_key";

const PAYMENT_SELECT: &str = r#"
    SELECT p.*, pd.fine_id
    FROM payments p
    LEFT JOIN payment_details pd ON pd.payment_id = p.id
"#;

/// A payment ready to insert
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i32,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub details: BTreeMap<String, String>,
    pub fine_id: Option<i32>,
}

fn map_duplicate(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err, TRANSACTION_ID_KEY) || is_unique_violation(&err, GATEWAY_REFERENCE_KEY)
    {
        LendingError::DuplicateTransaction.into()
    } else {
        err.into()
    }
}

async fn lock_payment(conn: &mut PgConnection, id: i32) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!("{} WHERE p.id = $1 FOR UPDATE OF p", PAYMENT_SELECT))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Payment with id {} not found", id)))
}

#[derive(Clone)]
pub struct PaymentsRepository {
    pool: Pool<Postgres>,
}

impl PaymentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get payment by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!("{} WHERE p.id = $1", PAYMENT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment with id {} not found", id)))
    }

    /// List payments, newest first
    pub async fn list(&self, query: &PaymentQuery) -> AppResult<(Vec<Payment>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
        let offset = (page - 1) * per_page;

        const FILTER: &str = r#"
            WHERE ($1::INT IS NULL OR p.user_id = $1)
              AND ($2::TEXT IS NULL OR p.payment_type = $2)
              AND ($3::TEXT IS NULL OR p.payment_method = $3)
              AND ($4::TEXT IS NULL OR p.status = $4)
        "#;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM payments p {}", FILTER))
                .bind(query.user_id)
                .bind(query.payment_type)
                .bind(query.payment_method)
                .bind(query.status)
                .fetch_one(&self.pool)
                .await?;

        let payments = sqlx::query_as::<_, Payment>(&format!(
            "{} {} ORDER BY p.created_at DESC LIMIT $5 OFFSET $6",
            PAYMENT_SELECT, FILTER
        ))
        .bind(query.user_id)
        .bind(query.payment_type)
        .bind(query.payment_method)
        .bind(query.status)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((payments, total))
    }

    /// Record a pending payment, linking the fine it pays for
    pub async fn create(&self, data: &NewPayment) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO payments (user_id, payment_type, amount, payment_method, status,
                                  transaction_id, details)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING id
            "#,
        )
        .bind(data.user_id)
        .bind(data.payment_type)
        .bind(data.amount)
        .bind(data.payment_method)
        .bind(&data.transaction_id)
        .bind(Json(&data.details))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_duplicate)?;

        if let Some(fine_id) = data.fine_id {
            sqlx::query(
                "INSERT INTO payment_details (payment_id, fine_id, reference) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(fine_id)
            .bind(format!("Fine payment for ID: {}", fine_id))
            .execute(&mut *tx)
            .await?;
        }

        let payment = sqlx::query_as::<_, Payment>(&format!("{} WHERE p.id = $1", PAYMENT_SELECT))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(payment)
    }

    /// Complete a pending payment and apply its side effect in one transaction
    pub async fn complete(
        &self,
        id: i32,
        gateway_reference: Option<String>,
        now: DateTime<Utc>,
        policy: &LibraryPolicy,
    ) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await?;
        let mut payment = lock_payment(&mut tx, id).await?;

        let effect = payment.complete(gateway_reference, now)?;

        sqlx::query(
            "UPDATE payments SET status = $1, completed_at = $2, gateway_reference = $3 WHERE id = $4",
        )
        .bind(payment.status)
        .bind(payment.completed_at)
        .bind(&payment.gateway_reference)
        .bind(payment.id)
        .execute(&mut *tx)
        .await
        .map_err(map_duplicate)?;

        match effect {
            CompletionEffect::ExtendSubscription { user_id } => {
                let user = lock_user(&mut tx, user_id).await?;
                let valid_until = subscription_extension(
                    user.subscription_end_date,
                    now,
                    policy.subscription_period_days,
                );
                save_subscription(&mut tx, user_id, valid_until).await?;
                tracing::info!(user_id, %valid_until, "Subscription extended");
            }
            CompletionEffect::MarkFinePaid { fine_id } => {
                let mut fine = lock_fine(&mut tx, fine_id).await?;
                match fine.status {
                    FineStatus::Pending => {
                        fine.mark_paid(
                            Some(payment.payment_method.as_str()),
                            Some(&payment.transaction_id),
                            None,
                            now,
                        )?;
                        save_fine_state(&mut tx, &fine).await?;
                    }
                    FineStatus::Paid => {
                        tracing::debug!(fine_id, "Fine already paid; leaving it untouched");
                    }
                    FineStatus::Cancelled => {
                        tracing::warn!(
                            fine_id,
                            payment_id = payment.id,
                            "Payment completed for a cancelled fine; fine stays cancelled"
                        );
                    }
                }
            }
            CompletionEffect::Nothing => {}
        }

        tx.commit().await?;
        Ok(payment)
    }

    /// Mark a pending payment failed
    pub async fn fail(&self, id: i32) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await?;
        let mut payment = lock_payment(&mut tx, id).await?;

        payment.fail()?;

        sqlx::query("UPDATE payments SET status = $1 WHERE id = $2")
            .bind(payment.status)
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(payment)
    }

    /// Sum of completed payments per type
    pub async fn completed_totals(&self) -> AppResult<Vec<(PaymentType, Decimal, i64)>> {
        let rows = sqlx::query_as::<_, (PaymentType, Decimal, i64)>(
            r#"
            SELECT payment_type, COALESCE(SUM(amount), 0), COUNT(*)
            FROM payments
            WHERE status = 'completed'
            GROUP BY payment_type
            ORDER BY payment_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
