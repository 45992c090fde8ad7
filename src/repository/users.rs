//! Users repository

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::user::{User, UserClaims},
};

/// Lock a user row; serializes borrow and payment requests for one user
pub(crate) async fn lock_user(conn: &mut PgConnection, id: i32) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
}

pub(crate) async fn save_subscription(
    conn: &mut PgConnection,
    user_id: i32,
    valid_until: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE users SET subscription_end_date = $1, is_subscription_active = TRUE WHERE id = $2",
    )
    .bind(valid_until)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Create or refresh the local row for a token holder
    pub async fn sync_from_claims(&self, claims: &UserClaims) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, full_name, email, role)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                full_name = COALESCE(EXCLUDED.full_name, users.full_name),
                email = COALESCE(EXCLUDED.email, users.email),
                role = EXCLUDED.role
            RETURNING *
            "#,
        )
        .bind(claims.user_id)
        .bind(&claims.sub)
        .bind(&claims.name)
        .bind(&claims.email)
        .bind(claims.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}
