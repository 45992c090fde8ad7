//! Local user records

use crate::{
    error::AppResult,
    models::user::{User, UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Make sure the token holder has a local row and return it
    pub async fn ensure_from_claims(&self, claims: &UserClaims) -> AppResult<User> {
        let user = self.repository.users.sync_from_claims(claims).await?;
        tracing::debug!(user_id = user.id, role = %user.role, "User synced from token");
        Ok(user)
    }
}
