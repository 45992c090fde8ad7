//! Fine ledger service

use validator::Validate;

use crate::{
    error::AppResult,
    models::fine::{Fine, FineQuery, FineTotals, IssueFine, MarkFinePaid, UserFines},
    repository::Repository,
};

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
}

impl FinesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Issue a pending fine
    pub async fn issue_fine(&self, data: IssueFine) -> AppResult<Fine> {
        data.validate()?;
        data.validate_amount()?;

        let fine = self.repository.fines.issue(&data).await?;
        tracing::info!(
            fine_id = fine.id,
            user_id = fine.user_id,
            fine_type = %fine.fine_type,
            amount = %fine.amount,
            "Fine issued"
        );
        Ok(fine)
    }

    pub async fn pay_fine(&self, id: i32, data: MarkFinePaid) -> AppResult<Fine> {
        data.validate()?;
        let fine = self.repository.fines.mark_paid(id, &data).await?;
        tracing::info!(fine_id = id, amount = %fine.amount, "Fine paid");
        Ok(fine)
    }

    pub async fn cancel_fine(&self, id: i32) -> AppResult<Fine> {
        let fine = self.repository.fines.cancel(id).await?;
        tracing::info!(fine_id = id, "Fine cancelled");
        Ok(fine)
    }

    pub async fn delete_fine(&self, id: i32) -> AppResult<()> {
        self.repository.fines.delete(id).await?;
        tracing::info!(fine_id = id, "Fine deleted");
        Ok(())
    }

    pub async fn get_fine(&self, id: i32) -> AppResult<Fine> {
        self.repository.fines.get_by_id(id).await
    }

    pub async fn list_fines(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        self.repository.fines.list(query).await
    }

    /// A user's fines with their totals
    pub async fn user_fines(&self, user_id: i32) -> AppResult<UserFines> {
        let fines = self.repository.fines.list_for_user(user_id).await?;
        let totals = FineTotals::from_fines(&fines);
        Ok(UserFines { fines, totals })
    }
}
