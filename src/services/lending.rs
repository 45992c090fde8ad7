//! Borrowing ledger service

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::LibraryPolicy,
    error::AppResult,
    models::borrowing::{
        Borrowing, BorrowingDetails, BorrowingQuery, ReturnCondition, ReturnOutcome,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    policy: Arc<LibraryPolicy>,
}

impl LendingService {
    pub fn new(repository: Repository, policy: Arc<LibraryPolicy>) -> Self {
        Self { repository, policy }
    }

    /// Borrow one copy of a book for a user
    pub async fn borrow_book(&self, user_id: i32, book_id: i32) -> AppResult<Borrowing> {
        let borrowing = self
            .repository
            .borrowings
            .borrow(user_id, book_id, Utc::now(), &self.policy)
            .await?;

        tracing::info!(
            borrowing_id = borrowing.id,
            user_id,
            book_id,
            due_date = %borrowing.due_date,
            "Book borrowed"
        );
        Ok(borrowing)
    }

    /// Close a borrowing in the given condition
    pub async fn return_book(
        &self,
        borrowing_id: i32,
        condition: ReturnCondition,
        notes: Option<&str>,
    ) -> AppResult<ReturnOutcome> {
        let outcome = self
            .repository
            .borrowings
            .return_book(borrowing_id, condition, notes, Utc::now(), &self.policy)
            .await?;

        tracing::info!(
            borrowing_id,
            %condition,
            status = %outcome.borrowing.status,
            book_status = %outcome.book_status,
            charged_fine = %outcome.charged_fine,
            fines_issued = outcome.fines_issued.len(),
            "Book returned"
        );
        Ok(outcome)
    }

    pub async fn get_borrowing(&self, id: i32) -> AppResult<BorrowingDetails> {
        self.repository
            .borrowings
            .get_details(id, Utc::now(), self.policy.fine_per_day)
            .await
    }

    /// Borrowings of one user, active and past
    pub async fn user_borrowings(&self, user_id: i32) -> AppResult<Vec<BorrowingDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository
            .borrowings
            .list_for_user(user_id, Utc::now(), self.policy.fine_per_day)
            .await
    }

    pub async fn list_borrowings(
        &self,
        query: &BorrowingQuery,
    ) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        self.repository
            .borrowings
            .list(query, Utc::now(), self.policy.fine_per_day)
            .await
    }

    /// Mark the charged overdue fine on a returned borrowing as paid
    pub async fn settle_overdue_fine(&self, borrowing_id: i32) -> AppResult<Borrowing> {
        let borrowing = self.repository.borrowings.settle_fine(borrowing_id).await?;
        tracing::info!(borrowing_id, amount = %borrowing.fine_amount, "Overdue fine settled");
        Ok(borrowing)
    }
}
