//! Dashboard statistics service

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::{
    api::stats::{
        BorrowingStats, CatalogStats, DashboardResponse, PaymentTotal, StatsResponse,
    },
    config::LibraryPolicy,
    error::AppResult,
    models::{borrowing::BorrowingState, user::User},
    repository::Repository,
};

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    policy: Arc<LibraryPolicy>,
}

impl StatsService {
    pub fn new(repository: Repository, policy: Arc<LibraryPolicy>) -> Self {
        Self { repository, policy }
    }

    /// Library-wide figures for the admin dashboard
    pub async fn get_stats(&self) -> AppResult<StatsResponse> {
        let counts = self.repository.stats.circulation(Utc::now()).await?;
        let fines = self.repository.fines.totals(None).await?;
        let payments = self
            .repository
            .payments
            .completed_totals()
            .await?
            .into_iter()
            .map(|(payment_type, total, count)| PaymentTotal {
                payment_type,
                total,
                count,
            })
            .collect();

        Ok(StatsResponse {
            books: CatalogStats {
                total_titles: counts.total_titles,
                total_copies: counts.total_copies,
                available_copies: counts.available_copies,
                damaged_titles: counts.damaged_titles,
                lost_titles: counts.lost_titles,
            },
            borrowings: BorrowingStats {
                active: counts.active_borrowings,
                overdue: counts.overdue_borrowings,
                due_today: counts.due_today,
            },
            fines,
            payments,
            currency: self.policy.currency.clone(),
        })
    }

    /// Personal dashboard: open borrowings, fines and subscription state
    pub async fn user_dashboard(&self, user: User) -> AppResult<DashboardResponse> {
        let now = Utc::now();

        let active_borrowings: Vec<_> = self
            .repository
            .borrowings
            .list_for_user(user.id, now, self.policy.fine_per_day)
            .await?
            .into_iter()
            .filter(|b| matches!(b.state, BorrowingState::Active | BorrowingState::Overdue))
            .collect();

        let estimated_fines = active_borrowings
            .iter()
            .map(|b| b.estimated_fine)
            .sum::<Decimal>();

        let fines = self.repository.fines.totals(Some(user.id)).await?;

        Ok(DashboardResponse {
            subscription: user.subscription_status(now),
            user,
            active_borrowings,
            estimated_fines,
            fines,
            currency: self.policy.currency.clone(),
        })
    }
}
