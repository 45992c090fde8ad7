//! Statistics and dashboard endpoints

use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        borrowing::BorrowingDetails,
        fine::FineTotals,
        payment::PaymentType,
        user::{Capability, SubscriptionStatus, User},
    },
};

use super::AuthenticatedUser;

/// Library-wide statistics
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    /// Catalog figures
    pub books: CatalogStats,
    /// Circulation figures
    pub borrowings: BorrowingStats,
    /// Fine ledger totals
    pub fines: FineTotals,
    /// Completed payments per type
    pub payments: Vec<PaymentTotal>,
    /// Currency label for every amount
    pub currency: String,
}

#[derive(Serialize, ToSchema)]
pub struct CatalogStats {
    pub total_titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub damaged_titles: i64,
    pub lost_titles: i64,
}

#[derive(Serialize, ToSchema)]
pub struct BorrowingStats {
    /// Open borrowings, overdue included
    pub active: i64,
    pub overdue: i64,
    /// Open borrowings due before the end of today
    pub due_today: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentTotal {
    pub payment_type: PaymentType,
    pub total: Decimal,
    pub count: i64,
}

/// Personal dashboard of the caller
#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub user: User,
    pub subscription: SubscriptionStatus,
    /// Borrowings not yet returned
    pub active_borrowings: Vec<BorrowingDetails>,
    /// Sum of fines accruing on overdue borrowings, not yet charged
    pub estimated_fines: Decimal,
    pub fines: FineTotals,
    pub currency: String,
}

/// Get library statistics
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Library statistics", body = StatsResponse),
        (status = 403, description = "Missing ViewReports capability")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<StatsResponse>> {
    claims.require(Capability::ViewReports)?;

    let stats = state.services.stats.get_stats().await?;
    Ok(Json(stats))
}

/// Get the caller's dashboard
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Personal dashboard", body = DashboardResponse))
)]
pub async fn get_dashboard(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<DashboardResponse>> {
    let user = state.services.users.ensure_from_claims(&claims).await?;

    let dashboard = state.services.stats.user_dashboard(user).await?;
    Ok(Json(dashboard))
}
