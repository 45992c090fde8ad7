//! Borrowing ledger endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        borrowing::{Borrowing, BorrowingDetails, BorrowingQuery, ReturnBook, ReturnOutcome},
        user::Capability,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List borrowings
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Borrowings", body = PaginatedResponse<BorrowingDetails>),
        (status = 403, description = "Missing ProcessReturns capability")
    )
)]
pub async fn list_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowingDetails>>> {
    claims.require(Capability::ProcessReturns)?;

    let (items, total) = state.services.lending.list_borrowings(&query).await?;
    Ok(Json(PaginatedResponse::new(items, total, query.page, query.per_page, 50)))
}

/// Get one borrowing with derived state and fines
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingDetails),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    let details = state.services.lending.get_borrowing(id).await?;
    let owner = details.user.as_ref().map(|u| u.id).unwrap_or_default();
    claims.require_self_or(owner, Capability::ProcessReturns)?;

    Ok(Json(details))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    request_body = ReturnBook,
    responses(
        (status = 200, description = "Book returned", body = ReturnOutcome),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Borrowing already returned")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<ReturnBook>>,
) -> AppResult<Json<ReturnOutcome>> {
    claims.require(Capability::ProcessReturns)?;

    let request = request.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .services
        .lending
        .return_book(id, request.condition, request.notes.as_deref())
        .await?;

    Ok(Json(outcome))
}

/// Mark the overdue fine charged at return as paid
#[utoipa::path(
    post,
    path = "/borrowings/{id}/settle-fine",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Fine settled", body = Borrowing),
        (status = 409, description = "No unpaid charged fine")
    )
)]
pub async fn settle_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Borrowing>> {
    claims.require(Capability::ManageFines)?;

    let borrowing = state.services.lending.settle_overdue_fine(id).await?;
    Ok(Json(borrowing))
}

/// Borrowings of a user, active and past
#[utoipa::path(
    get,
    path = "/users/{id}/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User's borrowings", body = Vec<BorrowingDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    claims.require_self_or(user_id, Capability::ProcessReturns)?;

    if user_id == claims.user_id {
        state.services.users.ensure_from_claims(&claims).await?;
    }
    let borrowings = state.services.lending.user_borrowings(user_id).await?;
    Ok(Json(borrowings))
}
