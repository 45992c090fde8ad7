//! Fine ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        fine::{Fine, FineQuery, IssueFine, MarkFinePaid, UserFines},
        user::Capability,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List fines
#[utoipa::path(
    get,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(FineQuery),
    responses(
        (status = 200, description = "Fines, newest first", body = PaginatedResponse<Fine>),
        (status = 403, description = "Missing ManageFines capability")
    )
)]
pub async fn list_fines(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<PaginatedResponse<Fine>>> {
    claims.require(Capability::ManageFines)?;

    let (fines, total) = state.services.fines.list_fines(&query).await?;
    Ok(Json(PaginatedResponse::new(fines, total, query.page, query.per_page, 50)))
}

/// Issue a fine
#[utoipa::path(
    post,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    request_body = IssueFine,
    responses(
        (status = 201, description = "Fine issued", body = Fine),
        (status = 404, description = "Unknown user or book"),
        (status = 422, description = "Amount not greater than zero")
    )
)]
pub async fn issue_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<IssueFine>,
) -> AppResult<(StatusCode, Json<Fine>)> {
    claims.require(Capability::ManageFines)?;

    let fine = state.services.fines.issue_fine(data).await?;
    Ok((StatusCode::CREATED, Json(fine)))
}

/// The caller's own fines with totals
#[utoipa::path(
    get,
    path = "/fines/mine",
    tag = "fines",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Own fines", body = UserFines))
)]
pub async fn my_fines(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserFines>> {
    let fines = state.services.fines.user_fines(claims.user_id).await?;
    Ok(Json(fines))
}

/// Get a fine
#[utoipa::path(
    get,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Fine ID")),
    responses(
        (status = 200, description = "Fine", body = Fine),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn get_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.get_fine(id).await?;
    claims.require_self_or(fine.user_id, Capability::ManageFines)?;

    Ok(Json(fine))
}

/// Record payment of a fine at the desk
#[utoipa::path(
    post,
    path = "/fines/{id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Fine ID")),
    request_body = MarkFinePaid,
    responses(
        (status = 200, description = "Fine paid", body = Fine),
        (status = 409, description = "Fine is not pending")
    )
)]
pub async fn pay_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<MarkFinePaid>>,
) -> AppResult<Json<Fine>> {
    claims.require(Capability::ManageFines)?;

    let request = request.map(|Json(r)| r).unwrap_or_default();
    let fine = state.services.fines.pay_fine(id, request).await?;
    Ok(Json(fine))
}

/// Cancel a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/cancel",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Fine ID")),
    responses((status = 200, description = "Fine cancelled", body = Fine))
)]
pub async fn cancel_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Fine>> {
    claims.require(Capability::ManageFines)?;

    let fine = state.services.fines.cancel_fine(id).await?;
    Ok(Json(fine))
}

/// Delete a fine
#[utoipa::path(
    delete,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Fine ID")),
    responses(
        (status = 204, description = "Fine deleted"),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn delete_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require(Capability::ManageFines)?;

    state.services.fines.delete_fine(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
