//! Payment recorder endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        payment::{CompletePayment, InitiatePayment, Payment, PaymentQuery},
        user::Capability,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Start a payment for a subscription or a fine
#[utoipa::path(
    post,
    path = "/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = InitiatePayment,
    responses(
        (status = 201, description = "Pending payment recorded", body = Payment),
        (status = 400, description = "Invalid method details or payment type"),
        (status = 409, description = "Transaction id already used, or fine not pending"),
        (status = 422, description = "Amount not greater than zero")
    )
)]
pub async fn initiate_payment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<InitiatePayment>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    let payer = state.services.users.ensure_from_claims(&claims).await?;

    let payment = state.services.payments.initiate(&payer, request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// List all payments
#[utoipa::path(
    get,
    path = "/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(PaymentQuery),
    responses(
        (status = 200, description = "Payments, newest first", body = PaginatedResponse<Payment>),
        (status = 403, description = "Missing ManagePayments capability")
    )
)]
pub async fn list_payments(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<PaymentQuery>,
) -> AppResult<Json<PaginatedResponse<Payment>>> {
    claims.require(Capability::ManagePayments)?;

    let (payments, total) = state.services.payments.list_payments(&query).await?;
    Ok(Json(PaginatedResponse::new(payments, total, query.page, query.per_page, 50)))
}

/// The caller's own payments
#[utoipa::path(
    get,
    path = "/payments/mine",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(PaymentQuery),
    responses((status = 200, description = "Own payments", body = PaginatedResponse<Payment>))
)]
pub async fn my_payments(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<PaymentQuery>,
) -> AppResult<Json<PaginatedResponse<Payment>>> {
    query.user_id = Some(claims.user_id);

    let (payments, total) = state.services.payments.list_payments(&query).await?;
    Ok(Json(PaginatedResponse::new(payments, total, query.page, query.per_page, 50)))
}

/// Get a payment
#[utoipa::path(
    get,
    path = "/payments/{id}",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = Payment),
        (status = 404, description = "Payment not found")
    )
)]
pub async fn get_payment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Payment>> {
    let payment = state.services.payments.get_payment(id).await?;
    claims.require_self_or(payment.user_id, Capability::ManagePayments)?;

    Ok(Json(payment))
}

/// Confirm a pending payment
#[utoipa::path(
    post,
    path = "/payments/{id}/complete",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Payment ID")),
    request_body = CompletePayment,
    responses(
        (status = 200, description = "Payment completed", body = Payment),
        (status = 409, description = "Payment not pending, or gateway reference already used")
    )
)]
pub async fn complete_payment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<CompletePayment>>,
) -> AppResult<Json<Payment>> {
    let existing = state.services.payments.get_payment(id).await?;
    claims.require_self_or(existing.user_id, Capability::ManagePayments)?;

    let request = request.map(|Json(r)| r).unwrap_or_default();
    let payment = state.services.payments.complete(id, request).await?;
    Ok(Json(payment))
}

/// Mark a pending payment failed
#[utoipa::path(
    post,
    path = "/payments/{id}/fail",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment failed", body = Payment),
        (status = 409, description = "Payment not pending")
    )
)]
pub async fn fail_payment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Payment>> {
    let existing = state.services.payments.get_payment(id).await?;
    claims.require_self_or(existing.user_id, Capability::ManagePayments)?;

    let payment = state.services.payments.fail(id).await?;
    Ok(Json(payment))
}
