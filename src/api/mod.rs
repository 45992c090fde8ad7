//! API handlers for the library REST endpoints

pub mod books;
pub mod borrowings;
pub mod fines;
pub mod health;
pub mod openapi;
pub mod payments;
pub mod stats;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// List of items
    pub items: Vec<T>,
    /// Total number of items
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> Self {
        Self {
            items,
            total,
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, 200),
        }
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog
        .route(
            "/books",
            get(books::search_books).post(books::create_book),
        )
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/borrow", post(books::borrow_book))
        .route("/books/:id/read", get(books::read_ebook))
        .route(
            "/categories",
            get(books::list_categories).post(books::create_category),
        )
        .route(
            "/authors",
            get(books::list_authors).post(books::create_author),
        )
        // Borrowings
        .route("/borrowings", get(borrowings::list_borrowings))
        .route("/borrowings/:id", get(borrowings::get_borrowing))
        .route("/borrowings/:id/return", post(borrowings::return_book))
        .route("/borrowings/:id/settle-fine", post(borrowings::settle_fine))
        .route("/users/:id/borrowings", get(borrowings::get_user_borrowings))
        // Fines
        .route(
            "/fines",
            get(fines::list_fines).post(fines::issue_fine),
        )
        .route("/fines/mine", get(fines::my_fines))
        .route(
            "/fines/:id",
            get(fines::get_fine).delete(fines::delete_fine),
        )
        .route("/fines/:id/pay", post(fines::pay_fine))
        .route("/fines/:id/cancel", post(fines::cancel_fine))
        // Payments
        .route(
            "/payments",
            get(payments::list_payments).post(payments::initiate_payment),
        )
        .route("/payments/mine", get(payments::my_payments))
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/complete", post(payments::complete_payment))
        .route("/payments/:id/fail", post(payments::fail_payment))
        // Statistics
        .route("/stats", get(stats::get_stats))
        .route("/dashboard", get(stats::get_dashboard))
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
