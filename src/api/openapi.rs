//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrowings, fines, health, payments, stats};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FBC Library API",
        version = "1.0.0",
        description = "University library REST API: catalog, borrowings, fines and payments"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::search_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::list_categories,
        books::create_category,
        books::list_authors,
        books::create_author,
        books::read_ebook,
        // Borrowings
        books::borrow_book,
        borrowings::list_borrowings,
        borrowings::get_borrowing,
        borrowings::return_book,
        borrowings::settle_fine,
        borrowings::get_user_borrowings,
        // Fines
        fines::list_fines,
        fines::issue_fine,
        fines::my_fines,
        fines::get_fine,
        fines::pay_fine,
        fines::cancel_fine,
        fines::delete_fine,
        // Payments
        payments::initiate_payment,
        payments::list_payments,
        payments::my_payments,
        payments::get_payment,
        payments::complete_payment,
        payments::fail_payment,
        // Stats
        stats::get_stats,
        stats::get_dashboard,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::BookStatus,
            crate::models::book::BookType,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::Category,
            crate::models::book::CreateCategory,
            crate::models::book::Author,
            crate::models::book::CreateAuthor,
            books::DeleteBookQuery,
            books::EbookAccess,
            // Borrowings
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::BorrowingState,
            crate::models::borrowing::ReturnCondition,
            crate::models::borrowing::BorrowBook,
            crate::models::borrowing::ReturnBook,
            crate::models::borrowing::ReturnOutcome,
            // Fines
            crate::models::fine::Fine,
            crate::models::fine::FineType,
            crate::models::fine::FineStatus,
            crate::models::fine::IssueFine,
            crate::models::fine::MarkFinePaid,
            crate::models::fine::FineTotals,
            crate::models::fine::UserFines,
            // Payments
            crate::models::payment::Payment,
            crate::models::payment::PaymentType,
            crate::models::payment::PaymentMethod,
            crate::models::payment::PaymentStatus,
            crate::models::payment::InitiatePayment,
            crate::models::payment::CompletePayment,
            // Users
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::Role,
            crate::models::user::SubscriptionStatus,
            // Stats
            stats::StatsResponse,
            stats::CatalogStats,
            stats::BorrowingStats,
            stats::PaymentTotal,
            stats::DashboardResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "borrowings", description = "Borrowing and returning books"),
        (name = "fines", description = "Fine ledger"),
        (name = "payments", description = "Subscription and fine payments"),
        (name = "stats", description = "Statistics and dashboards")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
