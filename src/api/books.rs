//! Catalog endpoints and borrowing a book

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{
            Author, Book, BookQuery, Category, CreateAuthor, CreateBook, CreateCategory, UpdateBook,
        },
        borrowing::{BorrowBook, Borrowing},
        user::Capability,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Query for destructive operations
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct DeleteBookQuery {
    /// Delete even while the book has active borrowings (they are removed too)
    #[serde(default)]
    pub force: bool,
}

/// Search books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = PaginatedResponse<Book>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn search_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<Book>>> {
    let (books, total) = state.services.catalog.search_books(&query).await?;

    Ok(Json(PaginatedResponse::new(books, total, query.page, query.per_page, 20)))
}

/// Get book details
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Missing ManageCatalog capability"),
        (status = 409, description = "ISBN already exists")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require(Capability::ManageCatalog)?;

    let book = state.services.catalog.create_book(data).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Edit a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Copy count below copies on loan"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    claims.require(Capability::ManageCatalog)?;

    let book = state.services.catalog.update_book(id, data).await?;
    Ok(Json(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID"),
        DeleteBookQuery
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has active borrowings")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Query(query): Query<DeleteBookQuery>,
) -> AppResult<StatusCode> {
    claims.require(Capability::ManageCatalog)?;

    state.services.catalog.delete_book(id, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Borrow a copy of a book
///
/// Borrows for the caller, or for `user_id` when the caller may process
/// returns (desk lending).
#[utoipa::path(
    post,
    path = "/books/{id}/borrow",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body(content = BorrowBook, description = "Optional borrower", content_type = "application/json"),
    responses(
        (status = 201, description = "Book borrowed", body = Borrowing),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "No copy available or already borrowed"),
        (status = 422, description = "E-book, or borrowing limit reached")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    request: Option<Json<BorrowBook>>,
) -> AppResult<(StatusCode, Json<Borrowing>)> {
    claims.require(Capability::BorrowBooks)?;

    let requested = request.and_then(|Json(r)| r.user_id);
    let user_id = match requested {
        Some(user_id) if user_id != claims.user_id => {
            claims.require(Capability::ProcessReturns)?;
            user_id
        }
        _ => state.services.users.ensure_from_claims(&claims).await?.id,
    };

    let borrowing = state.services.lending.borrow_book(user_id, book_id).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Grant to read an e-book
#[derive(Debug, Serialize, ToSchema)]
pub struct EbookAccess {
    pub book: Book,
    /// Granted through the reader's subscription rather than their role
    pub via_subscription: bool,
}

/// Open an e-book
#[utoipa::path(
    get,
    path = "/books/{id}/read",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Access granted", body = EbookAccess),
        (status = 400, description = "Not an e-book"),
        (status = 403, description = "No e-book access or subscription"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn read_ebook(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<EbookAccess>> {
    let reader = state.services.users.ensure_from_claims(&claims).await?;
    let book = state.services.catalog.get_book(id).await?;

    if !book.is_ebook() {
        return Err(AppError::Validation(
            "This book is not available in e-book format".to_string(),
        ));
    }
    if !reader.can_read_ebooks(Utc::now()) {
        return Err(AppError::Authorization(
            "An active subscription is required to read e-books".to_string(),
        ));
    }

    Ok(Json(EbookAccess {
        via_subscription: !claims.can(Capability::AccessEbooks),
        book,
    }))
}

/// List categories
#[utoipa::path(
    get,
    path = "/categories",
    tag = "books",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "All categories", body = Vec<Category>))
)]
pub async fn list_categories(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.services.catalog.list_categories().await?))
}

/// Create a category
#[utoipa::path(
    post,
    path = "/categories",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 409, description = "Name already used")
    )
)]
pub async fn create_category(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    claims.require(Capability::ManageCatalog)?;

    let category = state.services.catalog.create_category(data).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// List authors
#[utoipa::path(
    get,
    path = "/authors",
    tag = "books",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "All authors", body = Vec<Author>))
)]
pub async fn list_authors(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Author>>> {
    Ok(Json(state.services.catalog.list_authors().await?))
}

/// Create an author
#[utoipa::path(
    post,
    path = "/authors",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateAuthor,
    responses((status = 201, description = "Author created", body = Author))
)]
pub async fn create_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateAuthor>,
) -> AppResult<(StatusCode, Json<Author>)> {
    claims.require(Capability::ManageCatalog)?;

    let author = state.services.catalog.create_author(data).await?;
    Ok((StatusCode::CREATED, Json(author)))
}
