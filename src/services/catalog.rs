//! Catalog management service

use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{
        Author, Book, BookQuery, Category, CreateAuthor, CreateBook, CreateCategory,
        UpdateBook,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

fn check_price(price: Option<Decimal>) -> AppResult<()> {
    match price {
        Some(p) if p < Decimal::ZERO => {
            Err(AppError::Validation("Price cannot be negative".to_string()))
        }
        _ => Ok(()),
    }
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn create_book(&self, data: CreateBook) -> AppResult<Book> {
        data.validate()?;
        check_price(data.price)?;

        let book = self.repository.books.create(&data).await?;
        tracing::info!(book_id = book.id, isbn = %book.isbn, copies = book.total_copies, "Book created");
        Ok(book)
    }

    pub async fn update_book(&self, id: i32, data: UpdateBook) -> AppResult<Book> {
        data.validate()?;
        check_price(data.price)?;

        let book = self.repository.books.update(id, &data).await?;
        tracing::info!(
            book_id = id,
            total = book.total_copies,
            available = book.available_copies,
            status = %book.status,
            "Book updated"
        );
        Ok(book)
    }

    pub async fn delete_book(&self, id: i32, force: bool) -> AppResult<()> {
        self.repository.books.delete(id, force).await?;
        tracing::info!(book_id = id, force, "Book deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.books.list_categories().await
    }

    pub async fn create_category(&self, data: CreateCategory) -> AppResult<Category> {
        data.validate()?;
        self.repository.books.create_category(&data).await
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.books.list_authors().await
    }

    pub async fn create_author(&self, data: CreateAuthor) -> AppResult<Author> {
        data.validate()?;
        self.repository.books.create_author(&data).await
    }
}
