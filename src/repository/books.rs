//! Books, categories and authors repository

use std::collections::HashMap;

use sqlx::{PgConnection, Pool, Postgres, Row};

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::book::{
        Author, Book, BookQuery, BookType, Category, CreateAuthor, CreateBook, CreateCategory,
        UpdateBook,
    },
};

const BOOK_SELECT: &str = r#"
    SELECT b.*, c.name AS category_name
    FROM books b
    LEFT JOIN categories c ON c.id = b.category_id
"#;

/// Lock a book row for the rest of the transaction
pub(crate) async fn lock_book(conn: &mut PgConnection, id: i32) -> AppResult<Book> {
    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
}

/// Write back copy counts and status
pub(crate) async fn save_copy_state(conn: &mut PgConnection, book: &Book) -> AppResult<()> {
    sqlx::query(
        "UPDATE books SET available_copies = $1, status = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(book.available_copies)
    .bind(book.status)
    .bind(book.id)
    .execute(conn)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID, with category name and authors
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let mut book = sqlx::query_as::<_, Book>(&format!("{} WHERE b.id = $1", BOOK_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        book.authors = self.authors_of(&[id]).await?.remove(&id).unwrap_or_default();
        Ok(book)
    }

    /// Search books with filters and pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 200);
        let offset = (page - 1) * per_page;

        let mut conditions = Vec::new();
        let mut idx = 1;

        let pattern = query
            .q
            .as_ref()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q));

        if pattern.is_some() {
            conditions.push(format!(
                "(b.title ILIKE ${0} OR b.isbn ILIKE ${0} OR EXISTS (\
                    SELECT 1 FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
                    WHERE ba.book_id = b.id AND a.name ILIKE ${0}))",
                idx
            ));
            idx += 1;
        }
        if query.category_id.is_some() {
            conditions.push(format!("b.category_id = ${}", idx));
            idx += 1;
        }
        if query.status.is_some() {
            conditions.push(format!("b.status = ${}", idx));
            idx += 1;
        }
        if query.book_type.is_some() {
            conditions.push(format!("b.book_type = ${}", idx));
        }
        if query.available_only.unwrap_or(false) {
            conditions.push("b.available_copies > 0 AND b.status = 'available'".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_q = format!("SELECT COUNT(*) FROM books b {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q);
        if let Some(ref p) = pattern { count_builder = count_builder.bind(p); }
        if let Some(c) = query.category_id { count_builder = count_builder.bind(c); }
        if let Some(s) = query.status { count_builder = count_builder.bind(s); }
        if let Some(t) = query.book_type { count_builder = count_builder.bind(t); }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            "{} {} ORDER BY b.title LIMIT {} OFFSET {}",
            BOOK_SELECT, where_clause, per_page, offset
        );
        let mut builder = sqlx::query_as::<_, Book>(&select_q);
        if let Some(ref p) = pattern { builder = builder.bind(p); }
        if let Some(c) = query.category_id { builder = builder.bind(c); }
        if let Some(s) = query.status { builder = builder.bind(s); }
        if let Some(t) = query.book_type { builder = builder.bind(t); }
        let mut books = builder.fetch_all(&self.pool).await?;

        let ids: Vec<i32> = books.iter().map(|b| b.id).collect();
        let mut authors = self.authors_of(&ids).await?;
        for book in &mut books {
            book.authors = authors.remove(&book.id).unwrap_or_default();
        }

        Ok((books, total))
    }

    /// Create a new book; every copy starts on the shelf
    pub async fn create(&self, data: &CreateBook) -> AppResult<Book> {
        let book_type = data.book_type.unwrap_or_default();
        let total_copies = match book_type {
            BookType::Ebook => 1,
            BookType::Physical => data.total_copies.unwrap_or(1),
        };
        // A title with no copies cannot be lent
        let status = if total_copies == 0 { "borrowed" } else { "available" };

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO books (isbn, title, description, category_id, total_copies,
                               available_copies, status, book_type, price)
            VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&data.isbn)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.category_id)
        .bind(total_copies)
        .bind(status)
        .bind(book_type)
        .bind(data.price)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "books_isbn_key") {
                AppError::Conflict(format!("A book with ISBN {} already exists", data.isbn))
            } else {
                e.into()
            }
        })?;

        set_authors(&mut tx, id, &data.author_ids).await?;
        tx.commit().await?;

        self.get_by_id(id).await
    }

    /// Administrative edit
    pub async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;
        let mut book = lock_book(&mut tx, id).await?;

        if let Some(total) = data.total_copies {
            book.set_total_copies(total).map_err(AppError::Validation)?;
        }
        if let Some(status) = data.status {
            book.set_status(status).map_err(AppError::Validation)?;
        }

        sqlx::query(
            r#"
            UPDATE books SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                category_id = COALESCE($3, category_id),
                price = COALESCE($4, price),
                total_copies = $5,
                available_copies = $6,
                status = $7,
                updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.category_id)
        .bind(data.price)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.status)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(ref author_ids) = data.author_ids {
            set_authors(&mut tx, id, author_ids).await?;
        }

        tx.commit().await?;
        self.get_by_id(id).await
    }

    /// Delete a book. Active borrowings block deletion unless forced; forced
    /// deletion cascades to borrowings.
    pub async fn delete(&self, id: i32, force: bool) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_book(&mut tx, id).await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE book_id = $1 AND status = 'active' AND returned_date IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if active > 0 && !force {
            return Err(AppError::Conflict(format!(
                "Book has {} active borrowing(s); use force=true to delete anyway",
                active
            )));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Authors per book for the given books
    async fn authors_of(&self, book_ids: &[i32]) -> AppResult<HashMap<i32, Vec<Author>>> {
        if book_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT ba.book_id, a.id, a.name, a.bio
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = ANY($1)
            ORDER BY ba.position, a.name
            "#,
        )
        .bind(book_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut result: HashMap<i32, Vec<Author>> = HashMap::new();
        for row in rows {
            result.entry(row.get("book_id")).or_default().push(Author {
                id: row.get("id"),
                name: row.get("name"),
                bio: row.get("bio"),
            });
        }
        Ok(result)
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn create_category(&self, data: &CreateCategory) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&data.name)
        .bind(&data.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "categories_name_key") {
                AppError::Conflict(format!("Category '{}' already exists", data.name))
            } else {
                e.into()
            }
        })
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let rows = sqlx::query_as::<_, Author>("SELECT * FROM authors ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn create_author(&self, data: &CreateAuthor) -> AppResult<Author> {
        let row = sqlx::query_as::<_, Author>(
            "INSERT INTO authors (name, bio) VALUES ($1, $2) RETURNING *",
        )
        .bind(&data.name)
        .bind(&data.bio)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

/// Replace the author list of a book
async fn set_authors(conn: &mut PgConnection, book_id: i32, author_ids: &[i32]) -> AppResult<()> {
    sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;

    for (position, author_id) in author_ids.iter().enumerate() {
        sqlx::query("INSERT INTO book_authors (book_id, author_id, position) VALUES ($1, $2, $3)")
            .bind(book_id)
            .bind(author_id)
            .bind(position as i32)
            .execute(&mut *conn)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    AppError::Validation(format!("Author {} does not exist", author_id))
                }
                other => other.into(),
            })?;
    }
    Ok(())
}
