//! Book (catalog entry) model and copy-count rules

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::borrowing::ReturnCondition;
use crate::error::LendingError;

text_enum! {
    /// Title-level availability
    pub enum BookStatus {
        Available => "available",
        Borrowed => "borrowed",
        Lost => "lost",
        Damaged => "damaged",
    }
}

text_enum! {
    pub enum BookType {
        Physical => "physical",
        Ebook => "ebook",
    }
}

impl Default for BookStatus {
    fn default() -> Self {
        BookStatus::Available
    }
}

impl Default for BookType {
    fn default() -> Self {
        BookType::Physical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: i32,
    pub name: String,
    pub bio: Option<String>,
}

/// Full book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub isbn: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub status: BookStatus,
    pub book_type: BookType,
    /// Replacement price, used for damage/loss penalties
    pub price: Option<Decimal>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    // Relations (loaded separately)
    #[sqlx(default)]
    #[serde(default)]
    pub category_name: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub authors: Vec<Author>,
}

/// Short book representation for embedding in borrowings and fines
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub isbn: String,
    pub title: String,
}

impl From<&Book> for BookShort {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            isbn: book.isbn.clone(),
            title: book.title.clone(),
        }
    }
}

impl Book {
    pub fn is_ebook(&self) -> bool {
        self.book_type == BookType::Ebook
    }

    /// Check that one copy of this title can go out on loan
    pub fn ensure_borrowable(&self) -> Result<(), LendingError> {
        if self.is_ebook() {
            return Err(LendingError::NotBorrowable);
        }
        if self.status != BookStatus::Available || self.available_copies < 1 {
            return Err(LendingError::Unavailable);
        }
        Ok(())
    }

    /// Take one copy off the shelf
    pub fn reserve_copy(&mut self) -> Result<(), LendingError> {
        self.ensure_borrowable()?;
        self.available_copies -= 1;
        self.refresh_status();
        Ok(())
    }

    /// Put one copy back and apply the condition it came back in.
    ///
    /// Damaged and lost copies still count as returned to the shelf while the
    /// title as a whole is flagged damaged/lost. Returns false for ebooks, which
    /// never hold a reserved copy.
    pub fn release_copy(&mut self, condition: ReturnCondition) -> bool {
        if self.is_ebook() {
            return false;
        }

        if self.available_copies >= self.total_copies {
            tracing::warn!(
                book_id = self.id,
                total = self.total_copies,
                "Copy released while all copies are on the shelf; keeping count at total"
            );
            self.available_copies = self.total_copies;
        } else {
            self.available_copies += 1;
        }
        self.refresh_status();

        match condition {
            ReturnCondition::Good => {}
            ReturnCondition::Damaged => self.status = BookStatus::Damaged,
            ReturnCondition::Lost => self.status = BookStatus::Lost,
        }
        true
    }

    /// Administrative change of the number of owned copies.
    ///
    /// Copies currently on loan stay on loan, so the available count moves by the
    /// same delta.
    pub fn set_total_copies(&mut self, total: i32) -> Result<(), String> {
        if self.is_ebook() {
            return if total == 1 {
                Ok(())
            } else {
                Err("E-books always have exactly one copy".to_string())
            };
        }

        let on_loan = self.total_copies - self.available_copies;
        if total < on_loan {
            return Err(format!(
                "Cannot reduce total copies to {} while {} copies are on loan",
                total, on_loan
            ));
        }

        self.available_copies = total - on_loan;
        self.total_copies = total;
        self.refresh_status();
        Ok(())
    }

    /// Administrative status override. Lost and damaged are always allowed;
    /// available and borrowed must agree with the copy counts.
    pub fn set_status(&mut self, status: BookStatus) -> Result<(), String> {
        match status {
            BookStatus::Available if self.available_copies == 0 => {
                return Err("Cannot mark a book available with no copies on the shelf".to_string());
            }
            BookStatus::Borrowed
                if self.available_copies > 0 && self.available_copies == self.total_copies =>
            {
                return Err("Cannot mark a book borrowed with every copy on the shelf".to_string());
            }
            _ => {}
        }
        self.status = status;
        Ok(())
    }

    /// Recompute status from copy counts (copy counts in between leave it unchanged)
    pub fn refresh_status(&mut self) {
        if self.available_copies == 0 {
            self.status = BookStatus::Borrowed;
        } else if self.available_copies == self.total_copies {
            self.status = BookStatus::Available;
        }
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 10, max = 13, message = "ISBN must be 10 to 13 characters"))]
    pub isbn: String,
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    #[serde(default)]
    pub author_ids: Vec<i32>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: Option<i32>,
    pub book_type: Option<BookType>,
    pub price: Option<Decimal>,
}

/// Update book request (administrative edit)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub author_ids: Option<Vec<i32>>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: Option<i32>,
    /// Explicit status, e.g. to put a repaired title back into circulation
    pub status: Option<BookStatus>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAuthor {
    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    pub name: String,
    pub bio: Option<String>,
}

/// Book search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Free text over title, ISBN and author names
    pub q: Option<String>,
    pub category_id: Option<i32>,
    pub status: Option<BookStatus>,
    pub book_type: Option<BookType>,
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
pub(crate) fn sample_book(total: i32) -> Book {
    Book {
        id: 1,
        isbn: "9780000000001".to_string(),
        title: "Things Fall Apart".to_string(),
        description: None,
        category_id: None,
        total_copies: total,
        available_copies: total,
        status: BookStatus::Available,
        book_type: BookType::Physical,
        price: None,
        created_at: None,
        updated_at: None,
        category_name: None,
        authors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserving_the_last_copy_marks_the_title_borrowed() {
        let mut book = sample_book(2);

        book.reserve_copy().unwrap();
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.status, BookStatus::Available);

        book.reserve_copy().unwrap();
        assert_eq!(book.available_copies, 0);
        assert_eq!(book.status, BookStatus::Borrowed);

        assert_eq!(book.reserve_copy(), Err(LendingError::Unavailable));
        assert_eq!(book.available_copies, 0);
    }

    #[test]
    fn ebooks_are_never_reserved() {
        let mut book = sample_book(1);
        book.book_type = BookType::Ebook;

        assert_eq!(book.reserve_copy(), Err(LendingError::NotBorrowable));
        assert_eq!(book.available_copies, 1);
        assert!(!book.release_copy(ReturnCondition::Good));
    }

    #[test]
    fn damaged_title_is_unavailable_even_with_copies_on_shelf() {
        let mut book = sample_book(3);
        book.status = BookStatus::Damaged;
        assert_eq!(book.reserve_copy(), Err(LendingError::Unavailable));
    }

    #[test]
    fn good_return_restores_availability() {
        let mut book = sample_book(1);
        book.reserve_copy().unwrap();

        assert!(book.release_copy(ReturnCondition::Good));
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.status, BookStatus::Available);
    }

    #[test]
    fn lost_return_still_counts_the_copy_but_flags_the_title() {
        let mut book = sample_book(2);
        book.reserve_copy().unwrap();

        assert!(book.release_copy(ReturnCondition::Lost));
        assert_eq!(book.available_copies, 2);
        assert_eq!(book.status, BookStatus::Lost);
    }

    #[test]
    fn release_never_exceeds_total_copies() {
        let mut book = sample_book(2);
        book.release_copy(ReturnCondition::Good);
        assert_eq!(book.available_copies, 2);
    }

    #[test]
    fn changing_total_copies_keeps_loans_outstanding() {
        let mut book = sample_book(3);
        book.reserve_copy().unwrap();
        book.reserve_copy().unwrap();

        book.set_total_copies(5).unwrap();
        assert_eq!(book.available_copies, 3);

        book.set_total_copies(2).unwrap();
        assert_eq!(book.available_copies, 0);
        assert_eq!(book.status, BookStatus::Borrowed);

        assert!(book.set_total_copies(1).is_err());
        assert_eq!(book.total_copies, 2);
    }

    #[test]
    fn status_override_must_agree_with_copy_counts() {
        let mut book = sample_book(1);
        book.reserve_copy().unwrap();

        assert!(book.set_status(BookStatus::Available).is_err());
        assert_eq!(book.status, BookStatus::Borrowed);

        book.set_status(BookStatus::Damaged).unwrap();
        assert_eq!(book.status, BookStatus::Damaged);

        let mut shelved = sample_book(2);
        assert!(shelved.set_status(BookStatus::Borrowed).is_err());
        shelved.set_status(BookStatus::Lost).unwrap();
        shelved.set_status(BookStatus::Available).unwrap();
        assert_eq!(shelved.status, BookStatus::Available);
    }
}
