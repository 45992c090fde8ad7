//! Borrowing model and the lending state machine
//!
//! Everything here is pure: the repository loads rows, runs these transitions
//! inside a transaction and writes back whatever changed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::book::{Book, BookShort, BookStatus};
use super::fine::{Fine, FineType, IssueFine};
use super::user::UserShort;
use crate::config::LibraryPolicy;
use crate::error::LendingError;

text_enum! {
    /// Stored borrowing status; only a return moves it away from `active`
    pub enum BorrowingStatus {
        Active => "active",
        Returned => "returned",
        Overdue => "overdue",
        Lost => "lost",
        Damaged => "damaged",
    }
}

text_enum! {
    /// Condition a copy is handed back in
    pub enum ReturnCondition {
        Good => "good",
        Damaged => "damaged",
        Lost => "lost",
    }
}

text_enum! {
    /// State as seen by readers, derived from the stored status and dates
    pub enum BorrowingState {
        Active => "active",
        Overdue => "overdue",
        Returned => "returned",
        Lost => "lost",
        Damaged => "damaged",
    }
}

impl Default for ReturnCondition {
    fn default() -> Self {
        ReturnCondition::Good
    }
}

/// Derive the reader-facing state from (status, due date, returned date, now)
pub fn borrowing_state(
    status: BorrowingStatus,
    due_date: DateTime<Utc>,
    returned_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BorrowingState {
    match status {
        BorrowingStatus::Lost => BorrowingState::Lost,
        BorrowingStatus::Damaged => BorrowingState::Damaged,
        BorrowingStatus::Returned => BorrowingState::Returned,
        BorrowingStatus::Active | BorrowingStatus::Overdue => {
            if returned_date.is_some() {
                BorrowingState::Returned
            } else if now > due_date {
                BorrowingState::Overdue
            } else {
                BorrowingState::Active
            }
        }
    }
}

/// Whole days late; a partial day counts as nothing
pub fn days_overdue(due_date: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    if until > due_date {
        (until - due_date).num_days()
    } else {
        0
    }
}

pub fn overdue_fine(due_date: DateTime<Utc>, until: DateTime<Utc>, fine_per_day: Decimal) -> Decimal {
    Decimal::from(days_overdue(due_date, until)) * fine_per_day
}

/// Damage/loss penalty: replacement price (when known) plus the fixed surcharge
pub fn penalty_amount(price: Option<Decimal>, surcharge: Decimal) -> Decimal {
    price.unwrap_or(Decimal::ZERO) + surcharge
}

/// Result of a fine calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FineAssessment {
    /// Final amount fixed by the return
    Charged(Decimal),
    /// Live figure for a borrowing still out past its due date
    Estimated(Decimal),
    None,
}

impl FineAssessment {
    pub fn amount(&self) -> Decimal {
        match self {
            FineAssessment::Charged(amount) | FineAssessment::Estimated(amount) => *amount,
            FineAssessment::None => Decimal::ZERO,
        }
    }
}

/// Borrowing model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
    /// Overdue fine charged at return; zero until then
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    pub status: BorrowingStatus,
}

/// A borrowing that passed every check and is ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrowing {
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Run the borrow preconditions in their fixed order.
///
/// `active` is the user's current borrowings; anything already returned in the
/// slice is ignored.
pub fn check_borrow(
    book: &Book,
    active: &[Borrowing],
    policy: &LibraryPolicy,
) -> Result<(), LendingError> {
    book.ensure_borrowable()?;

    let open: Vec<&Borrowing> = active.iter().filter(|b| b.is_open()).collect();

    if open.iter().any(|b| b.book_id == book.id) {
        return Err(LendingError::DuplicateBorrowing);
    }

    if open.len() as i64 >= policy.max_active_borrowings {
        return Err(LendingError::LimitExceeded);
    }

    Ok(())
}

/// Check, reserve a copy and build the new borrowing
pub fn borrow(
    user_id: i32,
    book: &mut Book,
    active: &[Borrowing],
    now: DateTime<Utc>,
    policy: &LibraryPolicy,
) -> Result<NewBorrowing, LendingError> {
    check_borrow(book, active, policy)?;
    book.reserve_copy()?;

    Ok(NewBorrowing {
        user_id,
        book_id: book.id,
        borrowed_date: now,
        due_date: now + Duration::days(policy.loan_period_days),
    })
}

/// Everything a return changed besides the borrowing itself
#[derive(Debug, Clone)]
pub struct ReturnEffects {
    pub book_released: bool,
    pub book_status: BookStatus,
    pub charged_fine: Decimal,
    /// Fines to record in the same transaction
    pub fines_to_issue: Vec<IssueFine>,
}

impl Borrowing {
    /// Active and not yet handed back
    pub fn is_open(&self) -> bool {
        self.status == BorrowingStatus::Active && self.returned_date.is_none()
    }

    pub fn state(&self, now: DateTime<Utc>) -> BorrowingState {
        borrowing_state(self.status, self.due_date, self.returned_date, now)
    }

    pub fn calculate_fine(&self, now: DateTime<Utc>, fine_per_day: Decimal) -> FineAssessment {
        match self.returned_date {
            Some(returned) => {
                let amount = overdue_fine(self.due_date, returned, fine_per_day);
                if amount > Decimal::ZERO {
                    FineAssessment::Charged(amount)
                } else {
                    FineAssessment::None
                }
            }
            None if now > self.due_date => {
                FineAssessment::Estimated(overdue_fine(self.due_date, now, fine_per_day))
            }
            None => FineAssessment::None,
        }
    }

    /// Close the borrowing and release its copy.
    ///
    /// Note: a damaged or lost copy still increments `available_copies` while the
    /// title is flagged damaged/lost. That is the established behavior and the
    /// effects report both.
    pub fn mark_returned(
        &mut self,
        book: &mut Book,
        condition: ReturnCondition,
        notes: Option<&str>,
        now: DateTime<Utc>,
        policy: &LibraryPolicy,
    ) -> Result<ReturnEffects, LendingError> {
        if !self.is_open() || book.id != self.book_id {
            return Err(LendingError::InvalidState);
        }

        self.returned_date = Some(now);
        self.status = BorrowingStatus::Returned;

        let book_released = book.release_copy(condition);

        let penalty_type = match condition {
            ReturnCondition::Good => None,
            ReturnCondition::Damaged => {
                self.status = BorrowingStatus::Damaged;
                Some(FineType::Damage)
            }
            ReturnCondition::Lost => {
                self.status = BorrowingStatus::Lost;
                Some(FineType::Lost)
            }
        };

        let charged_fine = self.calculate_fine(now, policy.fine_per_day).amount();
        self.fine_amount = charged_fine;

        let mut fines_to_issue = Vec::new();

        if let Some(fine_type) = penalty_type {
            let amount = penalty_amount(book.price, policy.damage_surcharge);
            if amount > Decimal::ZERO {
                fines_to_issue.push(IssueFine {
                    user_id: self.user_id,
                    book_id: Some(book.id),
                    borrowing_id: Some(self.id),
                    fine_type,
                    amount,
                    reason: Some(format!("Book '{}' returned {}", book.title, condition)),
                    notes: notes.map(str::to_string),
                    due_date: Some(now + Duration::days(policy.penalty_payment_days)),
                });
            }
        }

        if policy.promote_overdue_fines && charged_fine > Decimal::ZERO {
            fines_to_issue.push(IssueFine {
                user_id: self.user_id,
                book_id: Some(book.id),
                borrowing_id: Some(self.id),
                fine_type: FineType::Overdue,
                amount: charged_fine,
                reason: Some(format!(
                    "Book '{}' returned {} days late",
                    book.title,
                    days_overdue(self.due_date, now)
                )),
                notes: None,
                due_date: Some(now + Duration::days(policy.penalty_payment_days)),
            });
        }

        Ok(ReturnEffects {
            book_released,
            book_status: book.status,
            charged_fine,
            fines_to_issue,
        })
    }

    /// Record the charged overdue fine as paid.
    ///
    /// `ledger_fine` is the overdue fine promoted from this borrowing, if any;
    /// once promoted the charge is only collected through the fine ledger.
    pub fn settle_fine(&mut self, ledger_fine: Option<&Fine>) -> Result<Decimal, LendingError> {
        if self.returned_date.is_none()
            || self.fine_amount <= Decimal::ZERO
            || self.fine_paid
            || ledger_fine.is_some()
        {
            return Err(LendingError::InvalidState);
        }
        self.fine_paid = true;
        Ok(self.fine_amount)
    }
}

/// Borrowing with book/user summaries and derived figures
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowingDetails {
    pub id: i32,
    pub book: BookShort,
    pub user: Option<UserShort>,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub state: BorrowingState,
    pub days_overdue: i64,
    pub charged_fine: Decimal,
    pub estimated_fine: Decimal,
    pub fine_paid: bool,
}

impl BorrowingDetails {
    pub fn new(
        borrowing: &Borrowing,
        book: BookShort,
        user: Option<UserShort>,
        now: DateTime<Utc>,
        fine_per_day: Decimal,
    ) -> Self {
        let until = borrowing.returned_date.unwrap_or(now);
        let estimated_fine = match borrowing.calculate_fine(now, fine_per_day) {
            FineAssessment::Estimated(amount) => amount,
            _ => Decimal::ZERO,
        };

        Self {
            id: borrowing.id,
            book,
            user,
            borrowed_date: borrowing.borrowed_date,
            due_date: borrowing.due_date,
            returned_date: borrowing.returned_date,
            status: borrowing.status,
            state: borrowing.state(now),
            days_overdue: days_overdue(borrowing.due_date, until),
            charged_fine: borrowing.fine_amount,
            estimated_fine,
            fine_paid: borrowing.fine_paid,
        }
    }
}

/// Borrow request; `user_id` borrows on someone else's behalf
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BorrowBook {
    pub user_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnBook {
    #[serde(default)]
    pub condition: ReturnCondition,
    pub notes: Option<String>,
}

/// What a return did, so callers need not re-query
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub borrowing: Borrowing,
    pub book_released: bool,
    pub book_status: BookStatus,
    pub charged_fine: Decimal,
    pub fines_issued: Vec<Fine>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BorrowingQuery {
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub state: Option<BorrowingState>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
pub(crate) fn sample_borrowing(id: i32, book_id: i32, borrowed: DateTime<Utc>) -> Borrowing {
    Borrowing {
        id,
        user_id: 7,
        book_id,
        borrowed_date: borrowed,
        due_date: borrowed + Duration::days(14),
        returned_date: None,
        fine_amount: Decimal::ZERO,
        fine_paid: false,
        status: BorrowingStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::{sample_book, BookType};
    use crate::models::fine::sample_fine;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn checks_run_in_order() {
        let policy = LibraryPolicy::default();
        let mut ebook = sample_book(0);
        ebook.book_type = BookType::Ebook;
        ebook.available_copies = 0;
        ebook.status = BookStatus::Borrowed;
        assert_eq!(check_borrow(&ebook, &[], &policy), Err(LendingError::NotBorrowable));

        let mut empty = sample_book(1);
        empty.available_copies = 0;
        empty.status = BookStatus::Borrowed;
        let mine = sample_borrowing(1, empty.id, at(2024, 1, 1));
        assert_eq!(
            check_borrow(&empty, &[mine], &policy),
            Err(LendingError::Unavailable)
        );
    }

    #[test]
    fn duplicate_is_reported_before_limit() {
        let policy = LibraryPolicy::default();
        let book = sample_book(3);
        let active = vec![
            sample_borrowing(1, book.id, at(2024, 1, 1)),
            sample_borrowing(2, 99, at(2024, 1, 1)),
        ];
        assert_eq!(
            check_borrow(&book, &active, &policy),
            Err(LendingError::DuplicateBorrowing)
        );
    }

    #[test]
    fn returned_borrowings_do_not_count() {
        let policy = LibraryPolicy::default();
        let book = sample_book(3);
        let mut old = sample_borrowing(1, book.id, at(2024, 1, 1));
        old.returned_date = Some(at(2024, 1, 5));
        old.status = BorrowingStatus::Returned;
        let other = sample_borrowing(2, 99, at(2024, 1, 1));

        assert_eq!(check_borrow(&book, &[old, other], &policy), Ok(()));
    }

    #[test]
    fn limit_uses_injected_policy() {
        let policy = LibraryPolicy {
            max_active_borrowings: 1,
            ..LibraryPolicy::default()
        };
        let book = sample_book(3);
        let active = vec![sample_borrowing(1, 99, at(2024, 1, 1))];
        assert_eq!(
            check_borrow(&book, &active, &policy),
            Err(LendingError::LimitExceeded)
        );
    }

    #[test]
    fn borrow_sets_due_date_from_loan_period() {
        let policy = LibraryPolicy::default();
        let mut book = sample_book(1);
        let now = at(2024, 3, 1);

        let new = borrow(7, &mut book, &[], now, &policy).unwrap();
        assert_eq!(new.due_date, now + Duration::days(14));
        assert_eq!(new.book_id, book.id);
        assert_eq!(book.available_copies, 0);
    }

    #[test]
    fn failed_checks_leave_the_book_untouched() {
        let policy = LibraryPolicy::default();
        let mut book = sample_book(2);
        let active = vec![sample_borrowing(1, book.id, at(2024, 1, 1))];

        assert!(borrow(7, &mut book, &active, at(2024, 1, 2), &policy).is_err());
        assert_eq!(book.available_copies, 2);
    }

    #[test]
    fn state_is_derived_from_dates() {
        let borrowing = sample_borrowing(1, 1, at(2024, 1, 1));
        assert_eq!(borrowing.state(at(2024, 1, 10)), BorrowingState::Active);
        assert_eq!(borrowing.state(borrowing.due_date), BorrowingState::Active);
        assert_eq!(borrowing.state(at(2024, 1, 20)), BorrowingState::Overdue);
    }

    #[test]
    fn fine_counts_whole_days_only() {
        let due = at(2024, 1, 1);
        let rate = Decimal::from(5000);

        assert_eq!(overdue_fine(due, due, rate), Decimal::ZERO);
        assert_eq!(overdue_fine(due, due + Duration::hours(23), rate), Decimal::ZERO);
        assert_eq!(overdue_fine(due, due + Duration::hours(49), rate), Decimal::from(10000));
        assert_eq!(overdue_fine(due, due - Duration::days(3), rate), Decimal::ZERO);
    }

    #[test]
    fn unreturned_overdue_borrowing_only_has_an_estimate() {
        let borrowing = sample_borrowing(1, 1, at(2024, 1, 1));
        let rate = Decimal::from(100);

        assert_eq!(
            borrowing.calculate_fine(borrowing.due_date + Duration::days(2), rate),
            FineAssessment::Estimated(Decimal::from(200))
        );
        assert_eq!(borrowing.fine_amount, Decimal::ZERO);
    }

    #[test]
    fn good_late_return_charges_the_fine() {
        let policy = LibraryPolicy::default();
        let mut book = sample_book(1);
        let mut borrowing = borrow(7, &mut book, &[], at(2024, 1, 1), &policy)
            .map(|n| Borrowing {
                id: 1,
                user_id: n.user_id,
                book_id: n.book_id,
                borrowed_date: n.borrowed_date,
                due_date: n.due_date,
                returned_date: None,
                fine_amount: Decimal::ZERO,
                fine_paid: false,
                status: BorrowingStatus::Active,
            })
            .unwrap();

        let returned = borrowing.due_date + Duration::days(2);
        let effects = borrowing
            .mark_returned(&mut book, ReturnCondition::Good, None, returned, &policy)
            .unwrap();

        assert!(effects.book_released);
        assert_eq!(effects.book_status, BookStatus::Available);
        assert_eq!(effects.charged_fine, Decimal::from(10000));
        assert!(effects.fines_to_issue.is_empty());
        assert_eq!(borrowing.status, BorrowingStatus::Returned);
        assert_eq!(borrowing.fine_amount, Decimal::from(10000));
    }

    #[test]
    fn damaged_return_without_price_issues_surcharge_only() {
        let policy = LibraryPolicy::default();
        let mut book = sample_book(1);
        book.reserve_copy().unwrap();
        let mut borrowing = sample_borrowing(1, book.id, at(2024, 1, 1));
        let now = at(2024, 1, 5);

        let effects = borrowing
            .mark_returned(&mut book, ReturnCondition::Damaged, Some("torn cover"), now, &policy)
            .unwrap();

        assert_eq!(borrowing.status, BorrowingStatus::Damaged);
        assert_eq!(effects.book_status, BookStatus::Damaged);
        assert_eq!(effects.fines_to_issue.len(), 1);
        let penalty = &effects.fines_to_issue[0];
        assert_eq!(penalty.fine_type, FineType::Damage);
        assert_eq!(penalty.amount, Decimal::from(50));
        assert_eq!(penalty.notes.as_deref(), Some("torn cover"));
        assert_eq!(penalty.due_date, Some(now + Duration::days(7)));
    }

    #[test]
    fn zero_penalty_is_not_issued() {
        let policy = LibraryPolicy {
            damage_surcharge: Decimal::ZERO,
            ..LibraryPolicy::default()
        };
        let mut book = sample_book(1);
        book.reserve_copy().unwrap();
        let mut borrowing = sample_borrowing(1, book.id, at(2024, 1, 1));

        let effects = borrowing
            .mark_returned(&mut book, ReturnCondition::Lost, None, at(2024, 1, 2), &policy)
            .unwrap();
        assert!(effects.fines_to_issue.is_empty());
    }

    #[test]
    fn overdue_fine_is_promoted_when_policy_asks() {
        let policy = LibraryPolicy {
            promote_overdue_fines: true,
            ..LibraryPolicy::default()
        };
        let mut book = sample_book(1);
        book.reserve_copy().unwrap();
        let mut borrowing = sample_borrowing(1, book.id, at(2024, 1, 1));
        let late = borrowing.due_date + Duration::days(1);

        let effects = borrowing
            .mark_returned(&mut book, ReturnCondition::Good, None, late, &policy)
            .unwrap();
        assert_eq!(effects.fines_to_issue.len(), 1);
        assert_eq!(effects.fines_to_issue[0].fine_type, FineType::Overdue);
        assert_eq!(effects.fines_to_issue[0].amount, Decimal::from(5000));
        assert_eq!(effects.fines_to_issue[0].borrowing_id, Some(borrowing.id));
    }

    #[test]
    fn second_return_is_rejected() {
        let policy = LibraryPolicy::default();
        let mut book = sample_book(1);
        book.reserve_copy().unwrap();
        let mut borrowing = sample_borrowing(1, book.id, at(2024, 1, 1));

        borrowing
            .mark_returned(&mut book, ReturnCondition::Good, None, at(2024, 1, 3), &policy)
            .unwrap();
        let err = borrowing
            .mark_returned(&mut book, ReturnCondition::Good, None, at(2024, 1, 4), &policy)
            .unwrap_err();

        assert_eq!(err, LendingError::InvalidState);
        assert_eq!(book.available_copies, 1);
        assert_eq!(borrowing.returned_date, Some(at(2024, 1, 3)));
    }

    #[test]
    fn settling_requires_an_unpaid_charged_fine() {
        let mut borrowing = sample_borrowing(1, 1, at(2024, 1, 1));
        assert_eq!(borrowing.settle_fine(None), Err(LendingError::InvalidState));

        borrowing.returned_date = Some(at(2024, 1, 20));
        borrowing.status = BorrowingStatus::Returned;
        borrowing.fine_amount = Decimal::from(25000);

        assert_eq!(borrowing.settle_fine(None), Ok(Decimal::from(25000)));
        assert!(borrowing.fine_paid);
        assert_eq!(borrowing.settle_fine(None), Err(LendingError::InvalidState));
    }

    #[test]
    fn promoted_fine_cannot_be_settled_on_the_borrowing() {
        let mut borrowing = sample_borrowing(1, 1, at(2024, 1, 1));
        borrowing.returned_date = Some(at(2024, 1, 20));
        borrowing.status = BorrowingStatus::Returned;
        borrowing.fine_amount = Decimal::from(25000);

        let mut promoted = sample_fine(4, 25000);
        promoted.fine_type = FineType::Overdue;
        promoted.borrowing_id = Some(borrowing.id);
        promoted.mark_paid(None, None, None, at(2024, 1, 21)).unwrap();

        assert_eq!(
            borrowing.settle_fine(Some(&promoted)),
            Err(LendingError::InvalidState)
        );
        assert!(!borrowing.fine_paid);
    }

    #[test]
    fn details_split_charged_and_estimated_fines() {
        let borrowing = sample_borrowing(1, 1, at(2024, 1, 1));
        let book = BookShort {
            id: 1,
            isbn: "9780000000001".to_string(),
            title: "Things Fall Apart".to_string(),
        };
        let now = borrowing.due_date + Duration::days(3);

        let details = BorrowingDetails::new(&borrowing, book, None, now, Decimal::from(5000));
        assert_eq!(details.state, BorrowingState::Overdue);
        assert_eq!(details.days_overdue, 3);
        assert_eq!(details.estimated_fine, Decimal::from(15000));
        assert_eq!(details.charged_fine, Decimal::ZERO);
    }
}
