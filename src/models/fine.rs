//! Fine ledger model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::LendingError;

text_enum! {
    pub enum FineType {
        Overdue => "overdue",
        Damage => "damage",
        Lost => "lost",
        General => "general",
        Other => "other",
    }
}

text_enum! {
    pub enum FineStatus {
        Pending => "pending",
        Paid => "paid",
        Cancelled => "cancelled",
    }
}

impl Default for FineType {
    fn default() -> Self {
        FineType::General
    }
}

/// Fine model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i32,
    pub user_id: i32,
    pub book_id: Option<i32>,
    /// Borrowing whose return produced this fine
    pub borrowing_id: Option<i32>,
    pub fine_type: FineType,
    pub amount: Decimal,
    pub date_issued: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: FineStatus,
    pub payment_date: Option<DateTime<Utc>>,
    /// Free text: a gateway name or e.g. "cash" for desk payments
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl Fine {
    pub fn is_pending(&self) -> bool {
        self.status == FineStatus::Pending
    }

    /// Pending to paid; stamps the payment and appends any notes
    pub fn mark_paid(
        &mut self,
        payment_method: Option<&str>,
        payment_reference: Option<&str>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), LendingError> {
        if !self.is_pending() {
            return Err(LendingError::InvalidState);
        }

        self.status = FineStatus::Paid;
        self.payment_date = Some(now);
        if let Some(method) = payment_method {
            self.payment_method = Some(method.to_string());
        }
        if let Some(reference) = payment_reference {
            self.payment_reference = Some(reference.to_string());
        }
        if let Some(extra) = notes.filter(|n| !n.trim().is_empty()) {
            self.notes = Some(match self.notes.take().filter(|n| !n.is_empty()) {
                Some(existing) => format!("{}\n{}", existing, extra),
                None => extra.to_string(),
            });
        }
        Ok(())
    }

    /// Borrowing whose overdue charge this paid fine settles
    pub fn settles_borrowing(&self) -> Option<i32> {
        match (self.fine_type, self.status) {
            (FineType::Overdue, FineStatus::Paid) => self.borrowing_id,
            _ => None,
        }
    }

    /// Void the fine whatever its status
    pub fn cancel(&mut self) {
        self.status = FineStatus::Cancelled;
    }
}

/// Issue fine request, also built by the return transition for penalties
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct IssueFine {
    pub user_id: i32,
    pub book_id: Option<i32>,
    /// Only set by the return transition
    #[serde(skip)]
    pub borrowing_id: Option<i32>,
    #[serde(default)]
    pub fine_type: FineType,
    pub amount: Decimal,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl IssueFine {
    pub fn validate_amount(&self) -> Result<(), LendingError> {
        if self.amount <= Decimal::ZERO {
            return Err(LendingError::InvalidAmount);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct MarkFinePaid {
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(max = 100))]
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct FineQuery {
    pub user_id: Option<i32>,
    pub status: Option<FineStatus>,
    pub fine_type: Option<FineType>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Pending and paid sums, for one user or the whole library
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FineTotals {
    pub pending_total: Decimal,
    pub paid_total: Decimal,
    pub pending_count: i64,
}

impl FineTotals {
    pub fn from_fines<'a>(fines: impl IntoIterator<Item = &'a Fine>) -> Self {
        fines.into_iter().fold(FineTotals::default(), |mut totals, fine| {
            match fine.status {
                FineStatus::Pending => {
                    totals.pending_total += fine.amount;
                    totals.pending_count += 1;
                }
                FineStatus::Paid => totals.paid_total += fine.amount,
                FineStatus::Cancelled => {}
            }
            totals
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserFines {
    pub fines: Vec<Fine>,
    pub totals: FineTotals,
}

#[cfg(test)]
pub(crate) fn sample_fine(id: i32, amount: i64) -> Fine {
    Fine {
        id,
        user_id: 7,
        book_id: None,
        borrowing_id: None,
        fine_type: FineType::General,
        amount: Decimal::from(amount),
        date_issued: Utc::now(),
        due_date: None,
        status: FineStatus::Pending,
        payment_date: None,
        payment_method: None,
        payment_reference: None,
        reason: None,
        notes: None,
    }
}
