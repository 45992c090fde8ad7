//! Payment model and completion rules

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::fine::Fine;
use super::user::{Role, User};
use crate::config::LibraryPolicy;
use crate::error::{AppError, LendingError};

text_enum! {
    pub enum PaymentType {
        Subscription => "subscription",
        Fine => "fine",
    }
}

text_enum! {
    pub enum PaymentMethod {
        Stripe => "stripe",
        Paypal => "paypal",
        OrangeMoney => "orange_money",
        Afrimoney => "afrimoney",
        Qmoney => "qmoney",
        BankTransfer => "bank_transfer",
    }
}

text_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

/// Payment model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: i32,
    pub user_id: i32,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: String,
    /// Confirmation reference returned by the gateway on completion
    pub gateway_reference: Option<String>,
    /// Gateway metadata (masked card number, phone number, ...)
    #[schema(value_type = Object)]
    pub details: Json<BTreeMap<String, String>>,
    /// Fine settled by this payment (from the payment detail record)
    #[sqlx(default)]
    pub fine_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Side effect owed by a completed payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEffect {
    ExtendSubscription { user_id: i32 },
    MarkFinePaid { fine_id: i32 },
    Nothing,
}

impl Payment {
    /// Pending to completed
    pub fn complete(
        &mut self,
        gateway_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CompletionEffect, LendingError> {
        if self.status != PaymentStatus::Pending {
            return Err(LendingError::InvalidState);
        }

        self.status = PaymentStatus::Completed;
        self.completed_at = Some(now);
        if gateway_reference.is_some() {
            self.gateway_reference = gateway_reference;
        }

        Ok(match (self.payment_type, self.fine_id) {
            (PaymentType::Subscription, _) => CompletionEffect::ExtendSubscription {
                user_id: self.user_id,
            },
            (PaymentType::Fine, Some(fine_id)) => CompletionEffect::MarkFinePaid { fine_id },
            (PaymentType::Fine, None) => CompletionEffect::Nothing,
        })
    }

    /// Pending to failed
    pub fn fail(&mut self) -> Result<(), LendingError> {
        if self.status != PaymentStatus::Pending {
            return Err(LendingError::InvalidState);
        }
        self.status = PaymentStatus::Failed;
        Ok(())
    }
}

/// `SIM-` followed by ten upper-case hex characters
pub fn generate_transaction_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("SIM-{}", hex[..10].to_uppercase())
}

/// New subscription end: one period after the later of now and the current end
pub fn subscription_extension(
    current_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period_days: i64,
) -> DateTime<Utc> {
    let start = match current_end {
        Some(end) if end > now => end,
        _ => now,
    };
    start + Duration::days(period_days)
}

/// Initiate payment request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InitiatePayment {
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    /// Must equal the subscription fee or the fine amount when given
    pub amount: Option<Decimal>,
    pub fine_id: Option<i32>,
    /// Caller-supplied reference; generated when absent
    #[validate(length(min = 4, max = 100))]
    pub transaction_id: Option<String>,
    /// Method-specific fields (card_number, paypal_email, phone_number, bank_reference)
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CompletePayment {
    #[validate(length(min = 1, max = 100))]
    pub gateway_reference: Option<String>,
}

/// Work out the amount to charge for an initiate request.
///
/// `fine` is the fine named by `fine_id`, already loaded. The charge is always
/// the subscription fee or the full fine; a stated `amount` must match it.
pub fn resolve_amount(
    payer: &User,
    request: &InitiatePayment,
    fine: Option<&Fine>,
    policy: &LibraryPolicy,
) -> Result<Decimal, AppError> {
    let owed = match request.payment_type {
        PaymentType::Subscription => {
            if payer.role != Role::Student {
                return Err(AppError::Validation(
                    "Subscriptions are only required for students".to_string(),
                ));
            }
            policy.subscription_fee
        }
        PaymentType::Fine => {
            let fine = fine.ok_or_else(|| {
                AppError::Validation("fine_id is required for fine payments".to_string())
            })?;
            if fine.user_id != payer.id {
                return Err(AppError::Authorization(
                    "Fine belongs to another user".to_string(),
                ));
            }
            if !fine.is_pending() {
                return Err(LendingError::InvalidState.into());
            }
            fine.amount
        }
    };

    match request.amount {
        Some(amount) if amount <= Decimal::ZERO || amount != owed => {
            Err(LendingError::InvalidAmount.into())
        }
        _ if owed <= Decimal::ZERO => Err(LendingError::InvalidAmount.into()),
        _ => Ok(owed),
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PaymentQuery {
    pub user_id: Option<i32>,
    pub payment_type: Option<PaymentType>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
pub(crate) fn sample_payment(payment_type: PaymentType) -> Payment {
    Payment {
        id: 1,
        user_id: 7,
        payment_type,
        amount: Decimal::from(250),
        payment_method: PaymentMethod::OrangeMoney,
        status: PaymentStatus::Pending,
        transaction_id: generate_transaction_id(),
        gateway_reference: None,
        details: Json(BTreeMap::new()),
        fine_id: None,
        created_at: Utc::now(),
        completed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fine::{sample_fine, FineStatus};
    use chrono::TimeZone;

    fn student() -> User {
        User {
            id: 7,
            username: "student".to_string(),
            full_name: None,
            email: None,
            role: Role::Student,
            is_subscription_active: false,
            subscription_end_date: None,
            created_at: None,
        }
    }

    fn request(payment_type: PaymentType) -> InitiatePayment {
        InitiatePayment {
            payment_type,
            payment_method: PaymentMethod::Qmoney,
            amount: None,
            fine_id: None,
            transaction_id: None,
            details: BTreeMap::new(),
        }
    }

    #[test]
    fn transaction_ids_have_the_simulated_shape() {
        let id = generate_transaction_id();
        assert_eq!(id.len(), 14);
        assert!(id.starts_with("SIM-"));
        assert!(id[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(id, generate_transaction_id());
    }

    #[test]
    fn completing_twice_is_rejected() {
        let mut payment = sample_payment(PaymentType::Fine);
        payment.fine_id = Some(3);

        let effect = payment.complete(None, Utc::now()).unwrap();
        assert_eq!(effect, CompletionEffect::MarkFinePaid { fine_id: 3 });
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.completed_at.is_some());

        assert_eq!(
            payment.complete(None, Utc::now()),
            Err(LendingError::InvalidState)
        );
    }

    #[test]
    fn failed_payments_cannot_complete() {
        let mut payment = sample_payment(PaymentType::Subscription);
        payment.fail().unwrap();
        assert_eq!(payment.fail(), Err(LendingError::InvalidState));
        assert_eq!(
            payment.complete(Some("GW-1".to_string()), Utc::now()),
            Err(LendingError::InvalidState)
        );
        assert!(payment.gateway_reference.is_none());
    }

    #[test]
    fn subscription_extends_from_the_later_date() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        assert_eq!(
            subscription_extension(None, now, 180),
            now + Duration::days(180)
        );

        let expired = now - Duration::days(30);
        assert_eq!(
            subscription_extension(Some(expired), now, 180),
            now + Duration::days(180)
        );

        let future = now + Duration::days(20);
        assert_eq!(
            subscription_extension(Some(future), now, 180),
            future + Duration::days(180)
        );
    }

    #[test]
    fn subscription_amount_defaults_to_the_fee() {
        let policy = LibraryPolicy::default();
        let amount =
            resolve_amount(&student(), &request(PaymentType::Subscription), None, &policy).unwrap();
        assert_eq!(amount, policy.subscription_fee);
    }

    #[test]
    fn non_students_cannot_buy_subscriptions() {
        let mut lecturer = student();
        lecturer.role = Role::Lecturer;
        let err = resolve_amount(
            &lecturer,
            &request(PaymentType::Subscription),
            None,
            &LibraryPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn fine_payments_need_an_owned_pending_fine() {
        let policy = LibraryPolicy::default();
        let payer = student();
        let req = request(PaymentType::Fine);

        assert!(resolve_amount(&payer, &req, None, &policy).is_err());

        let fine = sample_fine(3, 250);
        assert_eq!(
            resolve_amount(&payer, &req, Some(&fine), &policy).unwrap(),
            Decimal::from(250)
        );

        let mut paid = sample_fine(4, 250);
        paid.status = FineStatus::Paid;
        let err = resolve_amount(&payer, &req, Some(&paid), &policy).unwrap_err();
        assert_eq!(err.lending(), Some(LendingError::InvalidState));
    }

    #[test]
    fn explicit_amount_must_be_positive() {
        let mut req = request(PaymentType::Subscription);
        req.amount = Some(Decimal::ZERO);
        let err = resolve_amount(&student(), &req, None, &LibraryPolicy::default()).unwrap_err();
        assert_eq!(err.lending(), Some(LendingError::InvalidAmount));
    }

    #[test]
    fn partial_fine_payment_is_rejected() {
        let policy = LibraryPolicy::default();
        let fine = sample_fine(3, 250);
        let mut req = request(PaymentType::Fine);
        req.fine_id = Some(3);
        req.amount = Some(Decimal::ONE);

        let err = resolve_amount(&student(), &req, Some(&fine), &policy).unwrap_err();
        assert_eq!(err.lending(), Some(LendingError::InvalidAmount));

        req.amount = Some(Decimal::from(300));
        let err = resolve_amount(&student(), &req, Some(&fine), &policy).unwrap_err();
        assert_eq!(err.lending(), Some(LendingError::InvalidAmount));

        req.amount = Some(Decimal::from(250));
        assert_eq!(
            resolve_amount(&student(), &req, Some(&fine), &policy).unwrap(),
            Decimal::from(250)
        );
    }

    #[test]
    fn discounted_subscription_is_rejected() {
        let policy = LibraryPolicy::default();
        let mut req = request(PaymentType::Subscription);
        req.amount = Some(Decimal::ONE);

        let err = resolve_amount(&student(), &req, None, &policy).unwrap_err();
        assert_eq!(err.lending(), Some(LendingError::InvalidAmount));

        req.amount = Some(policy.subscription_fee);
        assert_eq!(
            resolve_amount(&student(), &req, None, &policy).unwrap(),
            policy.subscription_fee
        );
    }
}
