//! Payment gateway abstraction
//!
//! The library has no live gateway contract yet; `SimulatedGateway` validates the
//! method-specific fields and hands back the details worth keeping.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    models::payment::PaymentMethod,
};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Check the payer's method details and return the sanitized details to store
    async fn authorize(
        &self,
        method: PaymentMethod,
        amount: Decimal,
        fields: &BTreeMap<String, String>,
    ) -> AppResult<BTreeMap<String, String>>;
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway;

fn required<'a>(fields: &'a BTreeMap<String, String>, key: &str) -> AppResult<&'a str> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required for this payment method", key)))
}

/// Keep only the last four digits of a card number
pub fn mask_card_number(number: &str) -> AppResult<String> {
    let digits: String = number.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    if !(12..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("Invalid card number".to_string()));
    }
    Ok(format!("**** **** **** {}", &digits[digits.len() - 4..]))
}

fn normalize_phone(phone: &str) -> AppResult<String> {
    let cleaned: String = phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("Invalid phone number".to_string()));
    }
    Ok(cleaned)
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(
        &self,
        method: PaymentMethod,
        amount: Decimal,
        fields: &BTreeMap<String, String>,
    ) -> AppResult<BTreeMap<String, String>> {
        let mut details = BTreeMap::new();

        match method {
            PaymentMethod::Stripe => {
                let masked = mask_card_number(required(fields, "card_number")?)?;
                details.insert("card_number".to_string(), masked);
                if let Some(name) = fields.get("cardholder_name") {
                    details.insert("cardholder_name".to_string(), name.trim().to_string());
                }
            }
            PaymentMethod::Paypal => {
                let email = required(fields, "paypal_email")?;
                if !email.contains('@') {
                    return Err(AppError::Validation("Invalid PayPal e-mail".to_string()));
                }
                details.insert("paypal_email".to_string(), email.to_string());
            }
            PaymentMethod::OrangeMoney | PaymentMethod::Afrimoney | PaymentMethod::Qmoney => {
                let phone = normalize_phone(required(fields, "phone_number")?)?;
                details.insert("phone_number".to_string(), phone);
            }
            PaymentMethod::BankTransfer => {
                let reference = required(fields, "bank_reference")?;
                details.insert("bank_reference".to_string(), reference.to_string());
            }
        }

        details.insert("gateway".to_string(), "simulated".to_string());
        tracing::debug!(method = %method, %amount, "Simulated gateway authorized payment");
        Ok(details)
    }
}
