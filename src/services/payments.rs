//! Payment recorder service

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use super::gateway::PaymentGateway;
use crate::{
    config::LibraryPolicy,
    error::AppResult,
    models::{
        payment::{
            generate_transaction_id, resolve_amount, CompletePayment, InitiatePayment, Payment,
            PaymentQuery, PaymentType,
        },
        user::User,
    },
    repository::{payments::NewPayment, Repository},
};

#[derive(Clone)]
pub struct PaymentsService {
    repository: Repository,
    policy: Arc<LibraryPolicy>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentsService {
    pub fn new(
        repository: Repository,
        policy: Arc<LibraryPolicy>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            repository,
            policy,
            gateway,
        }
    }

    /// Record a pending payment for a subscription or a fine
    pub async fn initiate(&self, payer: &User, request: InitiatePayment) -> AppResult<Payment> {
        request.validate()?;

        let fine = match (request.payment_type, request.fine_id) {
            (PaymentType::Fine, Some(fine_id)) => {
                Some(self.repository.fines.get_by_id(fine_id).await?)
            }
            _ => None,
        };

        let amount = resolve_amount(payer, &request, fine.as_ref(), &self.policy)?;

        let details = self
            .gateway
            .authorize(request.payment_method, amount, &request.details)
            .await?;

        let transaction_id = request
            .transaction_id
            .clone()
            .unwrap_or_else(generate_transaction_id);

        let payment = self
            .repository
            .payments
            .create(&NewPayment {
                user_id: payer.id,
                payment_type: request.payment_type,
                amount,
                payment_method: request.payment_method,
                transaction_id,
                details,
                fine_id: fine.map(|f| f.id),
            })
            .await?;

        tracing::info!(
            payment_id = payment.id,
            user_id = payer.id,
            payment_type = %payment.payment_type,
            method = %payment.payment_method,
            amount = %payment.amount,
            transaction_id = %payment.transaction_id,
            "Payment initiated"
        );
        Ok(payment)
    }

    /// Confirm a pending payment and apply its side effect
    pub async fn complete(&self, id: i32, request: CompletePayment) -> AppResult<Payment> {
        request.validate()?;

        let payment = self
            .repository
            .payments
            .complete(id, request.gateway_reference, Utc::now(), &self.policy)
            .await?;

        tracing::info!(
            payment_id = id,
            payment_type = %payment.payment_type,
            transaction_id = %payment.transaction_id,
            "Payment completed"
        );
        Ok(payment)
    }

    pub async fn fail(&self, id: i32) -> AppResult<Payment> {
        let payment = self.repository.payments.fail(id).await?;
        tracing::info!(payment_id = id, "Payment marked failed");
        Ok(payment)
    }

    pub async fn get_payment(&self, id: i32) -> AppResult<Payment> {
        self.repository.payments.get_by_id(id).await
    }

    pub async fn list_payments(&self, query: &PaymentQuery) -> AppResult<(Vec<Payment>, i64)> {
        self.repository.payments.list(query).await
    }
}
