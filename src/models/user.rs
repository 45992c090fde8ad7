//! Users, roles and token claims
//!
//! Accounts are provisioned by the campus sign-on service. This server keeps a
//! local row per user (synced from token claims) for subscriptions and locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

text_enum! {
    pub enum Role {
        Student => "student",
        Lecturer => "lecturer",
        Staff => "staff",
        Admin => "admin",
    }
}

/// Things a role may do; checked once at the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    BorrowBooks,
    ManageCatalog,
    ProcessReturns,
    ManageFines,
    ManagePayments,
    ViewReports,
    AccessEbooks,
    HoldSubscription,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Student => &[BorrowBooks, HoldSubscription],
            Role::Lecturer => &[BorrowBooks, AccessEbooks],
            Role::Staff => &[
                BorrowBooks,
                AccessEbooks,
                ManageCatalog,
                ProcessReturns,
                ManageFines,
                ManagePayments,
            ],
            Role::Admin => &[
                BorrowBooks,
                ManageCatalog,
                ProcessReturns,
                ManageFines,
                ManagePayments,
                ViewReports,
                AccessEbooks,
                HoldSubscription,
            ],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// User model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub is_subscription_active: bool,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Subscription entitlement as shown on dashboards
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionStatus {
    /// Only students pay for a subscription
    pub required: bool,
    pub active: bool,
    pub valid_until: Option<DateTime<Utc>>,
}

impl User {
    pub fn subscription_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        let required = self.role == Role::Student;
        let active = !required
            || (self.is_subscription_active
                && self.subscription_end_date.map_or(false, |end| end >= now));

        SubscriptionStatus {
            required,
            active,
            valid_until: self.subscription_end_date,
        }
    }

    /// E-books are open to roles holding `AccessEbooks`, and to subscribers
    /// while their subscription runs
    pub fn can_read_ebooks(&self, now: DateTime<Utc>) -> bool {
        self.role.can(Capability::AccessEbooks)
            || (self.role.can(Capability::HoldSubscription)
                && self.subscription_status(now).active)
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserShort {
    pub id: i32,
    pub username: String,
    pub full_name: Option<String>,
    pub role: Role,
}

/// JWT claims issued by the sign-on service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "Role {} lacks the {:?} capability",
                self.role, capability
            )))
        }
    }

    /// Allow the owner of a record, or anyone holding `capability`
    pub fn require_self_or(&self, owner_id: i32, capability: Capability) -> Result<(), AppError> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            self.require(capability)
        }
    }
}
