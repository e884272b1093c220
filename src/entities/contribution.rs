//! Contribution entity - A single deposit toward a membership's target.
//!
//! Contributions start `pending` and move exactly once to `confirmed` or `rejected`.
//! Only confirmation changes the membership ledger.

use crate::errors::{Error as LedgerError, Result as LedgerResult};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "card")]
    Card,
    #[sea_orm(string_value = "bank")]
    Bank,
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "mobile")]
    Mobile,
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            "cash" => Ok(Self::Cash),
            "mobile" => Ok(Self::Mobile),
            other => Err(LedgerError::validation(format!(
                "Payment method '{other}' is not one of card, bank, cash, mobile"
            ))),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Card => "card",
            Self::Bank => "bank",
            Self::Cash => "cash",
            Self::Mobile => "mobile",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl ContributionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected)
    }

    /// Validates a move from `self` to `next` and returns `next`.
    ///
    /// Only `Pending` may move, and only to a terminal state.
    pub fn transition_to(self, next: Self) -> LedgerResult<Self> {
        match (self, next) {
            (Self::Pending, Self::Confirmed | Self::Rejected) => Ok(next),
            (Self::Pending, Self::Pending) => Err(LedgerError::conflict(
                "Contribution is already pending".to_string(),
            )),
            (current, _) => Err(LedgerError::conflict(format!(
                "Contribution is already {}",
                current.label()
            ))),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }
}

/// Contribution database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contributions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub membership_id: i64,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    /// Human-readable unique reference, also used by the payment gateway
    #[sea_orm(unique)]
    pub reference: String,
    pub status: ContributionStatus,
    /// Admin who confirmed it; `None` for gateway confirmations
    pub confirmed_by: Option<i64>,
    pub confirmed_at: Option<DateTimeUtc>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::membership::Entity",
        from = "Column::MembershipId",
        to = "super::membership::Column::Id"
    )]
    Membership,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
