//! Loan entity - A short-term advance against a membership's savings.
//!
//! Loans are created `active` and become `repaid` once. `overdue` is what an active
//! loan looks like after its due date; readers derive it with [`LoanStatus::effective_at`]
//! rather than storing it.

use crate::errors::{Error as LedgerError, Result as LedgerResult};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "repaid")]
    Repaid,
}

impl LoanStatus {
    /// Statuses whose principal still counts against the borrowing limit.
    pub const OUTSTANDING: [Self; 2] = [Self::Active, Self::Overdue];

    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
    }

    /// Status as presented at `now`: an active loan past its due date is overdue.
    #[must_use]
    pub fn effective_at(self, due_date: DateTimeUtc, now: DateTimeUtc) -> Self {
        match self {
            Self::Active if due_date < now => Self::Overdue,
            other => other,
        }
    }

    /// Validates settlement of a loan in this status.
    pub fn settle(self) -> LedgerResult<Self> {
        if self.is_outstanding() {
            Ok(Self::Repaid)
        } else {
            Err(LedgerError::conflict("Loan is already repaid"))
        }
    }
}

/// Loan database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "loans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub membership_id: i64,
    /// Principal
    pub amount: f64,
    /// Group interest rate at issuance (percent)
    pub interest_rate: f64,
    pub interest: f64,
    pub total_repayable: f64,
    pub status: LoanStatus,
    pub purpose: String,
    pub due_date: DateTimeUtc,
    pub repaid_date: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Copy of this loan with its status as presented at `now`.
    #[must_use]
    pub fn presented_at(mut self, now: DateTimeUtc) -> Self {
        self.status = self.status.effective_at(self.due_date, now);
        self
    }
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
