//! Group entity - A stokvel savings program.
//!
//! Each group defines the per-member savings target, the member cap and the loan
//! parameters used when members borrow against their savings.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Standard loan interest rate, in percent.
pub const DEFAULT_INTEREST_RATE: f64 = 30.0;
/// Penalty interest rate applied to loans settled after their due date, in percent.
pub const DEFAULT_OVERDUE_INTEREST_RATE: f64 = 60.0;
/// Share of a member's savings that may be borrowed, in percent.
pub const DEFAULT_LOAN_PERCENTAGE_LIMIT: f64 = 50.0;
/// Days between loan issuance and its due date.
pub const DEFAULT_LOAN_REPAYMENT_DAYS: i32 = 30;

/// How often members are expected to contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ContributionCycle {
    #[sea_orm(string_value = "weekly")]
    Weekly,
    #[sea_orm(string_value = "monthly")]
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "completed")]
    Completed,
}

/// Group database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Savings target for each member
    pub target_amount: f64,
    /// Maximum number of active memberships
    pub max_members: i32,
    /// Standard loan interest rate (percent)
    pub interest_rate: f64,
    /// Flat penalty rate for loans repaid late (percent)
    pub overdue_interest_rate: f64,
    /// Percentage of savings a member may have outstanding as loans
    pub loan_percentage_limit: f64,
    /// Loan term in days
    pub loan_repayment_days: i32,
    pub cycle: ContributionCycle,
    pub status: GroupStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Savings target for the whole group: per-member target times the member cap.
    #[must_use]
    pub fn group_target(&self) -> f64 {
        self.target_amount * f64::from(self.max_members)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::membership::Entity")]
    Memberships,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
