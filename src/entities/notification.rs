//! Notification entity - Append-only outbox of messages for users.
//!
//! Rows are never edited except for the `read` flag.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "contribution_submitted")]
    ContributionSubmitted,
    /// Sent to admins: a contribution is waiting for review
    #[sea_orm(string_value = "contribution_pending")]
    ContributionPending,
    #[sea_orm(string_value = "contribution_confirmed")]
    ContributionConfirmed,
    #[sea_orm(string_value = "contribution_rejected")]
    ContributionRejected,
    #[sea_orm(string_value = "individual_target")]
    IndividualTarget,
    #[sea_orm(string_value = "group_target")]
    GroupTarget,
    #[sea_orm(string_value = "loan_issued")]
    LoanIssued,
    #[sea_orm(string_value = "loan_repaid")]
    LoanRepaid,
    /// Sent to admins: a new user is waiting for approval
    #[sea_orm(string_value = "registration_pending")]
    RegistrationPending,
    #[sea_orm(string_value = "welcome")]
    Welcome,
    #[sea_orm(string_value = "membership_assigned")]
    MembershipAssigned,
    #[sea_orm(string_value = "account_status")]
    AccountStatus,
}

/// Kind of record a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum RelatedModel {
    #[sea_orm(string_value = "contribution")]
    Contribution,
    #[sea_orm(string_value = "loan")]
    Loan,
    #[sea_orm(string_value = "membership")]
    Membership,
    #[sea_orm(string_value = "group")]
    Group,
    #[sea_orm(string_value = "user")]
    User,
}

/// Notification database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Recipient
    pub user_id: i64,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub related_id: Option<i64>,
    pub related_model: Option<RelatedModel>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
