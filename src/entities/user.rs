//! User entity - A person who can hold memberships in savings groups.
//!
//! Users register as `pending` and become `active` once an admin approves them.
//! The `role` decides whether the user can confirm contributions and approve others.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a user across the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular saver.
    #[sea_orm(string_value = "member")]
    Member,
    /// Reviews registrations and confirms contributions.
    #[sea_orm(string_value = "admin")]
    Admin,
}

/// Account status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Registered, waiting for admin approval.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Approved and allowed to save and borrow.
    #[sea_orm(string_value = "active")]
    Active,
    /// Suspended by an admin.
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl UserStatus {
    /// Whether an admin may move a user from `self` to `next`.
    ///
    /// Nothing goes back to `Pending`, and a no-op change is not a transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active | Self::Inactive)
                | (Self::Active, Self::Inactive)
                | (Self::Inactive, Self::Active)
        )
    }
}

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Login email, unique across all users
    #[sea_orm(unique)]
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// True for admins whose account is active.
    #[must_use]
    pub fn is_active_admin(&self) -> bool {
        self.role == UserRole::Admin && self.status == UserStatus::Active
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::membership::Entity")]
    Memberships,
    #[sea_orm(has_many = "super::notification::Entity")]
    Notifications,
    #[sea_orm(has_many = "super::preferred_group::Entity")]
    PreferredGroups,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl Related<super::preferred_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PreferredGroups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
