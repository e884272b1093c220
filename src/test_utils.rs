//! Shared test utilities for the stokvel ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        contribution::generate_reference,
        group::{self, NewGroup},
        loan::calculate_terms,
        membership,
    },
    entities::{
        self,
        contribution::{ContributionStatus, PaymentMethod},
        loan::LoanStatus,
        membership::MembershipRole,
        user::{UserRole, UserStatus},
    },
    errors::Result,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test group with the default loan terms.
///
/// # Defaults
/// * `interest_rate`: 30
/// * `overdue_interest_rate`: 60
/// * `loan_percentage_limit`: 50
/// * `loan_repayment_days`: 30
/// * `cycle`: monthly
pub async fn create_test_group(
    db: &DatabaseConnection,
    name: &str,
    target_amount: f64,
    max_members: i32,
) -> Result<entities::group::Model> {
    group::create_group(db, NewGroup::new(name, target_amount, max_members)).await
}

async fn insert_test_user(
    db: &DatabaseConnection,
    email: &str,
    role: UserRole,
) -> Result<entities::user::Model> {
    let now = chrono::Utc::now();
    let name = email.split('@').next().unwrap_or(email).to_string();
    let user = entities::user::ActiveModel {
        name: Set(name),
        email: Set(email.to_string()),
        role: Set(role),
        status: Set(UserStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(user.insert(db).await?)
}

/// Inserts an active member directly, skipping registration and its notifications.
pub async fn create_test_member(
    db: &DatabaseConnection,
    email: &str,
) -> Result<entities::user::Model> {
    insert_test_user(db, email, UserRole::Member).await
}

/// Inserts an active admin directly.
pub async fn create_test_admin(
    db: &DatabaseConnection,
    email: &str,
) -> Result<entities::user::Model> {
    insert_test_user(db, email, UserRole::Admin).await
}

/// Sets up a group of five with one active member.
/// Returns (db, group, member, membership); the membership target is `target_amount`.
pub async fn setup_with_membership(
    target_amount: f64,
    loan_percentage_limit: f64,
) -> Result<(
    DatabaseConnection,
    entities::group::Model,
    entities::user::Model,
    entities::membership::Model,
)> {
    let db = setup_test_db().await?;
    let group = group::create_group(
        &db,
        NewGroup {
            loan_percentage_limit,
            ..NewGroup::new("Test Group", target_amount, 5)
        },
    )
    .await?;
    let member = create_test_member(&db, "member@example.com").await?;
    let membership = membership::create_membership(
        &db,
        member.id,
        group.id,
        MembershipRole::Member,
        target_amount,
    )
    .await?;
    Ok((db, group, member, membership))
}

/// Like [`setup_with_membership`] with `saved` already confirmed into the balance.
/// Uses a target of 5000 and the default 50% borrowing limit.
pub async fn setup_with_savings(
    saved: f64,
) -> Result<(
    DatabaseConnection,
    entities::group::Model,
    entities::user::Model,
    entities::membership::Model,
)> {
    let (db, group, member, membership) = setup_with_membership(5000.0, 50.0).await?;
    let membership = membership::increment_saved_amount(&db, membership.id, saved).await?;
    Ok((db, group, member, membership))
}

/// Inserts a loan row directly with the group's current interest rate.
pub async fn insert_test_loan(
    db: &DatabaseConnection,
    membership: &entities::membership::Model,
    group: &entities::group::Model,
    user_id: i64,
    amount: f64,
    status: LoanStatus,
) -> Result<entities::loan::Model> {
    let now = chrono::Utc::now();
    let terms = calculate_terms(amount, group.interest_rate);
    let loan = entities::loan::ActiveModel {
        user_id: Set(user_id),
        group_id: Set(group.id),
        membership_id: Set(membership.id),
        amount: Set(amount),
        interest_rate: Set(group.interest_rate),
        interest: Set(terms.interest),
        total_repayable: Set(terms.total_repayable),
        status: Set(status),
        purpose: Set("Test loan".to_string()),
        due_date: Set(now + chrono::Duration::days(i64::from(group.loan_repayment_days))),
        repaid_date: Set((status == LoanStatus::Repaid).then_some(now)),
        created_at: Set(now),
        ..Default::default()
    };
    Ok(loan.insert(db).await?)
}

/// Inserts a pending cash contribution without the amount checks or notifications.
pub async fn insert_pending_contribution(
    db: &DatabaseConnection,
    membership: &entities::membership::Model,
    amount: f64,
) -> Result<entities::contribution::Model> {
    let contribution = entities::contribution::ActiveModel {
        user_id: Set(membership.user_id),
        group_id: Set(membership.group_id),
        membership_id: Set(membership.id),
        amount: Set(amount),
        payment_method: Set(PaymentMethod::Cash),
        reference: Set(generate_reference()),
        status: Set(ContributionStatus::Pending),
        confirmed_by: Set(None),
        confirmed_at: Set(None),
        rejection_reason: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(contribution.insert(db).await?)
}
