//! Membership registry - Creates and reads the ledger rows linking users to groups.
//!
//! The registry enforces one membership per (user, group) and the group member cap.
//! It owns `saved_amount`, which only moves through [`increment_saved_amount`].
//! Functions are generic over [`ConnectionTrait`] so workflows can run them inside
//! their own database transactions.

use crate::{
    entities::{
        Group, Loan, Membership, loan,
        loan::LoanStatus,
        membership::{self, MembershipRole, MembershipStatus},
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};

/// Finds a membership by its unique ID.
pub async fn get_membership_by_id<C>(db: &C, membership_id: i64) -> Result<Option<membership::Model>>
where
    C: ConnectionTrait,
{
    Membership::find_by_id(membership_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Like [`get_membership_by_id`] but a missing membership is an error.
pub async fn require_membership<C>(db: &C, membership_id: i64) -> Result<membership::Model>
where
    C: ConnectionTrait,
{
    get_membership_by_id(db, membership_id)
        .await?
        .ok_or_else(|| Error::not_found("Membership", membership_id))
}

pub async fn get_membership_for_user_and_group<C>(
    db: &C,
    user_id: i64,
    group_id: i64,
) -> Result<Option<membership::Model>>
where
    C: ConnectionTrait,
{
    Membership::find()
        .filter(membership::Column::UserId.eq(user_id))
        .filter(membership::Column::GroupId.eq(group_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All memberships of a user, oldest first.
pub async fn get_memberships_for_user<C>(db: &C, user_id: i64) -> Result<Vec<membership::Model>>
where
    C: ConnectionTrait,
{
    Membership::find()
        .filter(membership::Column::UserId.eq(user_id))
        .order_by_asc(membership::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All memberships of a group, oldest first.
pub async fn get_memberships_for_group<C>(db: &C, group_id: i64) -> Result<Vec<membership::Model>>
where
    C: ConnectionTrait,
{
    Membership::find()
        .filter(membership::Column::GroupId.eq(group_id))
        .order_by_asc(membership::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

pub async fn count_active_members<C>(db: &C, group_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    Membership::find()
        .filter(membership::Column::GroupId.eq(group_id))
        .filter(membership::Column::Status.eq(MembershipStatus::Active))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Sum of `saved_amount` over every membership in the group.
pub async fn sum_group_saved<C>(db: &C, group_id: i64) -> Result<f64>
where
    C: ConnectionTrait,
{
    let memberships = get_memberships_for_group(db, group_id).await?;
    Ok(memberships.iter().map(|m| m.saved_amount).sum())
}

/// Creates a membership for `user_id` in `group_id`.
///
/// Fails with `Conflict` if the pair already exists and with `Capacity` if the group
/// already has `max_members` active memberships. The unique index on (user, group)
/// backs the duplicate check.
pub async fn create_membership<C>(
    db: &C,
    user_id: i64,
    group_id: i64,
    role: MembershipRole,
    target_amount: f64,
) -> Result<membership::Model>
where
    C: ConnectionTrait,
{
    let group = Group::find_by_id(group_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Group", group_id))?;

    if get_membership_for_user_and_group(db, user_id, group_id)
        .await?
        .is_some()
    {
        return Err(Error::conflict(format!(
            "User {user_id} is already a member of group {group_id}"
        )));
    }

    let active_members = count_active_members(db, group_id).await?;
    if active_members >= u64::try_from(group.max_members.max(0)).unwrap_or(0) {
        return Err(Error::Capacity {
            group_id,
            max_members: group.max_members,
        });
    }

    let now = chrono::Utc::now();
    let membership = membership::ActiveModel {
        user_id: Set(user_id),
        group_id: Set(group_id),
        role: Set(role),
        target_amount: Set(target_amount),
        saved_amount: Set(0.0),
        status: Set(MembershipStatus::Active),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let created = membership.insert(db).await.map_err(|e| {
        Error::from_insert(
            e,
            &format!("User {user_id} is already a member of group {group_id}"),
        )
    })?;

    tracing::info!(
        membership_id = created.id,
        user_id,
        group_id,
        "Membership created"
    );
    Ok(created)
}

/// Atomically adds a confirmed contribution amount to a membership balance.
///
/// This performs a single SQL UPDATE so concurrent confirmations never lose an update:
/// `UPDATE memberships SET saved_amount = saved_amount + delta WHERE id = ?`
///
/// # Returns
/// The updated membership model
pub async fn increment_saved_amount<C>(
    db: &C,
    membership_id: i64,
    delta: f64,
) -> Result<membership::Model>
where
    C: ConnectionTrait,
{
    if !delta.is_finite() || delta <= 0.0 {
        return Err(Error::validation(format!(
            "Saved amount can only grow by a positive amount, got {delta}"
        )));
    }

    let result = Membership::update_many()
        .col_expr(
            membership::Column::SavedAmount,
            Expr::col(membership::Column::SavedAmount).add(delta),
        )
        .col_expr(
            membership::Column::UpdatedAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(membership::Column::Id.eq(membership_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::not_found("Membership", membership_id));
    }

    require_membership(db, membership_id).await
}

/// Sum of principals of loans that still count against the borrowing limit.
///
/// Must be called on the same connection or transaction that validates a new loan.
pub async fn find_outstanding_loan_principal_sum<C>(db: &C, membership_id: i64) -> Result<f64>
where
    C: ConnectionTrait,
{
    let loans = Loan::find()
        .filter(loan::Column::MembershipId.eq(membership_id))
        .filter(loan::Column::Status.is_in(LoanStatus::OUTSTANDING))
        .all(db)
        .await?;

    Ok(loans.iter().map(|l| l.amount).sum())
}
