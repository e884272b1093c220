//! Contribution workflow - Records deposits and commits them to the ledger on confirmation.
//!
//! A contribution is created `pending` and changes the membership balance only when it is
//! confirmed, either by an active admin or by the payment gateway. Confirmation is
//! idempotent: a second confirmation of the same contribution fails with `Conflict`.
//! Rejection is terminal and never touches the ledger.

use crate::{
    core::{membership, milestone, notification},
    entities::{
        Contribution, Group, User, contribution,
        contribution::{ContributionStatus, PaymentMethod},
        membership::MembershipStatus,
        notification::{NotificationKind, RelatedModel},
    },
    errors::{Error, Result, Violations},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};

/// Smallest amount accepted for a single contribution.
pub const MIN_CONTRIBUTION: f64 = 50.0;

/// Display reference of the form `STK-XXXXXXXXXX`.
#[must_use]
pub fn generate_reference() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("STK-{}", &id[..10])
}

/// Records a pending contribution for the requester's own membership.
///
/// The amount must be at least [`MIN_CONTRIBUTION`] and no more than what is left to
/// reach the personal target; every violated rule is reported together. Every active
/// admin and the requester are notified.
pub async fn add_contribution(
    db: &DatabaseConnection,
    membership_id: i64,
    amount: f64,
    payment_method: &str,
    requester_id: i64,
) -> Result<contribution::Model> {
    let txn = db.begin().await?;

    let membership = membership::require_membership(&txn, membership_id).await?;
    if membership.user_id != requester_id {
        return Err(Error::unauthorized(
            "You can only contribute to your own membership",
        ));
    }

    let remaining = membership.remaining_to_target();
    let mut violations = Violations::new();
    violations.check(amount.is_finite(), "Amount must be a valid number");
    violations.check(
        amount >= MIN_CONTRIBUTION,
        format!("Minimum contribution is {MIN_CONTRIBUTION:.2}"),
    );
    violations.check(
        amount <= remaining,
        format!("Amount exceeds the remaining target of {remaining:.2}"),
    );
    let method = payment_method.parse::<PaymentMethod>();
    violations.check(
        method.is_ok(),
        format!("Payment method '{payment_method}' is not one of card, bank, cash, mobile"),
    );
    violations.into_result()?;
    let payment_method = method?;

    let contribution = contribution::ActiveModel {
        user_id: Set(membership.user_id),
        group_id: Set(membership.group_id),
        membership_id: Set(membership.id),
        amount: Set(amount),
        payment_method: Set(payment_method),
        reference: Set(generate_reference()),
        status: Set(ContributionStatus::Pending),
        confirmed_by: Set(None),
        confirmed_at: Set(None),
        rejection_reason: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    let created = contribution.insert(&txn).await?;

    let related = Some((RelatedModel::Contribution, created.id));
    notification::notify_active_admins(
        &txn,
        &format!(
            "New contribution {} of {:.2} via {} is awaiting confirmation.",
            created.reference, created.amount, created.payment_method
        ),
        NotificationKind::ContributionPending,
        related,
    )
    .await?;
    notification::notify(
        &txn,
        requester_id,
        format!(
            "Your contribution {} of {:.2} was received and is pending confirmation.",
            created.reference, created.amount
        ),
        NotificationKind::ContributionSubmitted,
        related,
    )
    .await?;

    txn.commit().await?;

    tracing::info!(
        contribution_id = created.id,
        membership_id,
        amount,
        reference = %created.reference,
        "Contribution recorded"
    );
    Ok(created)
}

/// Confirms a pending contribution on behalf of an active admin.
pub async fn confirm_contribution(
    db: &DatabaseConnection,
    contribution_id: i64,
    confirming_admin_id: i64,
) -> Result<contribution::Model> {
    let txn = db.begin().await?;

    require_active_admin(&txn, confirming_admin_id).await?;
    let contribution = Contribution::find_by_id(contribution_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Contribution", contribution_id))?;

    let confirmed = commit_confirmation(&txn, contribution, Some(confirming_admin_id)).await?;
    txn.commit().await?;
    Ok(confirmed)
}

/// Confirms a contribution whose payment the gateway verified, looked up by reference.
///
/// Behaves exactly like an admin confirmation, milestones included, with no
/// confirming user recorded.
pub async fn confirm_gateway_payment(
    db: &DatabaseConnection,
    reference: &str,
) -> Result<contribution::Model> {
    let txn = db.begin().await?;

    let contribution = Contribution::find()
        .filter(contribution::Column::Reference.eq(reference))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Contribution", reference))?;

    let confirmed = commit_confirmation(&txn, contribution, None).await?;
    txn.commit().await?;
    Ok(confirmed)
}

/// Shared confirmation path: status guard, stamp, ledger increment, notifications.
async fn commit_confirmation<C>(
    db: &C,
    contribution: contribution::Model,
    confirmed_by: Option<i64>,
) -> Result<contribution::Model>
where
    C: ConnectionTrait,
{
    let next = contribution
        .status
        .transition_to(ContributionStatus::Confirmed)?;

    // Guarded write: only a row that is still pending flips to confirmed
    let now = chrono::Utc::now();
    let result = Contribution::update_many()
        .col_expr(contribution::Column::Status, Expr::value(next))
        .col_expr(contribution::Column::ConfirmedBy, Expr::value(confirmed_by))
        .col_expr(contribution::Column::ConfirmedAt, Expr::value(Some(now)))
        .filter(contribution::Column::Id.eq(contribution.id))
        .filter(contribution::Column::Status.eq(ContributionStatus::Pending))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::conflict("Contribution was already processed"));
    }

    let updated_membership =
        membership::increment_saved_amount(db, contribution.membership_id, contribution.amount)
            .await?;

    let group = Group::find_by_id(contribution.group_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Group", contribution.group_id))?;
    let group_memberships = membership::get_memberships_for_group(db, group.id).await?;
    let group_total = group_memberships.iter().map(|m| m.saved_amount).sum();
    let active_member_ids = group_memberships
        .iter()
        .filter(|m| m.status == MembershipStatus::Active)
        .map(|m| m.user_id)
        .collect();

    notification::notify(
        db,
        contribution.user_id,
        format!(
            "Your contribution {} of {:.2} was confirmed. You have saved {:.2} of {:.2}.",
            contribution.reference,
            contribution.amount,
            updated_membership.saved_amount,
            updated_membership.target_amount
        ),
        NotificationKind::ContributionConfirmed,
        Some((RelatedModel::Contribution, contribution.id)),
    )
    .await?;

    let planned = milestone::plan_milestones(&milestone::MilestoneInput {
        contributor_id: contribution.user_id,
        membership_id: updated_membership.id,
        group_id: group.id,
        group_name: group.name.clone(),
        delta: contribution.amount,
        saved_amount: updated_membership.saved_amount,
        target_amount: updated_membership.target_amount,
        group_total,
        group_target: group.group_target(),
        active_member_ids,
    });
    let milestones = milestone::apply_milestones(db, planned).await?;

    tracing::info!(
        contribution_id = contribution.id,
        membership_id = contribution.membership_id,
        amount = contribution.amount,
        saved_amount = updated_membership.saved_amount,
        milestones,
        "Contribution confirmed"
    );

    Contribution::find_by_id(contribution.id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Contribution", contribution.id))
}

/// Rejects a pending contribution. The ledger is left untouched.
pub async fn reject_contribution(
    db: &DatabaseConnection,
    contribution_id: i64,
    admin_id: i64,
    reason: Option<String>,
) -> Result<contribution::Model> {
    let txn = db.begin().await?;

    require_active_admin(&txn, admin_id).await?;
    let contribution = Contribution::find_by_id(contribution_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Contribution", contribution_id))?;

    let next = contribution
        .status
        .transition_to(ContributionStatus::Rejected)?;

    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let mut active: contribution::ActiveModel = contribution.into();
    active.status = Set(next);
    active.rejection_reason = Set(reason.clone());
    let rejected = active.update(&txn).await?;

    let message = reason.map_or_else(
        || format!("Your contribution {} was rejected.", rejected.reference),
        |r| format!("Your contribution {} was rejected: {r}", rejected.reference),
    );
    notification::notify(
        &txn,
        rejected.user_id,
        message,
        NotificationKind::ContributionRejected,
        Some((RelatedModel::Contribution, rejected.id)),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(contribution_id, admin_id, "Contribution rejected");
    Ok(rejected)
}

async fn require_active_admin<C>(db: &C, user_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;

    if user.is_active_admin() {
        Ok(())
    } else {
        Err(Error::unauthorized(
            "Only active admins can review contributions",
        ))
    }
}

pub async fn get_contribution_by_id(
    db: &DatabaseConnection,
    contribution_id: i64,
) -> Result<Option<contribution::Model>> {
    Contribution::find_by_id(contribution_id)
        .one(db)
        .await
        .map_err(Into::into)
}

pub async fn get_contribution_by_reference(
    db: &DatabaseConnection,
    reference: &str,
) -> Result<Option<contribution::Model>> {
    Contribution::find()
        .filter(contribution::Column::Reference.eq(reference))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Contribution history of a membership, newest first.
pub async fn get_contributions_for_membership(
    db: &DatabaseConnection,
    membership_id: i64,
) -> Result<Vec<contribution::Model>> {
    Contribution::find()
        .filter(contribution::Column::MembershipId.eq(membership_id))
        .order_by_desc(contribution::Column::CreatedAt)
        .order_by_desc(contribution::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Contributions waiting for review, oldest first.
pub async fn get_pending_contributions(
    db: &DatabaseConnection,
) -> Result<Vec<contribution::Model>> {
    Contribution::find()
        .filter(contribution::Column::Status.eq(ContributionStatus::Pending))
        .order_by_asc(contribution::Column::CreatedAt)
        .order_by_asc(contribution::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::notification::get_notifications_for_user;
    use crate::entities::membership::MembershipRole;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_add_contribution_records_pending_and_notifies() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(1000.0, 50.0).await?;
        let admin = create_test_admin(&db, "admin@example.com").await?;

        let created = add_contribution(&db, membership.id, 200.0, "mobile", member.id).await?;

        assert_eq!(created.status, ContributionStatus::Pending);
        assert_eq!(created.payment_method, PaymentMethod::Mobile);
        assert_eq!(created.amount, 200.0);
        assert!(created.reference.starts_with("STK-"));
        assert_eq!(created.reference.len(), 14);
        assert!(created.confirmed_by.is_none());

        // Pending contributions never touch the ledger
        let unchanged = membership::require_membership(&db, membership.id).await?;
        assert_eq!(unchanged.saved_amount, 0.0);

        let admin_inbox = get_notifications_for_user(&db, admin.id, false).await?;
        assert_eq!(admin_inbox.len(), 1);
        assert_eq!(admin_inbox[0].kind, NotificationKind::ContributionPending);
        assert_eq!(admin_inbox[0].related_id, Some(created.id));

        let member_inbox = get_notifications_for_user(&db, member.id, false).await?;
        assert_eq!(member_inbox.len(), 1);
        assert_eq!(member_inbox[0].kind, NotificationKind::ContributionSubmitted);

        Ok(())
    }

    #[tokio::test]
    async fn test_add_contribution_batches_violations() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(1000.0, 50.0).await?;
        membership::increment_saved_amount(&db, membership.id, 980.0).await?;

        // Below the minimum, above the remaining 20, and an unknown method
        let result = add_contribution(&db, membership.id, 30.0, "cheque", member.id).await;
        match result {
            Err(Error::Validation { errors }) => {
                assert_eq!(errors.len(), 3);
                assert!(errors[0].contains("Minimum contribution"));
                assert!(errors[1].contains("remaining target"));
                assert!(errors[2].contains("cheque"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let result = add_contribution(&db, membership.id, 60.0, "card", member.id).await;
        match result {
            Err(Error::Validation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("remaining target of 20.00"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_add_contribution_requires_ownership() -> Result<()> {
        let (db, _group, _member, membership) = setup_with_membership(1000.0, 50.0).await?;
        let stranger = create_test_member(&db, "stranger@example.com").await?;

        let result = add_contribution(&db, membership.id, 100.0, "cash", stranger.id).await;
        assert!(matches!(result, Err(Error::Authorization { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_add_contribution_missing_membership() -> Result<()> {
        let db = setup_test_db().await?;
        let result = add_contribution(&db, 404, 100.0, "cash", 1).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_contribution_increments_ledger_once() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(1000.0, 50.0).await?;
        let admin = create_test_admin(&db, "admin@example.com").await?;

        let pending = add_contribution(&db, membership.id, 250.0, "bank", member.id).await?;
        let confirmed = confirm_contribution(&db, pending.id, admin.id).await?;

        assert_eq!(confirmed.status, ContributionStatus::Confirmed);
        assert_eq!(confirmed.confirmed_by, Some(admin.id));
        assert!(confirmed.confirmed_at.is_some());

        let after_first = membership::require_membership(&db, membership.id).await?;
        assert_eq!(after_first.saved_amount, 250.0);

        let second = confirm_contribution(&db, pending.id, admin.id).await;
        assert!(matches!(second, Err(Error::Conflict { .. })));

        let after_second = membership::require_membership(&db, membership.id).await?;
        assert_eq!(after_second.saved_amount, 250.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_requires_active_admin() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(1000.0, 50.0).await?;
        let pending = add_contribution(&db, membership.id, 100.0, "cash", member.id).await?;

        let result = confirm_contribution(&db, pending.id, member.id).await;
        assert!(matches!(result, Err(Error::Authorization { .. })));

        let still_pending = get_contribution_by_id(&db, pending.id).await?.unwrap();
        assert_eq!(still_pending.status, ContributionStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_gateway_confirmation_matches_admin_path() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(100.0, 50.0).await?;

        let pending = add_contribution(&db, membership.id, 100.0, "card", member.id).await?;
        let confirmed = confirm_gateway_payment(&db, &pending.reference).await?;

        assert_eq!(confirmed.status, ContributionStatus::Confirmed);
        assert!(confirmed.confirmed_by.is_none());

        let updated = membership::require_membership(&db, membership.id).await?;
        assert_eq!(updated.saved_amount, 100.0);

        // Reaching the personal target through the gateway still raises the milestone
        let inbox = get_notifications_for_user(&db, member.id, false).await?;
        assert!(
            inbox
                .iter()
                .any(|n| n.kind == NotificationKind::IndividualTarget)
        );

        let missing = confirm_gateway_payment(&db, "STK-NOPE").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_contribution_is_terminal() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(1000.0, 50.0).await?;
        let admin = create_test_admin(&db, "admin@example.com").await?;

        let pending = add_contribution(&db, membership.id, 100.0, "cash", member.id).await?;
        let rejected = reject_contribution(
            &db,
            pending.id,
            admin.id,
            Some("  Payment never arrived ".to_string()),
        )
        .await?;

        assert_eq!(rejected.status, ContributionStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("Payment never arrived")
        );

        let confirm_after_reject = confirm_contribution(&db, pending.id, admin.id).await;
        assert!(matches!(confirm_after_reject, Err(Error::Conflict { .. })));

        let untouched = membership::require_membership(&db, membership.id).await?;
        assert_eq!(untouched.saved_amount, 0.0);

        assert!(get_pending_contributions(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_milestone_fan_out() -> Result<()> {
        let db = setup_test_db().await?;
        let group = create_test_group(&db, "Pair", 100.0, 2).await?;
        let admin = create_test_admin(&db, "admin@example.com").await?;

        let a = create_test_member(&db, "a@example.com").await?;
        let b = create_test_member(&db, "b@example.com").await?;
        let ma =
            membership::create_membership(&db, a.id, group.id, MembershipRole::Member, 100.0)
                .await?;
        let mb =
            membership::create_membership(&db, b.id, group.id, MembershipRole::Member, 100.0)
                .await?;
        membership::increment_saved_amount(&db, ma.id, 90.0).await?;
        membership::increment_saved_amount(&db, mb.id, 90.0).await?;

        let pending = insert_pending_contribution(&db, &ma, 20.0).await?;
        confirm_contribution(&db, pending.id, admin.id).await?;

        let a_inbox = get_notifications_for_user(&db, a.id, false).await?;
        let a_individual = a_inbox
            .iter()
            .filter(|n| n.kind == NotificationKind::IndividualTarget)
            .count();
        let a_group = a_inbox
            .iter()
            .filter(|n| n.kind == NotificationKind::GroupTarget)
            .count();
        assert_eq!(a_individual, 1);
        assert_eq!(a_group, 0);

        let b_inbox = get_notifications_for_user(&db, b.id, false).await?;
        assert_eq!(b_inbox.len(), 1);
        assert_eq!(b_inbox[0].kind, NotificationKind::GroupTarget);

        let admin_inbox = get_notifications_for_user(&db, admin.id, false).await?;
        assert!(
            admin_inbox
                .iter()
                .all(|n| n.kind != NotificationKind::GroupTarget)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_group_completion_notifies_contributor_below_own_target() -> Result<()> {
        let db = setup_test_db().await?;
        let group = create_test_group(&db, "Pair", 100.0, 2).await?;
        let admin = create_test_admin(&db, "admin@example.com").await?;

        let a = create_test_member(&db, "a@example.com").await?;
        let b = create_test_member(&db, "b@example.com").await?;
        let ma =
            membership::create_membership(&db, a.id, group.id, MembershipRole::Member, 100.0)
                .await?;
        let mb =
            membership::create_membership(&db, b.id, group.id, MembershipRole::Member, 100.0)
                .await?;

        // Two pending rows each fit B's remaining target, together they overshoot it
        let first = add_contribution(&db, mb.id, 100.0, "cash", b.id).await?;
        let second = add_contribution(&db, mb.id, 50.0, "cash", b.id).await?;
        confirm_contribution(&db, first.id, admin.id).await?;
        confirm_contribution(&db, second.id, admin.id).await?;

        let last = add_contribution(&db, ma.id, 50.0, "card", a.id).await?;
        confirm_contribution(&db, last.id, admin.id).await?;

        assert_eq!(membership::sum_group_saved(&db, group.id).await?, 200.0);

        let a_inbox = get_notifications_for_user(&db, a.id, false).await?;
        let a_group = a_inbox
            .iter()
            .filter(|n| n.kind == NotificationKind::GroupTarget)
            .count();
        let a_individual = a_inbox
            .iter()
            .filter(|n| n.kind == NotificationKind::IndividualTarget)
            .count();
        assert_eq!(a_group, 1);
        assert_eq!(a_individual, 0);

        let b_inbox = get_notifications_for_user(&db, b.id, false).await?;
        let b_group = b_inbox
            .iter()
            .filter(|n| n.kind == NotificationKind::GroupTarget)
            .count();
        assert_eq!(b_group, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_newest_first() -> Result<()> {
        let (db, _group, member, membership) = setup_with_membership(1000.0, 50.0).await?;

        let first = add_contribution(&db, membership.id, 100.0, "cash", member.id).await?;
        let second = add_contribution(&db, membership.id, 150.0, "card", member.id).await?;

        let history = get_contributions_for_membership(&db, membership.id).await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        let by_reference = get_contribution_by_reference(&db, &first.reference)
            .await?
            .unwrap();
        assert_eq!(by_reference.id, first.id);

        let pending = get_pending_contributions(&db).await?;
        assert_eq!(pending[0].id, first.id);
        Ok(())
    }
}
