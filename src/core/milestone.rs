//! Milestone decisions - Which notifications a confirmed contribution triggers.
//!
//! The decision functions are pure: they look at balances before and after a ledger
//! change and return the notifications to append. A milestone is announced when the
//! balance first meets its target, i.e. the post-change balance reaches the target and
//! the pre-change balance did not.

use crate::{
    entities::notification::{NotificationKind, RelatedModel},
    errors::Result,
};
use sea_orm::ConnectionTrait;

/// Personal target check.
#[must_use]
pub fn individual_target_reached(saved_amount: f64, target_amount: f64) -> bool {
    saved_amount >= target_amount
}

/// Group target check, where `group_target = target_amount × max_members`.
#[must_use]
pub fn group_target_reached(total_saved: f64, group_target: f64) -> bool {
    total_saved >= group_target
}

/// Snapshot of one ledger change, taken after the increment.
#[derive(Debug, Clone)]
pub struct MilestoneInput {
    /// User whose contribution was confirmed
    pub contributor_id: i64,
    pub membership_id: i64,
    pub group_id: i64,
    pub group_name: String,
    /// Confirmed amount that was just added
    pub delta: f64,
    /// Membership balance after the increment
    pub saved_amount: f64,
    pub target_amount: f64,
    /// Sum of every membership balance in the group after the increment
    pub group_total: f64,
    pub group_target: f64,
    /// User ids of the group's active members, contributor included or not
    pub active_member_ids: Vec<i64>,
}

/// A notification the notifier decided to send.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNotification {
    pub user_id: i64,
    pub message: String,
    pub kind: NotificationKind,
    pub related: Option<(RelatedModel, i64)>,
}

/// Decides the milestone notifications for one confirmed contribution.
///
/// The contributor gets the individual notice. The group notice goes to every active
/// member, except the contributor when they got the individual notice in the same plan.
#[must_use]
pub fn plan_milestones(input: &MilestoneInput) -> Vec<PlannedNotification> {
    let mut planned = Vec::new();

    let saved_before = input.saved_amount - input.delta;
    let individual_crossed = individual_target_reached(input.saved_amount, input.target_amount)
        && !individual_target_reached(saved_before, input.target_amount);
    if individual_crossed {
        planned.push(PlannedNotification {
            user_id: input.contributor_id,
            message: format!(
                "Congratulations! You reached your savings target of {:.2} in {}.",
                input.target_amount, input.group_name
            ),
            kind: NotificationKind::IndividualTarget,
            related: Some((RelatedModel::Membership, input.membership_id)),
        });
    }

    let total_before = input.group_total - input.delta;
    if group_target_reached(input.group_total, input.group_target)
        && !group_target_reached(total_before, input.group_target)
    {
        let mut recipients: Vec<i64> = input
            .active_member_ids
            .iter()
            .copied()
            .filter(|id| !(individual_crossed && *id == input.contributor_id))
            .collect();
        recipients.sort_unstable();
        recipients.dedup();

        planned.extend(recipients.into_iter().map(|user_id| PlannedNotification {
            user_id,
            message: format!(
                "{} reached its group savings target of {:.2}.",
                input.group_name, input.group_target
            ),
            kind: NotificationKind::GroupTarget,
            related: Some((RelatedModel::Group, input.group_id)),
        }));
    }

    planned
}

/// Appends planned notifications to the outbox.
pub async fn apply_milestones<C>(db: &C, planned: Vec<PlannedNotification>) -> Result<usize>
where
    C: ConnectionTrait,
{
    let count = planned.len();
    for plan in planned {
        crate::core::notification::notify(db, plan.user_id, plan.message, plan.kind, plan.related)
            .await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(saved: f64, delta: f64, group_total: f64) -> MilestoneInput {
        MilestoneInput {
            contributor_id: 1,
            membership_id: 10,
            group_id: 100,
            group_name: "Savers".to_string(),
            delta,
            saved_amount: saved,
            target_amount: 100.0,
            group_total,
            group_target: 200.0,
            active_member_ids: vec![1, 2],
        }
    }

    #[test]
    fn test_target_checks_are_inclusive() {
        assert!(individual_target_reached(100.0, 100.0));
        assert!(!individual_target_reached(99.99, 100.0));
        assert!(group_target_reached(200.0, 200.0));
        assert!(!group_target_reached(199.0, 200.0));
    }

    #[test]
    fn test_no_milestone_below_target() {
        assert!(plan_milestones(&input(80.0, 50.0, 170.0)).is_empty());
    }

    #[test]
    fn test_individual_only() {
        let planned = plan_milestones(&input(100.0, 50.0, 150.0));
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].user_id, 1);
        assert_eq!(planned[0].kind, NotificationKind::IndividualTarget);
    }

    #[test]
    fn test_group_completion_excludes_contributor() {
        let planned = plan_milestones(&input(110.0, 20.0, 200.0));
        assert_eq!(planned.len(), 2);

        let individual: Vec<_> = planned
            .iter()
            .filter(|p| p.kind == NotificationKind::IndividualTarget)
            .collect();
        assert_eq!(individual.len(), 1);
        assert_eq!(individual[0].user_id, 1);

        let group: Vec<_> = planned
            .iter()
            .filter(|p| p.kind == NotificationKind::GroupTarget)
            .collect();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].user_id, 2);
    }

    #[test]
    fn test_group_completion_reaches_contributor_below_own_target() {
        // Contributor stays at 50 of 100 while the group total crosses 200
        let planned = plan_milestones(&input(50.0, 50.0, 200.0));

        assert!(
            planned
                .iter()
                .all(|p| p.kind == NotificationKind::GroupTarget)
        );
        let mut recipients: Vec<i64> = planned.iter().map(|p| p.user_id).collect();
        recipients.sort_unstable();
        assert_eq!(recipients, vec![1, 2]);
    }

    #[test]
    fn test_milestone_already_met_is_not_repeated() {
        // Both thresholds were already met before this contribution
        let planned = plan_milestones(&input(150.0, 50.0, 260.0));
        assert!(planned.is_empty());
    }
}
