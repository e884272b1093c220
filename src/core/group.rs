//! Group administration - Creating savings groups and tuning their parameters.
//!
//! Group identity never changes; business parameters can be updated by admins.
//! Memberships keep the target they were created with.

use crate::{
    core::membership,
    entities::{
        Group, group,
        group::{
            ContributionCycle, DEFAULT_INTEREST_RATE, DEFAULT_LOAN_PERCENTAGE_LIMIT,
            DEFAULT_LOAN_REPAYMENT_DAYS, DEFAULT_OVERDUE_INTEREST_RATE, GroupStatus,
        },
        membership::MembershipStatus,
    },
    errors::{Error, Result, Violations},
};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Parameters for a new group. Use [`NewGroup::new`] for the standard loan terms.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub target_amount: f64,
    pub max_members: i32,
    pub interest_rate: f64,
    pub overdue_interest_rate: f64,
    pub loan_percentage_limit: f64,
    pub loan_repayment_days: i32,
    pub cycle: ContributionCycle,
}

impl NewGroup {
    #[must_use]
    pub fn new(name: impl Into<String>, target_amount: f64, max_members: i32) -> Self {
        Self {
            name: name.into(),
            description: None,
            target_amount,
            max_members,
            interest_rate: DEFAULT_INTEREST_RATE,
            overdue_interest_rate: DEFAULT_OVERDUE_INTEREST_RATE,
            loan_percentage_limit: DEFAULT_LOAN_PERCENTAGE_LIMIT,
            loan_repayment_days: DEFAULT_LOAN_REPAYMENT_DAYS,
            cycle: ContributionCycle::Monthly,
        }
    }
}

/// Partial update of a group's business parameters. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub target_amount: Option<f64>,
    pub max_members: Option<i32>,
    pub interest_rate: Option<f64>,
    pub overdue_interest_rate: Option<f64>,
    pub loan_percentage_limit: Option<f64>,
    pub loan_repayment_days: Option<i32>,
    pub cycle: Option<ContributionCycle>,
    pub status: Option<GroupStatus>,
}

fn is_rate(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn check_parameters(
    violations: &mut Violations,
    target_amount: f64,
    max_members: i32,
    interest_rate: f64,
    overdue_interest_rate: f64,
    loan_percentage_limit: f64,
    loan_repayment_days: i32,
) {
    violations.check(
        target_amount.is_finite() && target_amount > 0.0,
        "Target amount must be greater than zero",
    );
    violations.check(max_members >= 1, "A group needs room for at least one member");
    violations.check(is_rate(interest_rate), "Interest rate cannot be negative");
    violations.check(
        is_rate(overdue_interest_rate),
        "Overdue interest rate cannot be negative",
    );
    violations.check(
        loan_percentage_limit.is_finite() && (0.0..=100.0).contains(&loan_percentage_limit),
        "Loan percentage limit must be between 0 and 100",
    );
    violations.check(
        loan_repayment_days >= 1,
        "Loan repayment period must be at least one day",
    );
}

/// Creates a new active group after validating every parameter.
pub async fn create_group<C>(db: &C, new_group: NewGroup) -> Result<group::Model>
where
    C: ConnectionTrait,
{
    let name = new_group.name.trim().to_string();
    let mut violations = Violations::new();
    violations.check(!name.is_empty(), "Group name cannot be empty");
    check_parameters(
        &mut violations,
        new_group.target_amount,
        new_group.max_members,
        new_group.interest_rate,
        new_group.overdue_interest_rate,
        new_group.loan_percentage_limit,
        new_group.loan_repayment_days,
    );
    violations.into_result()?;

    let now = chrono::Utc::now();
    let group = group::ActiveModel {
        name: Set(name),
        description: Set(new_group.description),
        target_amount: Set(new_group.target_amount),
        max_members: Set(new_group.max_members),
        interest_rate: Set(new_group.interest_rate),
        overdue_interest_rate: Set(new_group.overdue_interest_rate),
        loan_percentage_limit: Set(new_group.loan_percentage_limit),
        loan_repayment_days: Set(new_group.loan_repayment_days),
        cycle: Set(new_group.cycle),
        status: Set(GroupStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let created = group.insert(db).await?;
    tracing::info!(group_id = created.id, name = %created.name, "Group created");
    Ok(created)
}

/// Applies a partial update to a group's business parameters.
pub async fn update_group(
    db: &DatabaseConnection,
    group_id: i64,
    update: GroupUpdate,
) -> Result<group::Model> {
    let current = get_group_by_id(db, group_id)
        .await?
        .ok_or_else(|| Error::not_found("Group", group_id))?;

    let target_amount = update.target_amount.unwrap_or(current.target_amount);
    let max_members = update.max_members.unwrap_or(current.max_members);
    let interest_rate = update.interest_rate.unwrap_or(current.interest_rate);
    let overdue_interest_rate = update
        .overdue_interest_rate
        .unwrap_or(current.overdue_interest_rate);
    let loan_percentage_limit = update
        .loan_percentage_limit
        .unwrap_or(current.loan_percentage_limit);
    let loan_repayment_days = update
        .loan_repayment_days
        .unwrap_or(current.loan_repayment_days);

    let mut violations = Violations::new();
    check_parameters(
        &mut violations,
        target_amount,
        max_members,
        interest_rate,
        overdue_interest_rate,
        loan_percentage_limit,
        loan_repayment_days,
    );
    if max_members < current.max_members {
        let active_members = membership::count_active_members(db, group_id).await?;
        violations.check(
            u64::try_from(max_members).is_ok_and(|max| max >= active_members),
            format!("Group already has {active_members} active members"),
        );
    }
    violations.into_result()?;

    let cycle = update.cycle.unwrap_or(current.cycle);
    let status = update.status.unwrap_or(current.status);
    let description = update
        .description
        .unwrap_or_else(|| current.description.clone());

    let mut active: group::ActiveModel = current.into();
    active.description = Set(description);
    active.target_amount = Set(target_amount);
    active.max_members = Set(max_members);
    active.interest_rate = Set(interest_rate);
    active.overdue_interest_rate = Set(overdue_interest_rate);
    active.loan_percentage_limit = Set(loan_percentage_limit);
    active.loan_repayment_days = Set(loan_repayment_days);
    active.cycle = Set(cycle);
    active.status = Set(status);
    active.updated_at = Set(chrono::Utc::now());

    let updated = active.update(db).await?;
    tracing::info!(group_id, "Group parameters updated");
    Ok(updated)
}

pub async fn get_group_by_id<C>(db: &C, group_id: i64) -> Result<Option<group::Model>>
where
    C: ConnectionTrait,
{
    Group::find_by_id(group_id).one(db).await.map_err(Into::into)
}

pub async fn get_group_by_name<C>(db: &C, name: &str) -> Result<Option<group::Model>>
where
    C: ConnectionTrait,
{
    Group::find()
        .filter(group::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All groups ordered alphabetically by name.
pub async fn get_all_groups(db: &DatabaseConnection) -> Result<Vec<group::Model>> {
    Group::find()
        .order_by_asc(group::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Collective savings position of a group.
#[derive(Debug, Clone)]
pub struct GroupSavingsSummary {
    pub group: group::Model,
    /// Active memberships
    pub member_count: usize,
    pub total_saved: f64,
    pub group_target: f64,
    /// Progress as a percentage of the group target (0-100)
    pub progress_percent: f64,
    pub target_reached: bool,
}

/// Calculates progress toward a target as a percentage, clamped to 0-100.
#[must_use]
pub fn calculate_progress(saved: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }

    (saved / target * 100.0).clamp(0.0, 100.0)
}

pub async fn group_savings_summary(
    db: &DatabaseConnection,
    group_id: i64,
) -> Result<GroupSavingsSummary> {
    let group = get_group_by_id(db, group_id)
        .await?
        .ok_or_else(|| Error::not_found("Group", group_id))?;

    let memberships = membership::get_memberships_for_group(db, group_id).await?;
    let total_saved: f64 = memberships.iter().map(|m| m.saved_amount).sum();
    let member_count = memberships
        .iter()
        .filter(|m| m.status == MembershipStatus::Active)
        .count();
    let group_target = group.group_target();

    Ok(GroupSavingsSummary {
        member_count,
        total_saved,
        group_target,
        progress_percent: calculate_progress(total_saved, group_target),
        target_reached: crate::core::milestone::group_target_reached(total_saved, group_target),
        group,
    })
}
