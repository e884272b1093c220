//! Loan engine - Sizes, issues and settles loans against membership savings.
//!
//! A member may have at most `loan_percentage_limit` percent of their savings outstanding.
//! Loans carry the group's standard interest rate at issuance. A loan settled after its
//! due date is charged the group's overdue rate as a flat percentage of the principal,
//! regardless of how many days late it is.
//!
//! Overdue is never stored: readers present an active loan past its due date as overdue
//! through [`LoanStatus::effective_at`].

use crate::{
    core::{membership, notification},
    entities::{
        Group, Loan, Membership, group, loan,
        loan::LoanStatus,
        membership as membership_entity,
        notification::{NotificationKind, RelatedModel},
    },
    errors::{Error, Result, Violations},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};

/// Smallest principal that can be borrowed.
pub const MIN_LOAN_AMOUNT: f64 = 100.0;

/// How many times a loan request is retried after losing a race on the membership version.
const MAX_REQUEST_ATTEMPTS: u32 = 3;

/// Rounds a money amount to cents.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Interest and total owed for a principal at a given rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    pub interest: f64,
    pub total_repayable: f64,
}

/// Terms at `rate` percent of the principal.
#[must_use]
pub fn calculate_terms(amount: f64, rate: f64) -> LoanTerms {
    let interest = round2(amount * rate / 100.0);
    LoanTerms {
        interest,
        total_repayable: round2(amount + interest),
    }
}

/// Largest total principal a member may have outstanding.
#[must_use]
pub fn max_borrowable(saved_amount: f64, loan_percentage_limit: f64) -> f64 {
    (saved_amount * loan_percentage_limit / 100.0).floor()
}

/// Borrowing capacity of one membership.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanEligibility {
    pub membership_id: i64,
    pub saved_amount: f64,
    pub loan_percentage_limit: f64,
    pub max_borrowable: f64,
    /// Principal of active and overdue loans
    pub outstanding: f64,
    /// What can still be borrowed, never negative
    pub remaining: f64,
}

async fn compute_eligibility<C>(
    db: &C,
    membership: &membership_entity::Model,
    group: &group::Model,
) -> Result<LoanEligibility>
where
    C: ConnectionTrait,
{
    let max = max_borrowable(membership.saved_amount, group.loan_percentage_limit);
    let outstanding = membership::find_outstanding_loan_principal_sum(db, membership.id).await?;

    Ok(LoanEligibility {
        membership_id: membership.id,
        saved_amount: membership.saved_amount,
        loan_percentage_limit: group.loan_percentage_limit,
        max_borrowable: max,
        outstanding,
        remaining: (max - outstanding).max(0.0),
    })
}

async fn require_group<C>(db: &C, group_id: i64) -> Result<group::Model>
where
    C: ConnectionTrait,
{
    Group::find_by_id(group_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Group", group_id))
}

/// Current borrowing capacity of a membership.
pub async fn loan_eligibility(
    db: &DatabaseConnection,
    membership_id: i64,
) -> Result<LoanEligibility> {
    let membership = membership::require_membership(db, membership_id).await?;
    let group = require_group(db, membership.group_id).await?;
    compute_eligibility(db, &membership, &group).await
}

/// Issues a loan against the requester's own membership.
///
/// The eligibility read, the insert and a compare-and-swap on the membership `version`
/// run in one transaction. If another loan was issued for the same membership in the
/// meantime the swap matches no row, the transaction is rolled back and the request is
/// evaluated again against the new outstanding total.
pub async fn request_loan(
    db: &DatabaseConnection,
    membership_id: i64,
    amount: f64,
    purpose: &str,
    requester_id: i64,
) -> Result<loan::Model> {
    retry_on_version_conflict(membership_id, move || {
        try_request_loan(db, membership_id, amount, purpose, requester_id)
    })
    .await
}

/// Runs `attempt` until it issues a loan, at most [`MAX_REQUEST_ATTEMPTS`] times.
/// An attempt returning `Ok(None)` lost the version race and is retried.
async fn retry_on_version_conflict<F, Fut>(membership_id: i64, mut attempt: F) -> Result<loan::Model>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<loan::Model>>>,
{
    for n in 1..=MAX_REQUEST_ATTEMPTS {
        if let Some(loan) = attempt().await? {
            return Ok(loan);
        }
        tracing::warn!(
            membership_id,
            attempt = n,
            "Membership changed while issuing loan, retrying"
        );
    }

    Err(Error::conflict(
        "Membership is being updated concurrently, please retry the loan request",
    ))
}

/// One attempt of [`request_loan`]. `Ok(None)` means the version check lost a race.
async fn try_request_loan(
    db: &DatabaseConnection,
    membership_id: i64,
    amount: f64,
    purpose: &str,
    requester_id: i64,
) -> Result<Option<loan::Model>> {
    let txn = db.begin().await?;

    let membership = membership::require_membership(&txn, membership_id).await?;
    if membership.user_id != requester_id {
        return Err(Error::unauthorized(
            "You can only borrow against your own membership",
        ));
    }
    let group = require_group(&txn, membership.group_id).await?;
    let eligibility = compute_eligibility(&txn, &membership, &group).await?;

    let purpose = purpose.trim();
    let mut violations = Violations::new();
    violations.check(amount.is_finite(), "Amount must be a valid number");
    violations.check(
        amount >= MIN_LOAN_AMOUNT,
        format!("Minimum loan amount is {MIN_LOAN_AMOUNT:.2}"),
    );
    violations.check(
        amount <= eligibility.remaining,
        format!(
            "Amount exceeds the {:.2} still available to borrow ({:.0}% of savings {:.2}, {:.2} outstanding)",
            eligibility.remaining,
            eligibility.loan_percentage_limit,
            eligibility.saved_amount,
            eligibility.outstanding
        ),
    );
    violations.check(!purpose.is_empty(), "Loan purpose is required");
    violations.into_result()?;

    let Some(created) = issue_against_snapshot(&txn, &membership, &group, amount, purpose).await?
    else {
        txn.rollback().await?;
        return Ok(None);
    };

    notification::notify(
        &txn,
        created.user_id,
        format!(
            "Your loan of {:.2} was approved. Total repayable: {:.2}, due {}.",
            created.amount,
            created.total_repayable,
            created.due_date.format("%Y-%m-%d")
        ),
        NotificationKind::LoanIssued,
        Some((RelatedModel::Loan, created.id)),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(
        loan_id = created.id,
        membership_id,
        amount,
        total_repayable = created.total_repayable,
        "Loan issued"
    );
    Ok(Some(created))
}

/// Inserts the loan and bumps the membership `version` from the value in `membership`.
///
/// Returns `None` when the version no longer matches. The caller must then roll back,
/// which also discards the inserted row.
async fn issue_against_snapshot<C>(
    db: &C,
    membership: &membership_entity::Model,
    group: &group::Model,
    amount: f64,
    purpose: &str,
) -> Result<Option<loan::Model>>
where
    C: ConnectionTrait,
{
    let terms = calculate_terms(amount, group.interest_rate);
    let now = Utc::now();
    let due_date = now + Duration::days(i64::from(group.loan_repayment_days));

    let loan = loan::ActiveModel {
        user_id: Set(membership.user_id),
        group_id: Set(membership.group_id),
        membership_id: Set(membership.id),
        amount: Set(amount),
        interest_rate: Set(group.interest_rate),
        interest: Set(terms.interest),
        total_repayable: Set(terms.total_repayable),
        status: Set(LoanStatus::Active),
        purpose: Set(purpose.to_string()),
        due_date: Set(due_date),
        repaid_date: Set(None),
        created_at: Set(now),
        ..Default::default()
    };
    let created = loan.insert(db).await?;

    let swapped = Membership::update_many()
        .col_expr(
            membership_entity::Column::Version,
            Expr::col(membership_entity::Column::Version).add(1),
        )
        .filter(membership_entity::Column::Id.eq(membership.id))
        .filter(membership_entity::Column::Version.eq(membership.version))
        .exec(db)
        .await?;

    Ok((swapped.rows_affected > 0).then_some(created))
}

/// Settles a loan at `now`.
///
/// Repaid on or before the due date, the loan keeps its issued terms. Repaid after it,
/// the interest is replaced by the group's flat overdue rate on the principal.
pub async fn repay_loan(
    db: &DatabaseConnection,
    loan_id: i64,
    requester_id: i64,
    now: DateTime<Utc>,
) -> Result<loan::Model> {
    let txn = db.begin().await?;

    let loan = Loan::find_by_id(loan_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Loan", loan_id))?;
    if loan.user_id != requester_id {
        return Err(Error::unauthorized("You can only repay your own loans"));
    }
    let next = loan.status.settle()?;

    let overdue = now > loan.due_date;
    let terms = if overdue {
        let group = require_group(&txn, loan.group_id).await?;
        calculate_terms(loan.amount, group.overdue_interest_rate)
    } else {
        LoanTerms {
            interest: loan.interest,
            total_repayable: loan.total_repayable,
        }
    };

    let result = Loan::update_many()
        .col_expr(loan::Column::Status, Expr::value(next))
        .col_expr(loan::Column::Interest, Expr::value(terms.interest))
        .col_expr(
            loan::Column::TotalRepayable,
            Expr::value(terms.total_repayable),
        )
        .col_expr(loan::Column::RepaidDate, Expr::value(Some(now)))
        .filter(loan::Column::Id.eq(loan.id))
        .filter(loan::Column::Status.is_in(LoanStatus::OUTSTANDING))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::conflict("Loan is already repaid"));
    }

    let message = if overdue {
        format!(
            "Your overdue loan of {:.2} was repaid. Amount paid: {:.2} including {:.2} penalty interest.",
            loan.amount, terms.total_repayable, terms.interest
        )
    } else {
        format!(
            "Your loan of {:.2} was repaid. Amount paid: {:.2}.",
            loan.amount, terms.total_repayable
        )
    };
    notification::notify(
        &txn,
        loan.user_id,
        message,
        NotificationKind::LoanRepaid,
        Some((RelatedModel::Loan, loan.id)),
    )
    .await?;

    let repaid = Loan::find_by_id(loan.id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Loan", loan.id))?;
    txn.commit().await?;

    tracing::info!(
        loan_id,
        overdue,
        total_repayable = repaid.total_repayable,
        "Loan repaid"
    );
    Ok(repaid)
}

/// Loans of a membership, newest first, with their status as presented at `now`.
pub async fn list_loans(
    db: &DatabaseConnection,
    membership_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<loan::Model>> {
    let loans = Loan::find()
        .filter(loan::Column::MembershipId.eq(membership_id))
        .order_by_desc(loan::Column::CreatedAt)
        .order_by_desc(loan::Column::Id)
        .all(db)
        .await?;

    Ok(loans.into_iter().map(|l| l.presented_at(now)).collect())
}

/// Loans of a user across all groups, newest first, as presented at `now`.
pub async fn get_loans_for_user(
    db: &DatabaseConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<loan::Model>> {
    let loans = Loan::find()
        .filter(loan::Column::UserId.eq(user_id))
        .order_by_desc(loan::Column::CreatedAt)
        .order_by_desc(loan::Column::Id)
        .all(db)
        .await?;

    Ok(loans.into_iter().map(|l| l.presented_at(now)).collect())
}

/// A single loan as presented at `now`.
pub async fn get_loan_by_id(
    db: &DatabaseConnection,
    loan_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<loan::Model>> {
    let loan = Loan::find_by_id(loan_id).one(db).await?;
    Ok(loan.map(|l| l.presented_at(now)))
}
