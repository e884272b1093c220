//! User lifecycle and the admin approval workflow.
//!
//! Users register as `pending` together with the groups they would like to join. An admin
//! approval activates the account and creates memberships on a best-effort basis: groups
//! that are missing, full or already joined are skipped without failing the approval.
//! Deleting a user is refused while any of their loans is still outstanding.

use crate::{
    core::{group, membership, notification},
    entities::{
        Contribution, Loan, Membership, Notification, PreferredGroup, User, contribution, loan,
        loan::LoanStatus,
        membership as membership_entity,
        membership::MembershipRole,
        notification as notification_entity,
        notification::{NotificationKind, RelatedModel},
        preferred_group,
        user::{self, UserRole, UserStatus},
    },
    errors::{Error, Result, Violations},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};

/// Result of approving a user.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub user: user::Model,
    /// Memberships actually created, in the order the groups were considered
    pub memberships: Vec<membership_entity::Model>,
}

impl ApprovalOutcome {
    #[must_use]
    pub fn memberships_created(&self) -> usize {
        self.memberships.len()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn check_identity(name: &str, email: &str) -> Result<()> {
    let mut violations = Violations::new();
    violations.check(!name.is_empty(), "Name cannot be empty");
    violations.check(
        email.len() >= 3 && email.contains('@') && !email.starts_with('@') && !email.ends_with('@'),
        format!("'{email}' is not a valid email address"),
    );
    violations.into_result()
}

async fn insert_user<C>(
    db: &C,
    name: &str,
    email: &str,
    role: UserRole,
    status: UserStatus,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if get_user_by_email(db, email).await?.is_some() {
        return Err(Error::conflict(format!("Email {email} is already registered")));
    }

    let now = chrono::Utc::now();
    let user = user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        role: Set(role),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    user.insert(db)
        .await
        .map_err(|e| Error::from_insert(e, &format!("Email {email} is already registered")))
}

/// Registers a new member awaiting approval and records the groups they asked to join.
///
/// Every active admin is told that a registration is waiting.
pub async fn register_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    preferred_group_ids: &[i64],
) -> Result<user::Model> {
    let name = name.trim();
    let email = normalize_email(email);
    check_identity(name, &email)?;

    let txn = db.begin().await?;

    let created = insert_user(&txn, name, &email, UserRole::Member, UserStatus::Pending).await?;

    let mut group_ids = preferred_group_ids.to_vec();
    group_ids.sort_unstable();
    group_ids.dedup();
    for group_id in group_ids {
        preferred_group::ActiveModel {
            user_id: Set(created.id),
            group_id: Set(group_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    notification::notify_active_admins(
        &txn,
        &format!("{} ({}) registered and is awaiting approval.", created.name, created.email),
        NotificationKind::RegistrationPending,
        Some((RelatedModel::User, created.id)),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(user_id = created.id, "User registered");
    Ok(created)
}

/// Creates an active admin account.
pub async fn create_admin<C>(db: &C, name: &str, email: &str) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let name = name.trim();
    let email = normalize_email(email);
    check_identity(name, &email)?;

    let admin = insert_user(db, name, &email, UserRole::Admin, UserStatus::Active).await?;
    tracing::info!(user_id = admin.id, "Admin account created");
    Ok(admin)
}

/// Approves a pending user and enrolls them in groups.
///
/// The groups are `explicit_group_ids` when non-empty, otherwise the groups the user
/// picked at registration. A group is skipped silently if it does not exist, is full,
/// or already has the user as a member. Exactly one welcome notification reports how
/// many memberships were created.
pub async fn approve_user(
    db: &DatabaseConnection,
    user_id: i64,
    explicit_group_ids: &[i64],
) -> Result<ApprovalOutcome> {
    let txn = db.begin().await?;

    let user = User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;
    if user.status != UserStatus::Pending {
        return Err(Error::conflict(format!(
            "User {user_id} is not pending approval"
        )));
    }

    let mut active: user::ActiveModel = user.into();
    active.status = Set(UserStatus::Active);
    active.updated_at = Set(chrono::Utc::now());
    let user = active.update(&txn).await?;

    let group_ids: Vec<i64> = if explicit_group_ids.is_empty() {
        PreferredGroup::find()
            .filter(preferred_group::Column::UserId.eq(user_id))
            .order_by_asc(preferred_group::Column::Id)
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| p.group_id)
            .collect()
    } else {
        explicit_group_ids.to_vec()
    };

    let mut memberships = Vec::new();
    for group_id in group_ids {
        let Some(group) = group::get_group_by_id(&txn, group_id).await? else {
            tracing::debug!(user_id, group_id, "Skipping missing group during approval");
            continue;
        };

        match membership::create_membership(
            &txn,
            user_id,
            group_id,
            MembershipRole::Member,
            group.target_amount,
        )
        .await
        {
            Ok(created) => memberships.push(created),
            Err(e @ (Error::Capacity { .. } | Error::Conflict { .. } | Error::NotFound { .. })) => {
                tracing::debug!(user_id, group_id, reason = %e, "Skipping group during approval");
            }
            Err(e) => return Err(e),
        }
    }

    let count = memberships.len();
    let plural = if count == 1 { "" } else { "s" };
    notification::notify(
        &txn,
        user_id,
        format!(
            "Welcome, {}! Your account has been approved and you were added to {count} group{plural}.",
            user.name
        ),
        NotificationKind::Welcome,
        Some((RelatedModel::User, user_id)),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(user_id, memberships_created = count, "User approved");
    Ok(ApprovalOutcome { user, memberships })
}

/// Enrolls an active user in a group directly. Unlike approval, every failure is reported.
pub async fn assign_user_to_group(
    db: &DatabaseConnection,
    user_id: i64,
    group_id: i64,
) -> Result<membership_entity::Model> {
    let txn = db.begin().await?;

    let user = User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;
    if user.status != UserStatus::Active {
        return Err(Error::conflict(format!(
            "User {user_id} must be active to join a group"
        )));
    }
    let group = group::get_group_by_id(&txn, group_id)
        .await?
        .ok_or_else(|| Error::not_found("Group", group_id))?;

    let created = membership::create_membership(
        &txn,
        user_id,
        group_id,
        MembershipRole::Member,
        group.target_amount,
    )
    .await?;

    notification::notify(
        &txn,
        user_id,
        format!(
            "You were added to {}. Your savings target is {:.2}.",
            group.name, created.target_amount
        ),
        NotificationKind::MembershipAssigned,
        Some((RelatedModel::Membership, created.id)),
    )
    .await?;

    txn.commit().await?;
    Ok(created)
}

/// Explicit admin status change. Approval of pending users should go through [`approve_user`].
pub async fn update_user_status(
    db: &DatabaseConnection,
    user_id: i64,
    status: UserStatus,
) -> Result<user::Model> {
    let txn = db.begin().await?;

    let user = User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;
    if !user.status.can_transition_to(status) {
        return Err(Error::conflict(format!(
            "Cannot change user {user_id} from {:?} to {status:?}",
            user.status
        )));
    }

    let mut active: user::ActiveModel = user.into();
    active.status = Set(status);
    active.updated_at = Set(chrono::Utc::now());
    let updated = active.update(&txn).await?;

    let message = match status {
        UserStatus::Active => "Your account is now active.",
        UserStatus::Inactive => "Your account has been deactivated.",
        UserStatus::Pending => "Your account is pending review.",
    };
    notification::notify(
        &txn,
        user_id,
        message.to_string(),
        NotificationKind::AccountStatus,
        Some((RelatedModel::User, user_id)),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(user_id, ?status, "User status changed");
    Ok(updated)
}

/// Deletes a user with their memberships, ledger history and notifications.
///
/// Refused with `Conflict` while the user has an active or overdue loan.
pub async fn delete_user(db: &DatabaseConnection, user_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    let user = User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;

    let outstanding = Loan::find()
        .filter(loan::Column::UserId.eq(user_id))
        .filter(loan::Column::Status.is_in(LoanStatus::OUTSTANDING))
        .count(&txn)
        .await?;
    if outstanding > 0 {
        return Err(Error::conflict(format!(
            "User {user_id} still has {outstanding} outstanding loan(s)"
        )));
    }

    Loan::delete_many()
        .filter(loan::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    Contribution::delete_many()
        .filter(contribution::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    Membership::delete_many()
        .filter(membership_entity::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    PreferredGroup::delete_many()
        .filter(preferred_group::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    Notification::delete_many()
        .filter(notification_entity::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    user.delete(&txn).await?;

    txn.commit().await?;

    tracing::info!(user_id, "User deleted");
    Ok(())
}

pub async fn get_user_by_id(db: &DatabaseConnection, user_id: i64) -> Result<Option<user::Model>> {
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

pub async fn get_user_by_email<C>(db: &C, email: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Users waiting for approval, oldest registration first.
pub async fn get_pending_users(db: &DatabaseConnection) -> Result<Vec<user::Model>> {
    User::find()
        .filter(user::Column::Status.eq(UserStatus::Pending))
        .order_by_asc(user::Column::CreatedAt)
        .order_by_asc(user::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

pub async fn get_active_admins(db: &DatabaseConnection) -> Result<Vec<user::Model>> {
    User::find()
        .filter(user::Column::Role.eq(UserRole::Admin))
        .filter(user::Column::Status.eq(UserStatus::Active))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
