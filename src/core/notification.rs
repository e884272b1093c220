//! Notification outbox - Append-only messages for users.
//!
//! Workflows append notifications on the same connection (usually the same database
//! transaction) as the ledger change that caused them, so a committed change always has
//! its notifications and a rolled-back change has none. Reading and marking notifications
//! is independent of the ledger.

use crate::{
    entities::{
        Notification, User, notification,
        notification::{NotificationKind, RelatedModel},
        user::{self, UserRole, UserStatus},
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};

/// Appends one notification for `user_id`.
pub async fn notify<C>(
    db: &C,
    user_id: i64,
    message: String,
    kind: NotificationKind,
    related: Option<(RelatedModel, i64)>,
) -> Result<notification::Model>
where
    C: ConnectionTrait,
{
    let model = notification::ActiveModel {
        user_id: Set(user_id),
        message: Set(message),
        kind: Set(kind),
        read: Set(false),
        related_id: Set(related.map(|(_, id)| id)),
        related_model: Set(related.map(|(model, _)| model)),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    model.insert(db).await.map_err(Into::into)
}

/// Appends the same notification for every active admin. Returns how many were written.
pub async fn notify_active_admins<C>(
    db: &C,
    message: &str,
    kind: NotificationKind,
    related: Option<(RelatedModel, i64)>,
) -> Result<usize>
where
    C: ConnectionTrait,
{
    let admins = User::find()
        .filter(user::Column::Role.eq(UserRole::Admin))
        .filter(user::Column::Status.eq(UserStatus::Active))
        .all(db)
        .await?;

    for admin in &admins {
        notify(db, admin.id, message.to_string(), kind, related).await?;
    }

    Ok(admins.len())
}

/// Retrieves a user's notifications, newest first.
pub async fn get_notifications_for_user(
    db: &DatabaseConnection,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<notification::Model>> {
    let mut query = Notification::find().filter(notification::Column::UserId.eq(user_id));
    if unread_only {
        query = query.filter(notification::Column::Read.eq(false));
    }

    query
        .order_by_desc(notification::Column::CreatedAt)
        .order_by_desc(notification::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

pub async fn unread_count(db: &DatabaseConnection, user_id: i64) -> Result<u64> {
    Notification::find()
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::Read.eq(false))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Marks one notification as read. Only the recipient may do this.
pub async fn mark_as_read(
    db: &DatabaseConnection,
    notification_id: i64,
    user_id: i64,
) -> Result<notification::Model> {
    let notification = Notification::find_by_id(notification_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Notification", notification_id))?;

    if notification.user_id != user_id {
        return Err(Error::unauthorized(
            "Notification belongs to another user",
        ));
    }

    if notification.read {
        return Ok(notification);
    }

    let mut active: notification::ActiveModel = notification.into();
    active.read = Set(true);
    active.update(db).await.map_err(Into::into)
}

/// Marks every unread notification of a user as read, returning how many changed.
pub async fn mark_all_as_read(db: &DatabaseConnection, user_id: i64) -> Result<u64> {
    let result = Notification::update_many()
        .col_expr(notification::Column::Read, Expr::value(true))
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::Read.eq(false))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_notify_and_list_newest_first() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "sipho@example.com").await?;

        notify(
            &db,
            member.id,
            "first".to_string(),
            NotificationKind::Welcome,
            None,
        )
        .await?;
        let second = notify(
            &db,
            member.id,
            "second".to_string(),
            NotificationKind::LoanIssued,
            Some((RelatedModel::Loan, 7)),
        )
        .await?;

        assert_eq!(second.related_id, Some(7));
        assert_eq!(second.related_model, Some(RelatedModel::Loan));
        assert!(!second.read);

        let all = get_notifications_for_user(&db, member.id, false).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "second");
        assert_eq!(all[1].message, "first");

        Ok(())
    }

    #[tokio::test]
    async fn test_notify_active_admins_skips_inactive() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = create_test_admin(&db, "admin@example.com").await?;
        let retired = create_test_admin(&db, "retired@example.com").await?;
        crate::core::user::update_user_status(&db, retired.id, UserStatus::Inactive).await?;
        create_test_member(&db, "member@example.com").await?;

        let sent = notify_active_admins(
            &db,
            "Something needs review",
            NotificationKind::ContributionPending,
            None,
        )
        .await?;
        assert_eq!(sent, 1);

        assert_eq!(unread_count(&db, admin.id).await?, 1);
        let retired_pending = get_notifications_for_user(&db, retired.id, true).await?;
        assert!(
            retired_pending
                .iter()
                .all(|n| n.kind != NotificationKind::ContributionPending)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_as_read_and_unread_count() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "lerato@example.com").await?;
        let other = create_test_member(&db, "other@example.com").await?;

        let first = notify(
            &db,
            member.id,
            "one".to_string(),
            NotificationKind::Welcome,
            None,
        )
        .await?;
        notify(
            &db,
            member.id,
            "two".to_string(),
            NotificationKind::Welcome,
            None,
        )
        .await?;
        assert_eq!(unread_count(&db, member.id).await?, 2);

        let result = mark_as_read(&db, first.id, other.id).await;
        assert!(matches!(result, Err(Error::Authorization { .. })));

        let marked = mark_as_read(&db, first.id, member.id).await?;
        assert!(marked.read);
        assert_eq!(unread_count(&db, member.id).await?, 1);

        let unread = get_notifications_for_user(&db, member.id, true).await?;
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].message, "two");

        assert_eq!(mark_all_as_read(&db, member.id).await?, 1);
        assert_eq!(unread_count(&db, member.id).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_as_read_not_found() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<notification::Model>::new()])
            .into_connection();

        let result = mark_as_read(&db, 999, 1).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));

        Ok(())
    }
}
