//! Startup seeding of groups and admin accounts from `config.toml`.

use crate::{
    config::settings::{Config, GroupConfig},
    core::{group, user},
    errors::Result,
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{debug, info};

/// Counts of rows created by [`seed_from_config`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub groups_created: usize,
    pub admins_created: usize,
}

impl From<&GroupConfig> for group::NewGroup {
    fn from(cfg: &GroupConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            description: cfg.description.clone(),
            target_amount: cfg.target_amount,
            max_members: cfg.max_members,
            interest_rate: cfg.interest_rate,
            overdue_interest_rate: cfg.overdue_interest_rate,
            loan_percentage_limit: cfg.loan_percentage_limit,
            loan_repayment_days: cfg.loan_repayment_days,
            cycle: cfg.cycle,
        }
    }
}

/// Creates configured groups and admins that do not exist yet.
///
/// Groups are matched by name and admins by email; existing rows are left untouched.
/// Everything runs in one transaction, so an invalid entry seeds nothing.
pub async fn seed_from_config(db: &DatabaseConnection, config: &Config) -> Result<SeedReport> {
    info!(
        "Seeding from config: {} group(s), {} admin(s)",
        config.groups.len(),
        config.admins.len()
    );
    let txn = db.begin().await?;
    let mut report = SeedReport::default();

    for cfg in &config.groups {
        if group::get_group_by_name(&txn, &cfg.name).await?.is_some() {
            debug!("Group '{}' already exists. Skipping.", cfg.name);
            continue;
        }
        group::create_group(&txn, cfg.into()).await?;
        report.groups_created += 1;
    }

    for cfg in &config.admins {
        if user::get_user_by_email(&txn, &cfg.email).await?.is_some() {
            debug!("User '{}' already exists. Skipping.", cfg.email);
            continue;
        }
        user::create_admin(&txn, &cfg.name, &cfg.email).await?;
        report.admins_created += 1;
    }

    txn.commit().await?;
    info!(
        groups_created = report.groups_created,
        admins_created = report.admins_created,
        "Finished seeding"
    );
    Ok(report)
}
