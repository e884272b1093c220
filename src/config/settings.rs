//! Seed configuration loading from config.toml
//!
//! `config.toml` declares the savings groups and admin accounts that must exist
//! when the ledger starts. Loan parameters that are left out fall back to the
//! standard group defaults.

use crate::entities::group::{
    ContributionCycle, DEFAULT_INTEREST_RATE, DEFAULT_LOAN_PERCENTAGE_LIMIT,
    DEFAULT_LOAN_REPAYMENT_DAYS, DEFAULT_OVERDUE_INTEREST_RATE,
};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Groups to create if no group with the same name exists
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Admin accounts to create if no user with the same email exists
    #[serde(default)]
    pub admins: Vec<AdminConfig>,
}

/// Configuration for a single savings group
#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Per-member savings target
    pub target_amount: f64,
    pub max_members: i32,
    #[serde(default = "default_interest_rate")]
    pub interest_rate: f64,
    #[serde(default = "default_overdue_interest_rate")]
    pub overdue_interest_rate: f64,
    #[serde(default = "default_loan_percentage_limit")]
    pub loan_percentage_limit: f64,
    #[serde(default = "default_loan_repayment_days")]
    pub loan_repayment_days: i32,
    #[serde(default = "default_cycle")]
    pub cycle: ContributionCycle,
}

/// Configuration for a seeded admin account
#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub name: String,
    pub email: String,
}

const fn default_interest_rate() -> f64 {
    DEFAULT_INTEREST_RATE
}

const fn default_overdue_interest_rate() -> f64 {
    DEFAULT_OVERDUE_INTEREST_RATE
}

const fn default_loan_percentage_limit() -> f64 {
    DEFAULT_LOAN_PERCENTAGE_LIMIT
}

const fn default_loan_repayment_days() -> i32 {
    DEFAULT_LOAN_REPAYMENT_DAYS
}

const fn default_cycle() -> ContributionCycle {
    ContributionCycle::Monthly
}

/// Loads seed configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads seed configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<Config> {
    load_config("config.toml")
}
