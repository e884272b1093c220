/// Database configuration and connection management
pub mod database;

/// Group and admin seed configuration from config.toml
pub mod settings;
