//! Ledger and lifecycle operations, independent of any transport.

pub mod contribution;
pub mod group;
pub mod loan;
pub mod membership;
pub mod milestone;
pub mod notification;
pub mod seed;
pub mod user;
