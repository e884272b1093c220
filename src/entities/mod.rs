//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod contribution;
pub mod group;
pub mod loan;
pub mod membership;
pub mod notification;
pub mod preferred_group;
pub mod user;

// Re-export specific types to avoid conflicts
pub use contribution::{
    Column as ContributionColumn, Entity as Contribution, Model as ContributionModel,
};
pub use group::{Column as GroupColumn, Entity as Group, Model as GroupModel};
pub use loan::{Column as LoanColumn, Entity as Loan, Model as LoanModel};
pub use membership::{
    Column as MembershipColumn, Entity as Membership, Model as MembershipModel,
};
pub use notification::{
    Column as NotificationColumn, Entity as Notification, Model as NotificationModel,
};
pub use preferred_group::{Entity as PreferredGroup, Model as PreferredGroupModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
