//! Data models for the OrgDesk admin console.
//!
//! These models match the frontend TypeScript interfaces exactly for seamless interoperability.

mod datastore;
mod rule;
mod team;
mod user;

pub use datastore::*;
pub use rule::*;
pub use team::*;
pub use user::*;
