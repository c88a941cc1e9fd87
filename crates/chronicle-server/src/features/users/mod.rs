//! User account management

pub mod commands;
pub mod queries;
pub mod types;

pub use types::{User, UserStatus, USERS_COLLECTION};
