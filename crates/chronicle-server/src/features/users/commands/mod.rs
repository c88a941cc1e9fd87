pub mod create;
pub mod delete;
pub mod update;

pub use create::{CreateUserCommand, CreateUserError};
pub use delete::{SoftDeleteUserCommand, SoftDeleteUserError};
pub use update::{UpdateUserCommand, UpdateUserError};
