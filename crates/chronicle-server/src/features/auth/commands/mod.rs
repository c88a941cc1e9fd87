pub mod login;
pub mod refresh;
pub mod signup;

pub use login::{LoginCommand, LoginError};
pub use refresh::{RefreshTokenCommand, RefreshTokenError};
pub use signup::{SignupCommand, SignupError};
