//! CLI command implementations

pub mod check;
pub mod login;
pub mod normalize;

pub use check::{CheckCommand, CheckReport};
pub use login::{LoginCommand, LoginReport};
pub use normalize::NormalizeCommand;
