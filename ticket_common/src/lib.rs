mod helpers;
pub mod money;
mod secret;

pub use helpers::{parse_boolean_flag, parse_env_or_default};
pub use money::MoneyError;
pub use secret::Secret;
