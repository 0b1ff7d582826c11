//! Helpers for tests in this crate and in downstream crates. Enabled with the `test_utils` feature.
pub mod memory_db;
#[cfg(feature = "sqlite")]
pub mod prepare_env;

pub use memory_db::MemoryDatabase;
