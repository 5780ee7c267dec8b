//! Helpers for tests in this crate and in downstream crates (enable the `test_utils` feature).
//!
//! * [`prepare_env`] creates throwaway, fully migrated SQLite databases.
//! * [`fakes`] provides scriptable in-process stand-ins for a payment gateway and the number provider.
pub mod fakes;
pub mod prepare_env;
