//! Shared helpers for the log processor integration tests.

pub mod fixtures;
pub mod mocks;
pub mod setup;
