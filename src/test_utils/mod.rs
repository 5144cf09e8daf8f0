//! Shared fixtures for the unit tests: a sample shared object, a fault
//! injecting store wrapper and fast retry settings.
mod common;
mod flaky_store;

pub(crate) use common::*;
pub(crate) use flaky_store::*;
