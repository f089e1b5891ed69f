//! Test utilities and helpers for the subentry engine
//!
//! This module provides entry fixtures and assertion helpers shared by the
//! unit tests across the crate.

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
