//! Custom assertions for engine tests
//!
//! Provides assertion helpers with better failure messages than bare
//! `assert_eq!` on entries and error enums.

use crate::core_collective::AugmentedView;
use crate::core_dit::{Dn, Entry, StoreError, StoreResult};
use crate::core_subentry::SubentryError;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Assert that a store write was refused by the subentry registry
pub fn assert_rejected<T: Debug>(result: StoreResult<T>) -> SubentryError {
    match assert_err(result) {
        StoreError::Rejected { source, .. } => source,
        other => panic!("Expected Rejected, got {:?}", other),
    }
}

/// Assert the values of one attribute type, in order, case-sensitively
pub fn assert_values(entry: &Entry, attr: &str, expected: &[&str]) {
    let actual = entry.values_of(attr);
    if actual != expected {
        panic!(
            "{} of {}: expected {:?}, got {:?}. Entry: {:?}",
            attr,
            entry.dn(),
            expected,
            actual,
            entry
        );
    }
}

/// Assert the contributing subentries of a view, in order
pub fn assert_contributors(view: &AugmentedView, expected: &[&str]) {
    let expected: Vec<Dn> = expected.iter().map(|s| Dn::parse(s).unwrap()).collect();
    if view.contributors() != expected.as_slice() {
        panic!("Expected contributors {:?}, got {:?}", expected, view.contributors());
    }
}
