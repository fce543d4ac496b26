//! Mock filesystem and netlink implementations for testing.
//!
//! This module provides `MockFs`, `MockLinks` and pre-built scenarios for
//! testing collectors without requiring SR-IOV hardware or Linux sysfs access.

mod filesystem;
mod links;
mod scenarios;

pub use filesystem::MockFs;
pub use links::MockLinks;
