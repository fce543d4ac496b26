//! sriovstat-core: SR-IOV virtual function statistics collection.
//!
//! Provides:
//! - `collector`: PCI topology discovery, stats reader selection, per-VF samples
//! - `collector::mock`: in-memory filesystem and netlink fixtures for tests
//!
//! With `exposition` feature (default):
//! - `exposition`: Prometheus collector adapter over `collector::SriovCollector`

pub mod collector;

#[cfg(feature = "exposition")]
pub mod exposition;

/// Crate version, reported by the daemon at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
