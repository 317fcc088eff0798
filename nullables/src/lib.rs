//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies of the storage engine (clock, physical backend) are
//! abstracted behind traits. This crate provides implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (including injected backend faults)
//! - Never touch the filesystem
//!
//! Usage: swap real implementations for nullables in tests, or select the
//! `memory` backend in configuration for throwaway databases.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullBackend;
