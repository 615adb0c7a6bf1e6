//! Test support utilities
//!
//! In-crate mocks so unit and integration tests can drive the full
//! publish pipeline without a broker or a filesystem.

pub mod mocks;
