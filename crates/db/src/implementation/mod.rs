//! Concrete store backends.

pub mod redb;
