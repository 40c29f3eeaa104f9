//! Staged-sync storage layer.
//!
//! The store is consumed strictly through its transactional contract:
//! named tables, point reads and writes, ordered cursor scans and atomic
//! commits. The contract is expressed by the [`Database`], [`DbTx`] /
//! [`DbTxMut`] and cursor traits; the concrete backend lives in
//! [`implementation::redb`].
//!
//! The crate also owns the pieces that sit directly on top of the store:
//! the named [`tables`], the per-stage progress cursors in [`stages`] and
//! the history [`bitmap`] chunker.

#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]

pub mod bitmap;
pub mod cursor;
mod database;
mod error;
pub mod implementation;
pub mod stages;
pub mod table;
pub mod tables;
mod transaction;

pub use database::Database;
pub use error::DatabaseError;
pub use implementation::redb::DatabaseEnv;
pub use transaction::{DbTx, DbTxMut};
