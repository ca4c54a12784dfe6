//! `fore-store`: durable post records with SQLite persistence.
//!
//! # Overview
//!
//! The engine talks to storage only through the [`PostStore`] trait. Two
//! mutations matter for correctness and both are conditional on the row's
//! current `status`:
//!
//! | Transition                 | Method                  | Guard                      |
//! |----------------------------|-------------------------|----------------------------|
//! | `scheduled → posting`      | [`PostStore::try_claim`]| `status = expected`        |
//! | `posting → posted/failed`  | [`PostStore::update`]   | [`PostPatch::expect_status`] |
//!
//! SQLite serialises writers, so a single conditional `UPDATE` is atomic even
//! across processes sharing the same database file.

pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqlitePostStore;
pub use store::{PostPatch, PostStore};
