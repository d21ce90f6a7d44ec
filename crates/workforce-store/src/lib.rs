//! Persistence for workforce activity records
//!
//! This crate provides:
//! - An append-only SQLite activity log implementing `ActivitySink`
//! - Reporting queries over recorded activity

pub mod sqlite;

pub use sqlite::SqliteActivityLog;
