//! SQLite backends for Accolade.
//!
//! [`SqliteStore`] is the relational store (identity, achievement references,
//! status history, point ledger). [`SqliteDocumentStore`] holds achievement
//! details as JSON documents. The two use separate connections, normally to
//! separate files, and never share a transaction.
//!
//! Both wrap [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime.

mod documents;
mod encode;
mod schema;
mod store;

pub mod error;

pub use documents::SqliteDocumentStore;
pub use error::{Error, Result};
pub use store::SqliteStore;


#[cfg(test)]
mod workflow_tests;
