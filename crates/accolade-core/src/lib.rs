//! Core types, store traits and the verification workflow for Accolade.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::RelationalStore`] and
//! [`store::DocumentStore`]; everything else depends on those traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod achievement;
pub mod detail;
pub mod error;
pub mod identity;
pub mod points;
pub mod status;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
pub use workflow::{Workflow, WorkflowConfig};
