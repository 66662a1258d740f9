//! # SmartSync Query
//!
//! Query construction and rewriting for SmartSync fetch and push targets.
//!
//! This crate provides:
//! - `QueryBuilder` for assembling `select ... from ...` queries from clauses
//! - `QueryMutator` for parsing an existing query into its top-level clauses
//!   and rewriting them without a full grammar
//! - `add_filter_for_resync` for injecting the incremental-sync predicate
//! - Timestamp formatting and parsing in the remote service's format
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Sub-queries
//!
//! Clause keywords are only recognized at parenthesis depth zero, so a
//! relationship sub-select such as `(select Id from Contacts where ...)`
//! never leaks its `from`/`where` into the outer query.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod error;
mod mutator;
mod resync;
mod tokens;

pub use builder::QueryBuilder;
pub use error::{QueryError, QueryResult};
pub use mutator::{QueryClause, QueryMutator};
pub use resync::{add_filter_for_resync, format_timestamp, parse_timestamp, TIMESTAMP_FORMAT};
