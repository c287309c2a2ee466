//! DGRID Core - shared types and the query execution contract
//!
//! This crate provides the fundamental traits and types that the rest of the
//! datagrid engine depends on:
//!
//! - `Connection` - submit a query or statement and begin transactions
//! - `Transaction` - statements that run sequentially until commit/rollback
//! - `Value`, `Row` and `QueryResult` for cells and result tables

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
