//! Connection trait and transaction handling
//!
//! This is the contract the grid consumes from its hosting backend: statements
//! run sequentially, a transaction can be started and committed, and a dynamic
//! query returns a result table.

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Begin a transaction
    ///
    /// Until the transaction is committed, rolled back or dropped, other
    /// statements on the same connection wait rather than joining it.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}
