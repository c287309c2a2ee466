//! SQLite connection implementation

use async_trait::async_trait;
use dgrid_core::{
    Connection, DgridError, QueryResult, Result, Row, StatementResult, Transaction, Value,
};
use rusqlite::{Connection as RusqliteConnection, ErrorCode, OpenFlags, params_from_iter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// SQLite connection wrapper
///
/// All statements share one rusqlite connection. A transaction owns it from
/// `BEGIN` until commit, rollback or drop, so concurrent callers queue behind
/// the transaction instead of running inside it.
pub struct SqliteConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
}

impl SqliteConnection {
    /// Open (or create) a SQLite database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening SQLite database");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(DgridError::Connection(format!(
                "Parent directory does not exist: {}",
                parent.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
            DgridError::Connection(format!(
                "Failed to open SQLite database at '{}': {}",
                path.display(),
                e
            ))
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| DgridError::Connection(format!("Failed to set journal mode: {}", e)))?;

        Self::from_rusqlite(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = RusqliteConnection::open_in_memory().map_err(|e| {
            DgridError::Connection(format!("Failed to open in-memory database: {}", e))
        })?;
        Self::from_rusqlite(conn)
    }

    fn from_rusqlite(conn: RusqliteConnection) -> Result<Self> {
        // Filter-term groups reference their parent with ON DELETE CASCADE
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| DgridError::Connection(format!("Failed to enable foreign keys: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let conn = self.conn.lock().await;
        run_execute(&conn, sql, params)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.conn.lock().await;
        run_query(&conn, sql, params)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        tracing::debug!("beginning SQLite transaction");
        // IMMEDIATE takes the write lock up front; every grid transaction writes
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| DgridError::Query(format!("Failed to begin transaction: {}", e)))?;
        Ok(Box::new(SqliteTransaction {
            conn: parking_lot::Mutex::new(conn),
            finished: false,
        }))
    }
}

/// SQLite transaction holding the connection for its whole lifetime
///
/// Issues raw `BEGIN` / `COMMIT` / `ROLLBACK` SQL; a transaction dropped
/// without either is rolled back.
pub struct SqliteTransaction {
    conn: parking_lot::Mutex<OwnedMutexGuard<RusqliteConnection>>,
    finished: bool,
}

impl SqliteTransaction {
    fn end(&mut self, statement: &str) -> Result<()> {
        self.finished = true;
        self.conn
            .get_mut()
            .execute_batch(statement)
            .map_err(|e| DgridError::Query(format!("Failed to {} transaction: {}", statement.to_lowercase(), e)))
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("SQLite transaction dropped without commit or rollback, rolling back");
            if let Err(e) = self.end("ROLLBACK") {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Err(e) = self.end("COMMIT") {
            self.finished = false;
            return Err(e);
        }
        tracing::debug!("SQLite transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.end("ROLLBACK")?;
        tracing::debug!("SQLite transaction rolled back");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query in SQLite transaction");
        let conn = self.conn.lock();
        run_query(&conn, sql, params)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing statement in SQLite transaction");
        let conn = self.conn.lock();
        run_execute(&conn, sql, params)
    }
}

fn run_execute(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let rusqlite_params = values_to_rusqlite(params);

    let rows_affected = conn
        .execute(sql, params_from_iter(rusqlite_params.iter()))
        .map_err(|e| map_error("Failed to execute statement", e))?;

    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(StatementResult {
        affected_rows: rows_affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

fn run_query(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();
    let rusqlite_params = values_to_rusqlite(params);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| map_error("Failed to prepare query", e))?;

    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| map_error("Failed to execute query", e))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| map_error("Failed to fetch row", e))?
    {
        let values = (0..columns.len())
            .map(|i| rusqlite_to_value(row, i))
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row::new(Arc::clone(&columns), values));
    }

    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = start_time.elapsed().as_millis() as u64,
        "query executed successfully"
    );
    Ok(QueryResult { columns, rows })
}

fn map_error(context: &str, e: rusqlite::Error) -> DgridError {
    match e.sqlite_error_code() {
        Some(ErrorCode::AuthorizationForStatementDenied) | Some(ErrorCode::PermissionDenied) => {
            DgridError::Disallowed(format!("{}: {}", context, e))
        }
        _ => DgridError::Query(format!("{}: {}", context, e)),
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| DgridError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_and_query() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let inserted = conn
            .execute("INSERT INTO t (name) VALUES (?1)", &[Value::from("alpha")])
            .await
            .unwrap();
        assert_eq!(inserted.affected_rows, 1);
        assert_eq!(inserted.last_insert_id, Some(1));

        let result = conn.query("SELECT id, name FROM t", &[]).await.unwrap();
        assert_eq!(result.column_count(), 2);
        assert_eq!(result.rows[0].get_by_name("name"), Some(&Value::from("alpha")));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        let tx = conn.begin_transaction().await.unwrap();
        tx.execute("INSERT INTO t DEFAULT VALUES", &[]).await.unwrap();
        tx.rollback().await.unwrap();

        let count = conn.query("SELECT count(*) FROM t", &[]).await.unwrap();
        assert_eq!(count.scalar(), Some(&Value::Int64(0)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        {
            let tx = conn.begin_transaction().await.unwrap();
            tx.execute("INSERT INTO t DEFAULT VALUES", &[]).await.unwrap();
        }

        let count = conn.query("SELECT count(*) FROM t", &[]).await.unwrap();
        assert_eq!(count.scalar(), Some(&Value::Int64(0)));
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let conn = SqliteConnection::open(dir.path().join("grid.db")).unwrap();
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        let count = conn.query("SELECT count(*) FROM t", &[]).await.unwrap();
        assert_eq!(count.scalar(), Some(&Value::Int64(1)));
    }

    #[tokio::test]
    async fn test_blobs_read_back_as_bytes() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (data BLOB)", &[]).await.unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", &[Value::Bytes(b"abc".to_vec())])
            .await
            .unwrap();

        let result = conn.query("SELECT data FROM t", &[]).await.unwrap();
        assert_eq!(result.scalar(), Some(&Value::Bytes(b"abc".to_vec())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_statements_wait_for_open_transaction() {
        let conn = Arc::new(SqliteConnection::open_in_memory().unwrap());
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();

        let tx = conn.begin_transaction().await.unwrap();
        tx.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();

        let outside = tokio::spawn({
            let conn = Arc::clone(&conn);
            async move { conn.execute("INSERT INTO t VALUES (2)", &[]).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!outside.is_finished());

        tx.rollback().await.unwrap();
        outside.await.unwrap().unwrap();

        let ids = conn.query("SELECT id FROM t", &[]).await.unwrap();
        assert_eq!(ids.row_count(), 1);
        assert_eq!(ids.scalar(), Some(&Value::Int64(2)));
    }

    #[test]
    fn test_open_missing_parent_fails() {
        let result = SqliteConnection::open("/definitely/not/here/grid.db");
        assert!(matches!(result, Err(DgridError::Connection(_))));
    }
}
