//! Row selection, bulk delete and the undo window

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dgrid_core::{Connection, DgridError, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::query::{CompiledQuery, WriteTarget};
use crate::refresh::RefreshKey;

const DELETE_CHUNK: usize = 500;

/// Rows picked by checkbox, or everything matching the current filter
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Rows(Vec<Value>),
    All,
}

impl Default for Selection {
    fn default() -> Self {
        Self::Rows(Vec::new())
    }
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Rows(rows) if rows.is_empty())
    }

    pub fn is_selected(&self, pk: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Rows(rows) => rows.contains(pk),
        }
    }

    /// Flips one row; under select-all this narrows nothing and is ignored
    pub fn toggle_row(&mut self, pk: Value) {
        if let Self::Rows(rows) = self {
            match rows.iter().position(|r| *r == pk) {
                Some(index) => {
                    rows.remove(index);
                }
                None => rows.push(pk),
            }
        }
    }

    pub fn select_all(&mut self) {
        *self = Self::All;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Row count for the confirmation prompt; select-all runs the count query
    pub async fn count(&self, conn: &dyn Connection, count: &CompiledQuery) -> dgrid_core::Result<u64> {
        match self {
            Self::Rows(rows) => Ok(rows.len() as u64),
            Self::All => {
                let result = conn.query(&count.sql, &[]).await?;
                let n = result
                    .scalar()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| DgridError::Query("count query returned no number".into()))?;
                Ok(u64::try_from(n).unwrap_or(0))
            }
        }
    }

    /// Exact primary keys to delete; select-all runs the id query
    pub async fn materialize(
        &self,
        conn: &dyn Connection,
        ids: &CompiledQuery,
    ) -> dgrid_core::Result<Vec<Value>> {
        match self {
            Self::Rows(rows) => Ok(rows.clone()),
            Self::All => {
                let result = conn.query(&ids.sql, &[]).await?;
                Ok(result
                    .rows
                    .into_iter()
                    .filter_map(|row| row.values.into_iter().next())
                    .collect())
            }
        }
    }
}

pub fn confirmation_message(count: u64) -> String {
    match count {
        1 => "Delete 1 record?".to_string(),
        n => format!("Delete {} records?", n),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkDeleteOutcome {
    Deleted(u64),
    Undone,
    Failed(String),
}

/// A bulk delete that runs once the undo delay elapses unless undone first
#[derive(Debug)]
pub struct UndoWindow {
    handle: JoinHandle<BulkDeleteOutcome>,
    committing: Arc<AtomicBool>,
    commit: Option<oneshot::Sender<()>>,
}

impl UndoWindow {
    /// Schedules the delete of `ids` from `target`. Must run inside a tokio runtime.
    pub fn arm(
        conn: Arc<dyn Connection>,
        target: WriteTarget,
        ids: Vec<Value>,
        delay: Duration,
        refresh: RefreshKey,
    ) -> Self {
        let committing = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&committing);
        let (commit, mut commit_rx) = oneshot::channel();
        tracing::debug!(rows = ids.len(), delay_ms = delay.as_millis() as u64, "bulk delete armed");

        let handle = tokio::spawn(async move {
            // A dropped window still commits once the delay runs out
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                Ok(()) = &mut commit_rx => tracing::debug!("bulk delete committed early"),
            }
            flag.store(true, Ordering::SeqCst);
            let outcome = match delete_rows(conn.as_ref(), &target, &ids).await {
                Ok(n) => BulkDeleteOutcome::Deleted(n),
                Err(e) => {
                    tracing::warn!(error = %e, "bulk delete failed");
                    BulkDeleteOutcome::Failed(e.to_string())
                }
            };
            refresh.bump();
            outcome
        });

        Self {
            handle,
            committing,
            commit: Some(commit),
        }
    }

    /// Skips the rest of the delay and waits for the delete
    pub async fn commit_now(mut self) -> BulkDeleteOutcome {
        if let Some(commit) = self.commit.take()
            && commit.send(()).is_err()
        {
            tracing::trace!("bulk delete already ran");
        }
        self.wait().await
    }

    /// Cancels the delete if it has not started; otherwise waits for its outcome
    pub async fn undo(self) -> BulkDeleteOutcome {
        if !self.committing.load(Ordering::SeqCst) {
            self.handle.abort();
        }
        self.wait().await
    }

    pub async fn wait(self) -> BulkDeleteOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                tracing::debug!("bulk delete undone");
                BulkDeleteOutcome::Undone
            }
            Err(e) => BulkDeleteOutcome::Failed(e.to_string()),
        }
    }
}

/// Deletes `ids` in one transaction, chunked to keep parameter lists bounded
pub async fn delete_rows(
    conn: &dyn Connection,
    target: &WriteTarget,
    ids: &[Value],
) -> dgrid_core::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let tx = conn.begin_transaction().await?;
    let mut deleted = 0;
    for chunk in ids.chunks(DELETE_CHUNK) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "delete from {} where {} in ({})",
            target.table,
            target.primary_key,
            placeholders.join(", ")
        );
        match tx.execute(&sql, chunk).await {
            Ok(result) => deleted += result.affected_rows,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "rollback after failed bulk delete failed");
                }
                return Err(e);
            }
        }
    }
    tx.commit().await?;
    tracing::info!(deleted, table = %target.table, "bulk delete committed");
    Ok(deleted)
}
