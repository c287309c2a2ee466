//! Error types for view persistence

use dgrid_core::DgridError;
use dgrid_engine::GridError;
use thiserror::Error;

use crate::ViewId;

pub type ViewResult<T> = Result<T, ViewError>;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("View {0} does not exist")]
    NotFound(ViewId),

    #[error("A view named '{0}' already exists")]
    NameTaken(String),

    #[error("Failed to create view tables: {0}")]
    Schema(String),

    /// A stored row could not be turned back into grid state
    #[error("Stored view is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Core(#[from] DgridError),

    #[error(transparent)]
    Grid(#[from] GridError),
}
