use thiserror::Error;

use crate::column::ColumnId;
use crate::filter::{FilterOp, FilterTermId};

pub type GridResult<T> = Result<T, GridError>;

/// Errors raised by grid state operations
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Filter term {0} does not exist")]
    UnknownTerm(FilterTermId),

    #[error("Filter term {0} is not a group")]
    NotAGroup(FilterTermId),

    #[error("Filter term {0} is not a condition")]
    NotALeaf(FilterTermId),

    #[error("No column of this grid can be filtered")]
    NoFilterableColumn,

    #[error("Filter groups cannot be nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("A filter group cannot be moved inside itself")]
    CyclicMove,

    #[error("Column {0} does not exist")]
    UnknownColumn(ColumnId),

    #[error("Column {0} cannot be filtered")]
    NotFilterable(ColumnId),

    #[error("Operator {op} is not offered for column {column}")]
    OpNotOffered { column: ColumnId, op: FilterOp },

    #[error("Invalid ordering key: {0}")]
    InvalidOrderKey(String),

    #[error("Invalid grid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Core(#[from] dgrid_core::DgridError),
}
