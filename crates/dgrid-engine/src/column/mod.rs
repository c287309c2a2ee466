//! Column declarations, the compiled registry and per-grid column state

mod def;
mod registry;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use def::{ColumnDef, ColumnHandlers, FilterSpec};
pub use registry::ColumnRegistry;
pub use table::{ColumnState, ColumnTable};

/// Position of a column in the static declaration list
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ColumnId(pub usize);

impl ColumnId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
