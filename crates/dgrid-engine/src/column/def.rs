use std::fmt;

use crate::edit::CellHandler;
use crate::filter::{CustomFilter, FilterType};

/// How a column takes part in filtering
#[derive(Clone)]
pub struct FilterSpec {
    pub filter_type: FilterType,
    /// Expression filtered on, defaults to the column's projection
    pub expr: Option<String>,
    pub custom: Option<CustomFilter>,
}

impl FilterSpec {
    pub fn new(filter_type: FilterType) -> Self {
        Self {
            filter_type,
            expr: None,
            custom: None,
        }
    }

    pub fn expr(mut self, expr: impl Into<String>) -> Self {
        self.expr = Some(expr.into());
        self
    }

    pub fn custom(mut self, custom: CustomFilter) -> Self {
        self.custom = Some(custom);
        self
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("filter_type", &self.filter_type)
            .field("expr", &self.expr)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Per-column event handlers, consulted before the generic header/body branch
#[derive(Clone, Default)]
pub struct ColumnHandlers {
    pub on_header_keydown: Option<CellHandler>,
    pub on_body_keydown: Option<CellHandler>,
    pub on_header_click: Option<CellHandler>,
    pub on_body_click: Option<CellHandler>,
}

impl ColumnHandlers {
    pub fn is_empty(&self) -> bool {
        self.on_header_keydown.is_none()
            && self.on_body_keydown.is_none()
            && self.on_header_click.is_none()
            && self.on_body_click.is_none()
    }
}

impl fmt::Debug for ColumnHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnHandlers")
            .field("on_header_keydown", &self.on_header_keydown.is_some())
            .field("on_body_keydown", &self.on_body_keydown.is_some())
            .field("on_header_click", &self.on_header_click.is_some())
            .field("on_body_click", &self.on_body_click.is_some())
            .finish()
    }
}

/// Static declaration of a grid column
///
/// Built once per grid and compiled into a [`ColumnRegistry`](super::ColumnRegistry).
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub display_name: String,
    /// Projection expression; `None` for pure UI columns
    pub query: Option<String>,
    /// Durable name used by saved views
    pub storage_name: Option<String>,
    /// Header used by CSV export, defaults to the storage or display name
    pub export_name: Option<String>,
    /// Expression projected by the download query instead of `query`
    pub download: Option<String>,
    pub exportable: bool,
    pub filter: Option<FilterSpec>,
    pub sortable: bool,
    pub always_generate: bool,
    pub width: Option<f32>,
    pub displaying: bool,
    /// Field written by cell edits
    pub update_field: Option<String>,
    pub handlers: ColumnHandlers,
}

impl ColumnDef {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            query: None,
            storage_name: None,
            export_name: None,
            download: None,
            exportable: false,
            filter: None,
            sortable: false,
            always_generate: false,
            width: None,
            displaying: true,
            update_field: None,
            handlers: ColumnHandlers::default(),
        }
    }

    /// Projects `expr` and makes the column exportable
    pub fn query(mut self, expr: impl Into<String>) -> Self {
        self.query = Some(expr.into());
        self.exportable = true;
        self
    }

    pub fn storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    pub fn export_name(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self.exportable = true;
        self
    }

    pub fn download(mut self, expr: impl Into<String>) -> Self {
        self.download = Some(expr.into());
        self.exportable = true;
        self
    }

    pub fn no_export(mut self) -> Self {
        self.exportable = false;
        self
    }

    pub fn filter(mut self, spec: FilterSpec) -> Self {
        self.filter = Some(spec);
        self
    }

    /// Shorthand for a filter on the projection with no custom function
    pub fn filterable(self, filter_type: FilterType) -> Self {
        self.filter(FilterSpec::new(filter_type))
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn always_generate(mut self) -> Self {
        self.always_generate = true;
        self
    }

    pub fn width(mut self, width: f32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displaying = false;
        self
    }

    pub fn update_field(mut self, field: impl Into<String>) -> Self {
        self.update_field = Some(field.into());
        self
    }

    pub fn handlers(mut self, handlers: ColumnHandlers) -> Self {
        self.handlers = handlers;
        self
    }
}
