use indexmap::IndexMap;

use crate::query_task::{ExecutionError, TaskOutcome};
use crate::value::StructuredValue;

pub const ID_COLUMN: &str = "_id";
pub const VALUE_COLUMN: &str = "val";
pub const EMPTY_DOCUMENT_COLUMN: &str = "[root]";
pub const EMPTY_DOCUMENT_MARKER: &str = "{}";
pub const NO_RESULT_COLUMN: &str = "[no result]";
pub const ERROR_COLUMN: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicColumn {
    pub name: String,
    pub ordinal: usize,
    pub read_only: bool,
}

impl DynamicColumn {
    fn discovered(name: &str, ordinal: usize) -> Self {
        Self {
            name: name.to_string(),
            ordinal,
            read_only: name == ID_COLUMN,
        }
    }

    fn fixed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ordinal: 0,
            read_only: true,
        }
    }
}

pub type GridRow = IndexMap<String, StructuredValue>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridView {
    columns: Vec<DynamicColumn>,
    rows: Vec<GridRow>,
}

impl GridView {
    #[must_use]
    pub fn from_outcome(outcome: &TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::NotRun => Self::default(),
            TaskOutcome::Success { values, .. } => Self::from_values(values),
            TaskOutcome::Failure(error) => Self::from_error(error),
        }
    }

    #[must_use]
    pub fn from_values(values: &[StructuredValue]) -> Self {
        if values.is_empty() {
            return Self {
                columns: vec![DynamicColumn::fixed(NO_RESULT_COLUMN)],
                rows: Vec::new(),
            };
        }

        let mut columns: IndexMap<String, DynamicColumn> = IndexMap::new();
        let mut rows = Vec::with_capacity(values.len());
        for value in values {
            let row = grid_row(value);
            for key in row.keys() {
                if !columns.contains_key(key) {
                    let column = DynamicColumn::discovered(key, columns.len());
                    columns.insert(key.clone(), column);
                }
            }
            rows.push(row);
        }

        Self {
            columns: columns.into_values().collect(),
            rows,
        }
    }

    #[must_use]
    pub fn from_error(error: &ExecutionError) -> Self {
        let mut row = GridRow::new();
        row.insert(
            ERROR_COLUMN.to_string(),
            StructuredValue::String(error.message().to_string()),
        );
        Self {
            columns: vec![DynamicColumn::fixed(ERROR_COLUMN)],
            rows: vec![row],
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[DynamicColumn] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    #[must_use]
    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&StructuredValue> {
        self.rows.get(row)?.get(column)
    }

    #[must_use]
    pub fn cell_text(&self, row: usize, column: &str) -> String {
        self.cell(row, column)
            .map(StructuredValue::cell_text)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn visible_rows(&self, start: usize, limit: usize) -> &[GridRow] {
        if limit == 0 || start >= self.rows.len() {
            return &[];
        }
        let end = start.saturating_add(limit).min(self.rows.len());
        &self.rows[start..end]
    }
}

fn grid_row(value: &StructuredValue) -> GridRow {
    match value {
        StructuredValue::Document(document) if document.is_empty() => GridRow::from([(
            EMPTY_DOCUMENT_COLUMN.to_string(),
            StructuredValue::String(EMPTY_DOCUMENT_MARKER.to_string()),
        )]),
        StructuredValue::Document(document) => document.clone(),
        other => GridRow::from([(VALUE_COLUMN.to_string(), other.clone())]),
    }
}
