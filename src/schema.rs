//! Value types exchanged with the server.
//!
//! The JSON produced by the server for these types can be deserialized
//! directly; field names are camelCase on the wire.

use std::ops::Index;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of data stored in a column. Kinds this client does not know about
/// deserialize to `Unknown` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Category,
    Json,
    String,
    Integer,
    Double,
    Date,
    Interval,
    #[serde(other)]
    Unknown,
}

impl ColumnKind {
    /// Whether a range (and from it a histogram) can be computed for the kind.
    pub fn has_range(&self) -> bool {
        !matches!(
            self,
            ColumnKind::Json | ColumnKind::String | ColumnKind::Category
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    pub kind: ColumnKind,
    pub name: String,
    pub allow_missing: bool,
}

impl ColumnDescription {
    pub fn new(kind: ColumnKind, name: impl Into<String>, allow_missing: bool) -> Self {
        Self {
            kind,
            name: name.into(),
            allow_missing,
        }
    }
}

/// Ordered list of columns; names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<ColumnDescription>);

impl Schema {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, idx: usize) -> Option<&ColumnDescription> {
        self.0.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescription> {
        self.0.iter()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|c| c.name == name)
    }

    pub fn find(&self, name: &str) -> Option<&ColumnDescription> {
        self.column_index(name).map(|idx| &self.0[idx])
    }
}

impl Index<usize> for Schema {
    type Output = ColumnDescription;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.0[idx]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSortOrientation {
    pub column_description: ColumnDescription,
    pub is_ascending: bool,
}

impl ColumnSortOrientation {
    pub fn new(column_description: ColumnDescription, is_ascending: bool) -> Self {
        Self {
            column_description,
            is_ascending,
        }
    }

    pub fn name(&self) -> &str {
        &self.column_description.name
    }
}

/// Run of `count` identical logical rows. `values` are aligned with the
/// record order the rows were requested with, not with the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowView {
    pub count: u64,
    pub values: Vec<Value>,
}

/// One complete server view of a table: enough to render without any
/// earlier snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataView {
    pub schema: Option<Schema>,
    pub row_count: u64,
    pub start_position: Option<u64>,
    pub rows: Option<Vec<RowView>>,
}

/// Summary statistics the server returns for a `range` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicColStats {
    pub moment_count: u32,
    pub min: f64,
    pub max: f64,
    pub present_count: u64,
    pub missing_count: u64,
}
