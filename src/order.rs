use serde::{Deserialize, Serialize};

use crate::schema::ColumnSortOrientation;

/// Columns that are requested from the server, in display and sort
/// priority order. A column appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOrder {
    sort_orientation_list: Vec<ColumnSortOrientation>,
}

impl RecordOrder {
    #[cfg(test)]
    pub fn new(sort_orientation_list: Vec<ColumnSortOrientation>) -> Self {
        let mut order = Self::default();
        for cso in sort_orientation_list {
            order.show_if_not_visible(cso);
        }
        order
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sort_orientation_list.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sort_orientation_list.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &ColumnSortOrientation> {
        self.sort_orientation_list.iter()
    }

    /// Position of the column in the order, `None` if it is not requested.
    pub fn find(&self, column: &str) -> Option<usize> {
        self.sort_orientation_list
            .iter()
            .position(|cso| cso.name() == column)
    }

    pub fn hide(&mut self, column: &str) {
        if let Some(idx) = self.find(column) {
            self.sort_orientation_list.remove(idx);
        }
    }

    /// Make the column the primary sort key.
    pub fn show(&mut self, cso: ColumnSortOrientation) {
        self.hide(cso.name());
        self.sort_orientation_list.insert(0, cso);
    }

    pub fn show_if_not_visible(&mut self, cso: ColumnSortOrientation) {
        if self.find(cso.name()).is_none() {
            self.sort_orientation_list.push(cso);
        }
    }

    /// Direction and priority of a column, if it is part of the order.
    pub fn sort_orientation(&self, column: &str) -> Option<(bool, usize)> {
        self.find(column)
            .map(|idx| (self.sort_orientation_list[idx].is_ascending, idx))
    }

    pub fn is_visible(&self, column: &str) -> bool {
        self.find(column).is_some()
    }

    pub fn is_ascending(&self, column: &str) -> Option<bool> {
        self.sort_orientation(column).map(|(asc, _)| asc)
    }

    pub fn sort_index(&self, column: &str) -> Option<usize> {
        self.sort_orientation(column).map(|(_, idx)| idx)
    }
}
