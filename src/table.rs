use serde_json::Value;
use tracing::{debug, trace};

use crate::domain::RtvError;
use crate::fmt::{self, MISSING, UNKNOWN};
use crate::histogram::RangeCollector;
use crate::order::RecordOrder;
use crate::page::{Page, Session};
use crate::rpc::{Observer, RemoteObject, RemoteObjectId, RequestHandle, RpcRequest};
use crate::schema::{
    ColumnDescription, ColumnKind, ColumnSortOrientation, RowView, Schema, TableDataView,
};

/// Local number of a table view; a view replaced by another never gets its
/// serial back.
pub type ViewSerial = u64;

pub const POSITION_COLUMN: &str = "(position)";
pub const COUNT_COLUMN: &str = "(count)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirective {
    Hide,
    Descending,
    Ascending,
}

impl TryFrom<i32> for SortDirective {
    type Error = RtvError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SortDirective::Hide),
            -1 => Ok(SortDirective::Descending),
            1 => Ok(SortDirective::Ascending),
            other => Err(RtvError::InvalidDirective(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCell {
    pub name: String,
    pub label: String,
    pub kind: ColumnKind,
    // Whether the column is part of the record order.
    pub visible: bool,
}

/// Everything the UI needs to draw the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedTable {
    pub header: Vec<HeaderCell>,
    pub rows: Vec<Vec<String>>,
    pub footer: Option<String>,
    /// Top and bottom of the displayed rows as fractions of the table.
    pub scroll: Option<(f64, f64)>,
}

/*
 Example rendering:
 | (position) | (count) | col0 ⇓1 | col1 ⇑0 | col2 |
 |         10 |       3 | Mike    |       0 |      |
 |         13 |       6 | Jon     |       1 |      |
 Showing 9 of 20 rows (45%)
*/

/// View of a remote table. The rows of each snapshot hold only the columns
/// of the record order, in the order's sequence.
pub struct TableView {
    remote: RemoteObject,
    serial: ViewSerial,
    schema: Option<Schema>,
    start_position: Option<u64>, // Logical position of the first displayed row
    row_count: Option<u64>,      // Total rows in the table
    order: RecordOrder,
    // Order the displayed snapshot was requested with; its rows follow it.
    snapshot_order: RecordOrder,
    data_rows_displayed: u64, // Includes the count of each row
    current_data: Option<TableDataView>,
    rendered: RenderedTable,
    generation: u64,
    in_flight: Option<RequestHandle>,
    selected_column: usize,
}

impl TableView {
    pub fn new(id: RemoteObjectId, serial: ViewSerial) -> Self {
        TableView {
            remote: RemoteObject::new(id),
            serial,
            schema: None,
            start_position: None,
            row_count: None,
            order: RecordOrder::default(),
            snapshot_order: RecordOrder::default(),
            data_rows_displayed: 0,
            current_data: None,
            rendered: RenderedTable::default(),
            generation: 0,
            in_flight: None,
            selected_column: 0,
        }
    }

    pub fn id(&self) -> &RemoteObjectId {
        self.remote.id()
    }

    pub fn serial(&self) -> ViewSerial {
        self.serial
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn order(&self) -> &RecordOrder {
        &self.order
    }

    pub fn current_data(&self) -> Option<&TableDataView> {
        self.current_data.as_ref()
    }

    pub fn rendered(&self) -> &RenderedTable {
        &self.rendered
    }

    pub fn data_rows_displayed(&self) -> u64 {
        self.data_rows_displayed
    }

    pub fn get_schema(&mut self, session: &mut Session) -> Result<(), RtvError> {
        let request = self.remote.create_rpc_request("getSchema", ())?;
        self.issue(request, session);
        Ok(())
    }

    pub fn set_order(&mut self, order: RecordOrder, session: &mut Session) -> Result<(), RtvError> {
        let request = self.remote.create_rpc_request("getTableView", &order)?;
        self.order = order;
        self.issue(request, session);
        Ok(())
    }

    /// Request every column of the schema, keeping the current sort keys first.
    pub fn show_all_rows(&mut self, session: &mut Session) -> Result<(), RtvError> {
        let Some(schema) = &self.schema else {
            session.report_error("No data loaded");
            return Ok(());
        };

        let mut order = self.order.clone();
        for cd in schema.iter() {
            order.show_if_not_visible(ColumnSortOrientation::new(cd.clone(), true));
        }
        self.set_order(order, session)
    }

    /// Request no columns at all; only row counts come back.
    pub fn no_rows(&mut self, session: &mut Session) -> Result<(), RtvError> {
        self.set_order(RecordOrder::default(), session)
    }

    pub fn show_column(
        &mut self,
        column: &str,
        directive: SortDirective,
        session: &mut Session,
    ) -> Result<(), RtvError> {
        let mut order = self.order.clone();
        match directive {
            SortDirective::Hide => order.hide(column),
            SortDirective::Ascending | SortDirective::Descending => {
                let Some(cd) = self.find_column(column).cloned() else {
                    debug!("Unknown column {column}, not sorting");
                    return Ok(());
                };
                order.show(ColumnSortOrientation::new(
                    cd,
                    directive == SortDirective::Ascending,
                ));
            }
        }
        self.set_order(order, session)
    }

    /// Hand the range of a column to a [`RangeCollector`].
    pub fn histogram(&mut self, column: &str, session: &mut Session) -> Result<(), RtvError> {
        let Some(cd) = self.find_column(column).cloned() else {
            debug!("Unknown column {column}, no range");
            return Ok(());
        };
        let request = self.remote.create_rpc_request("range", column)?;
        session.invoke(request, RangeCollector::new(self.serial, cd));
        Ok(())
    }

    pub fn refresh(&mut self, session: &mut Session) {
        match self.current_data.clone() {
            Some(data) => self.update_view(data),
            None => session.report_error("Nothing to refresh"),
        }
    }

    pub fn cancel_pending(&mut self, session: &mut Session) {
        if let Some(handle) = self.in_flight.take() {
            session.cancel(&handle);
        }
    }

    // A newer request supersedes the one in flight.
    fn issue(&mut self, request: RpcRequest, session: &mut Session) {
        self.cancel_pending(session);
        self.generation += 1;
        let renderer = TableRenderer::new(self.serial, self.generation);
        self.in_flight = Some(session.invoke(request, renderer));
    }

    pub fn accept_snapshot(&mut self, generation: u64, data: TableDataView) {
        if generation != self.generation {
            debug!(
                "Dropping snapshot of request generation {generation}, current is {}",
                self.generation
            );
            return;
        }
        // The current generation was requested with the current order.
        self.snapshot_order = self.order.clone();
        self.update_view(data);
    }

    pub fn request_finished(&mut self, generation: u64) {
        if generation == self.generation {
            self.in_flight = None;
        }
    }

    pub fn update_view(&mut self, data: TableDataView) {
        self.data_rows_displayed = 0;
        self.start_position = data.start_position;
        self.row_count = Some(data.row_count);
        if self.schema.is_none() {
            self.schema = data.schema.clone();
        }

        // These two columns are always shown
        let mut rendered = RenderedTable::default();
        let position = ColumnDescription::new(ColumnKind::Integer, POSITION_COLUMN, false);
        let count = ColumnDescription::new(ColumnKind::Integer, COUNT_COLUMN, false);
        rendered.header.push(self.header_cell(&position));
        rendered.header.push(self.header_cell(&count));

        let Some(schema) = self.schema.clone() else {
            self.current_data = Some(data);
            self.rendered = rendered;
            return;
        };

        for cd in schema.iter() {
            rendered.header.push(self.header_cell(cd));
        }
        if let Some(rows) = &data.rows {
            for row in rows {
                let cells = self.add_row(row, &schema);
                rendered.rows.push(cells);
            }
        }

        let mut perc = String::new();
        if data.row_count > 0 {
            perc = format!(
                " ({})",
                fmt::percent(self.data_rows_displayed as f64 / data.row_count as f64)
            );
        }
        rendered.footer = Some(format!(
            "Showing {} of {} rows{}",
            fmt::format_number(self.data_rows_displayed),
            fmt::format_number(data.row_count),
            perc
        ));
        rendered.scroll = self.scroll_range();

        self.selected_column = self.selected_column.min(schema.len().saturating_sub(1));
        self.current_data = Some(data);
        self.rendered = rendered;
    }

    fn scroll_range(&self) -> Option<(f64, f64)> {
        let (start, total) = match (self.start_position, self.row_count) {
            (Some(start), Some(total)) if total > 0 => (start, total),
            _ => return None,
        };
        let top = start as f64 / total as f64;
        let bottom = start.saturating_add(self.data_rows_displayed) as f64 / total as f64;
        trace!("Scroll range {top} - {bottom}");
        Some((top, bottom))
    }

    fn add_row(&mut self, row: &RowView, schema: &Schema) -> Vec<String> {
        let mut cells = Vec::with_capacity(schema.len() + 2);
        let position = self
            .start_position
            .unwrap_or(0)
            .saturating_add(self.data_rows_displayed);
        cells.push(fmt::significant_digits(position as f64));
        cells.push(fmt::significant_digits(row.count as f64));

        for cd in schema.iter() {
            // Row values follow the record order, not the schema.
            let cell = match self.snapshot_order.find(&cd.name) {
                Some(data_idx) => row
                    .values
                    .get(data_idx)
                    .map(|v| Self::convert(v, cd.kind))
                    .unwrap_or_default(),
                None => String::new(),
            };
            cells.push(cell);
        }
        self.data_rows_displayed = self.data_rows_displayed.saturating_add(row.count);
        cells
    }

    pub fn convert(value: &Value, kind: ColumnKind) -> String {
        if value.is_null() {
            return MISSING.to_string();
        }
        match kind {
            ColumnKind::Integer | ColumnKind::Double => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            ColumnKind::Date => value
                .as_f64()
                .and_then(fmt::date_from_millis)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            ColumnKind::Category | ColumnKind::String => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            ColumnKind::Json | ColumnKind::Interval | ColumnKind::Unknown => UNKNOWN.to_string(),
        }
    }

    pub fn find_column(&self, column: &str) -> Option<&ColumnDescription> {
        self.schema.as_ref()?.find(column)
    }

    fn sort_arrow(&self, column: &str) -> &'static str {
        match self.snapshot_order.is_ascending(column) {
            Some(true) => "⇓",
            Some(false) => "⇑",
            None => "",
        }
    }

    fn header_cell(&self, cd: &ColumnDescription) -> HeaderCell {
        let visible = self.snapshot_order.is_visible(&cd.name);
        let label = match self.snapshot_order.sort_index(&cd.name) {
            Some(idx) => format!("{} {}{}", cd.name, self.sort_arrow(&cd.name), idx),
            None => cd.name.clone(),
        };
        HeaderCell {
            name: cd.name.clone(),
            label,
            kind: cd.kind,
            visible,
        }
    }

    /// Index into the schema of the column the cursor is on.
    pub fn selected_column(&self) -> usize {
        self.selected_column
    }

    pub fn selected_column_description(&self) -> Option<&ColumnDescription> {
        self.schema.as_ref()?.get(self.selected_column)
    }

    pub fn select_previous_column(&mut self) {
        self.selected_column = self.selected_column.saturating_sub(1);
    }

    pub fn select_next_column(&mut self) {
        let columns = self.schema.as_ref().map(|s| s.len()).unwrap_or(0);
        if self.selected_column + 1 < columns {
            self.selected_column += 1;
        }
    }
}

/// Renders every snapshot it receives into the view it was created for.
pub struct TableRenderer {
    view: ViewSerial,
    generation: u64,
}

impl TableRenderer {
    pub fn new(view: ViewSerial, generation: u64) -> Self {
        Self { view, generation }
    }
}

impl Observer<TableDataView> for TableRenderer {
    fn description(&self) -> &'static str {
        "Getting table info"
    }

    fn on_next(&mut self, value: TableDataView, page: &mut Page) {
        match page.view_for(self.view) {
            Some(view) => view.accept_snapshot(self.generation, value),
            None => debug!("View {} was replaced, dropping snapshot", self.view),
        }
    }

    fn on_completed(&mut self, page: &mut Page) {
        if let Some(view) = page.view_for(self.view) {
            view.request_finished(self.generation);
        }
    }
}
