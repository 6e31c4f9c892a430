//! Range statistics of a single column, shown in a popup over the table.

use tracing::debug;

use crate::fmt::{self, UNKNOWN};
use crate::page::Page;
use crate::rpc::Observer;
use crate::schema::{BasicColStats, ColumnDescription, ColumnKind};
use crate::table::ViewSerial;

/// Collects the statistics of a `range` request and shows the last ones
/// when the request completes.
pub struct RangeCollector {
    view: ViewSerial,
    column: ColumnDescription,
    stats: Option<BasicColStats>,
}

impl RangeCollector {
    pub fn new(view: ViewSerial, column: ColumnDescription) -> Self {
        Self {
            view,
            column,
            stats: None,
        }
    }
}

impl Observer<BasicColStats> for RangeCollector {
    fn description(&self) -> &'static str {
        "Computing range"
    }

    fn on_next(&mut self, value: BasicColStats, _page: &mut Page) {
        self.stats = Some(value);
    }

    fn on_completed(&mut self, page: &mut Page) {
        let Some(stats) = self.stats.take() else {
            debug!("No range received for {}", self.column.name);
            return;
        };
        if page.view_for(self.view).is_none() {
            debug!("View {} was replaced, dropping range", self.view);
            return;
        }
        page.show_range(RangeView {
            column: self.column.clone(),
            stats,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeView {
    pub column: ColumnDescription,
    pub stats: BasicColStats,
}

impl RangeView {
    pub fn title(&self) -> String {
        format!("Range of {}", self.column.name)
    }

    fn bound(&self, value: f64) -> String {
        match self.column.kind {
            ColumnKind::Date => fmt::date_from_millis(value).unwrap_or_else(|| UNKNOWN.to_string()),
            ColumnKind::Integer => format!("{}", value as i64),
            _ => fmt::significant_digits(value),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let total = self.stats.present_count + self.stats.missing_count;
        let mut lines = vec![
            format!("Min:     {}", self.bound(self.stats.min)),
            format!("Max:     {}", self.bound(self.stats.max)),
            format!("Present: {}", fmt::format_number(self.stats.present_count)),
            format!("Missing: {}", fmt::format_number(self.stats.missing_count)),
        ];
        if total > 0 {
            lines.push(format!(
                "Missing: {} of all rows",
                fmt::percent(self.stats.missing_count as f64 / total as f64)
            ));
        }
        lines
    }
}
