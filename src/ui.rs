use std::time::Duration;

use ratatui::{
    Frame,
    buffer::Buffer,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, Widget},
};

use crate::model::Model;
use crate::page::Session;
use crate::table::{RenderedTable, TableView};

pub const SCROLLBAR_WIDTH: u16 = 1;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const COLUMN_WIDTH_MARGIN: u16 = 1;
// Index of the first schema column in a rendered row.
const PSEUDO_COLUMNS: usize = 2;
// Errors stay in the status line this long.
const ERROR_DISPLAY_TIME: Duration = Duration::from_secs(10);

pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let [main_area, status_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());
        let [table_area, scroll_area] =
            Layout::horizontal([Constraint::Min(1), Constraint::Length(SCROLLBAR_WIDTH)])
                .areas(main_area);

        let buf = frame.buffer_mut();
        match model.page().view() {
            Some(view) => {
                TableWidget {
                    view,
                    max_column_width: model.config().max_column_width,
                }
                .render(table_area, buf);
                ScrollBar {
                    scroll: view.rendered().scroll,
                }
                .render(scroll_area, buf);
            }
            None => Paragraph::new(Line::from("Waiting for a table ...".italic()))
                .centered()
                .block(Block::bordered().border_set(border::THICK))
                .render(table_area, buf),
        }
        StatusLine {
            session: &model.page().session,
        }
        .render(status_area, buf);

        if let Some((title, lines)) = model.popup() {
            Popup { title, lines }.render(main_area, buf);
        }
    }
}

struct TableWidget<'a> {
    view: &'a TableView,
    max_column_width: usize,
}

impl TableWidget<'_> {
    fn column_widths(rendered: &RenderedTable, max_column_width: usize) -> Vec<u16> {
        rendered
            .header
            .iter()
            .enumerate()
            .map(|(idx, h)| {
                let cells = rendered
                    .rows
                    .iter()
                    .filter_map(|r| r.get(idx))
                    .map(|c| c.chars().count());
                let width = cells.fold(h.label.chars().count(), usize::max);
                width.min(max_column_width) as u16
            })
            .collect()
    }
}

impl Widget for TableWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let rendered = self.view.rendered();
        let selected = self.view.selected_column() + PSEUDO_COLUMNS;

        let header = Row::new(rendered.header.iter().enumerate().map(|(idx, h)| {
            let mut style = Style::new();
            if h.visible {
                style = style.bold();
            }
            if idx == selected {
                style = style.reversed();
            }
            Cell::from(h.label.clone()).style(style)
        }));
        let rows = rendered.rows.iter().map(|r| {
            Row::new(r.iter().enumerate().map(|(idx, c)| {
                let cell = Cell::from(c.clone());
                if idx == selected { cell.yellow() } else { cell }
            }))
        });
        let widths = Self::column_widths(rendered, self.max_column_width)
            .into_iter()
            .map(Constraint::Length);

        let title = Line::from(format!(" Table {} ", self.view.id()).bold());
        let mut block = Block::bordered()
            .title(title.centered())
            .border_set(border::THICK);
        if let Some(footer) = &rendered.footer {
            block = block.title_bottom(Line::from(format!(" {footer} ")).centered());
        }

        Widget::render(
            Table::new(rows, widths)
                .header(header)
                .column_spacing(COLUMN_WIDTH_MARGIN)
                .block(block),
            area,
            buf,
        );
    }
}

/// Text scrollbar: the displayed part of the table is drawn solid.
struct ScrollBar {
    scroll: Option<(f64, f64)>,
}

impl ScrollBar {
    fn marks(scroll: Option<(f64, f64)>, height: usize) -> Vec<bool> {
        let Some((top, bottom)) = scroll else {
            return vec![false; height];
        };
        let first = (top * height as f64).floor() as usize;
        let last = ((bottom * height as f64).ceil() as usize).max(first + 1);
        (0..height).map(|i| i >= first && i < last).collect()
    }
}

impl Widget for ScrollBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (i, mark) in Self::marks(self.scroll, area.height as usize)
            .into_iter()
            .enumerate()
        {
            let symbol = if mark { "█" } else { "│" };
            buf.set_string(area.x, area.y + i as u16, symbol, Style::new().dark_gray());
        }
    }
}

struct StatusLine<'a> {
    session: &'a Session,
}

impl Widget for StatusLine<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans: Vec<Span> = self
            .session
            .progress
            .active()
            .map(|bar| format!(" {} {:.0}% ", bar.description, bar.done * 100.0).blue())
            .collect();

        if let Some(error) = self.session.last_error()
            && self.session.last_error_update().elapsed() < ERROR_DISPLAY_TIME
        {
            spans.push(format!(" {error} ").red().bold());
        }
        if spans.is_empty() {
            spans.push(" Ready ".into());
        }
        spans.push(" <?> Help ".dark_gray());

        Paragraph::new(Line::from(spans)).render(area, buf);
    }
}

struct Popup {
    title: String,
    lines: Vec<String>,
}

impl Widget for Popup {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let height = (self.lines.len() as u16 + 2).min(area.height);
        let [area] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::horizontal([Constraint::Percentage(60)])
            .flex(Flex::Center)
            .areas(area);

        Clear.render(area, buf);
        let block = Block::bordered()
            .title(Line::from(format!(" {} ", self.title).bold()).centered())
            .title_bottom(Line::from(" <Esc> close ").centered())
            .border_set(border::THICK);
        Paragraph::new(self.lines.into_iter().map(Line::from).collect::<Vec<_>>())
            .block(block)
            .render(area, buf);
    }
}
