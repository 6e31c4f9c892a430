use tracing::{debug, info, trace};

use crate::domain::{HELP_TEXT, Message, RtvConfig, RtvError};
use crate::initial::InitialObject;
use crate::page::Page;
use crate::table::SortDirective;

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    RANGE,
}

pub struct Model {
    config: RtvConfig,
    pub status: Status,
    modus: Modus,
    page: Page,
    popup_title: String,
    popup_message: String,
}

impl Model {
    pub fn init(config: &RtvConfig, page: Page) -> Self {
        Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            page,
            popup_title: String::new(),
            popup_message: String::new(),
        }
    }

    /// Ask the server for its table.
    pub fn start(&mut self) -> Result<(), RtvError> {
        InitialObject::instance().load_table(&mut self.page.session)?;
        Ok(())
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn config(&self) -> &RtvConfig {
        &self.config
    }

    /// Title and text of the popup shown over the table, if any.
    pub fn popup(&self) -> Option<(String, Vec<String>)> {
        match self.modus {
            Modus::TABLE => None,
            Modus::POPUP => Some((
                self.popup_title.clone(),
                self.popup_message.lines().map(str::to_string).collect(),
            )),
            Modus::RANGE => self.page.range().map(|r| (r.title(), r.lines())),
        }
    }

    /// Handle replies from the server. Returns the number of replies seen.
    pub fn tick(&mut self) -> usize {
        let handled = self.page.pump();
        if handled > 0 {
            trace!("Handled {handled} replies");
        }
        match (self.modus, self.page.range().is_some()) {
            (Modus::TABLE, true) => self.modus = Modus::RANGE,
            (Modus::RANGE, false) => self.modus = Modus::TABLE,
            _ => {}
        }
        handled
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), RtvError> {
        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveLeft => self.move_selection_left(),
                    Message::MoveRight => self.move_selection_right(),
                    Message::SortAscending => self.show_selected(SortDirective::Ascending)?,
                    Message::SortDescending => self.show_selected(SortDirective::Descending)?,
                    Message::HideColumn => self.show_selected(SortDirective::Hide)?,
                    Message::Histogram => self.histogram()?,
                    Message::AllRows => self.page.show_all_rows()?,
                    Message::NoRows => self.page.no_rows()?,
                    Message::Refresh => self.page.refresh(),
                    Message::Home => self.page.go_home()?,
                    Message::CancelRequests => {
                        let cancelled = self.page.session.cancel_all();
                        info!("Cancelled {cancelled} requests");
                    }
                    Message::Help => self.show_help(),
                    Message::Exit => {}
                },
                Modus::POPUP | Modus::RANGE => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit => self.exit(),
                    _ => (),
                },
            }
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {}
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = Modus::TABLE;
            }
            Modus::RANGE => {
                self.page.close_range();
                self.modus = Modus::TABLE;
            }
        }
    }

    fn show_help(&mut self) {
        self.modus = Modus::POPUP;
        self.popup_title = "Help".to_string();
        self.popup_message = HELP_TEXT.to_string();
    }

    fn selected_column(&self) -> Option<(String, bool)> {
        let cd = self.page.view()?.selected_column_description()?;
        Some((cd.name.clone(), cd.kind.has_range()))
    }

    fn show_selected(&mut self, directive: SortDirective) -> Result<(), RtvError> {
        let Some((name, _)) = self.selected_column() else {
            debug!("No column selected");
            return Ok(());
        };
        self.page.show_column(&name, directive)
    }

    fn histogram(&mut self) -> Result<(), RtvError> {
        let Some((name, has_range)) = self.selected_column() else {
            return Ok(());
        };
        if !has_range {
            self.page
                .session
                .report_error(format!("No range for column {name}"));
            return Ok(());
        }
        self.page.histogram(&name)
    }

    fn move_selection_left(&mut self) {
        if let Some(view) = self.page.view_mut() {
            view.select_previous_column();
        }
    }

    fn move_selection_right(&mut self) {
        if let Some(view) = self.page.view_mut() {
            view.select_next_column();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::{answer, loopback_page, request_of};
    use crate::rpc::{RemoteObjectId, ReplyFrame};
    use crate::transport::loopback::LoopbackTransport;
    use serde_json::json;
    use std::sync::mpsc::Sender;

    fn loaded_model() -> (Model, LoopbackTransport, Sender<ReplyFrame>) {
        let (mut page, transport, replies) = loopback_page();
        page.show_table(RemoteObjectId::new("t")).unwrap();
        answer(
            &replies,
            request_of(&transport, "getSchema").request_id,
            json!({"schema": [
                {"kind": "String", "name": "name", "allowMissing": false},
                {"kind": "Double", "name": "price", "allowMissing": true}
            ], "rowCount": 2}),
        );
        let mut model = Model::init(&RtvConfig::default(), page);
        model.tick();
        (model, transport, replies)
    }

    #[test]
    fn start_prepares_files() {
        let (page, transport, _replies) = loopback_page();
        let mut model = Model::init(&RtvConfig::default(), page);
        model.start().unwrap();
        assert_eq!(request_of(&transport, "prepareFiles").object_id.as_str(), "0");
    }

    #[test]
    fn sorting_uses_the_selected_column() {
        let (mut model, transport, _replies) = loaded_model();
        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::SortDescending)).unwrap();

        let order = model.page().view().unwrap().order();
        assert_eq!(order.len(), 1);
        assert_eq!(order.is_ascending("price"), Some(false));
        assert_eq!(transport.count("getTableView"), 1);

        model.update(Some(Message::HideColumn)).unwrap();
        assert!(model.page().view().unwrap().order().is_empty());
    }

    #[test]
    fn no_rows_clears_the_order() {
        let (mut model, transport, replies) = loaded_model();
        model.update(Some(Message::AllRows)).unwrap();
        answer(
            &replies,
            request_of(&transport, "getTableView").request_id,
            json!({"rowCount": 2, "rows": []}),
        );
        model.tick();
        assert_eq!(model.page().view().unwrap().order().len(), 2);

        model.update(Some(Message::NoRows)).unwrap();
        assert!(model.page().view().unwrap().order().is_empty());
        assert_eq!(transport.count("getTableView"), 2);
        assert_eq!(
            request_of(&transport, "getTableView").arguments,
            json!({"sortOrientationList": []})
        );
    }

    #[test]
    fn no_range_for_strings() {
        let (mut model, transport, _replies) = loaded_model();
        model.update(Some(Message::Histogram)).unwrap();
        assert_eq!(transport.count("range"), 0);
        assert_eq!(model.page().session.last_error(), Some("No range for column name"));
    }

    #[test]
    fn range_popup_opens_and_closes() {
        let (mut model, transport, replies) = loaded_model();
        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::Histogram)).unwrap();
        answer(
            &replies,
            request_of(&transport, "range").request_id,
            json!({"min": 1.5, "max": 3.0, "presentCount": 2, "missingCount": 0}),
        );
        model.tick();

        let (title, lines) = model.popup().unwrap();
        assert_eq!(title, "Range of price");
        assert_eq!(lines[0], "Min:     1.5");

        // Commands other than closing are ignored while the popup is open.
        model.update(Some(Message::AllRows)).unwrap();
        assert_eq!(transport.count("getTableView"), 0);
        model.update(Some(Message::Exit)).unwrap();
        assert!(model.popup().is_none());
        assert!(model.page().range().is_none());
    }

    #[test]
    fn help_popup() {
        let (page, _transport, _replies) = loopback_page();
        let mut model = Model::init(&RtvConfig::default(), page);
        model.update(Some(Message::Help)).unwrap();
        let (title, lines) = model.popup().unwrap();
        assert_eq!(title, "Help");
        assert!(lines.iter().any(|l| l.contains("Quit")));
        model.update(Some(Message::Exit)).unwrap();
        assert!(model.popup().is_none());
        model.update(Some(Message::Quit)).unwrap();
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn cancel_requests_clears_progress() {
        let (mut model, _transport, _replies) = loaded_model();
        model.update(Some(Message::AllRows)).unwrap();
        assert_eq!(model.page().session.progress.active().count(), 1);
        model.update(Some(Message::CancelRequests)).unwrap();
        model.tick();
        assert_eq!(model.page().session.progress.active().count(), 0);
    }
}
