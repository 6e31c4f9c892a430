//! The page ties one server session together: it owns the RPC client, the
//! progress and error reporting, and the table view currently shown.

use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::{debug, error, trace, warn};

use crate::domain::RtvError;
use crate::histogram::RangeView;
use crate::rpc::{
    Observer, ReceiverState, RemoteObjectId, RequestHandle, RequestId, RpcClient, RpcReceiver,
    RpcRequest,
};
use crate::table::{SortDirective, TableView, ViewSerial};

pub type ProgressBarId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressBar {
    pub id: ProgressBarId,
    pub request_id: RequestId,
    pub description: &'static str,
    pub done: f64,
}

/// Progress bars of running requests. Each bar is released exactly once,
/// when its request reaches a terminal event.
#[derive(Debug, Default)]
pub struct ProgressManager {
    bars: Vec<ProgressBar>,
    next_id: ProgressBarId,
}

impl ProgressManager {
    pub fn new_progress_bar(&mut self, request_id: RequestId, description: &'static str) -> ProgressBarId {
        let id = self.next_id;
        self.next_id += 1;
        self.bars.push(ProgressBar {
            id,
            request_id,
            description,
            done: 0.0,
        });
        id
    }

    pub fn set_progress(&mut self, id: ProgressBarId, done: f64) {
        if let Some(bar) = self.bars.iter_mut().find(|b| b.id == id) {
            bar.done = done.clamp(0.0, 1.0);
        }
    }

    /// Returns `false` if the bar was already released.
    pub fn release(&mut self, id: ProgressBarId) -> bool {
        match self.bars.iter().position(|b| b.id == id) {
            Some(idx) => {
                self.bars.remove(idx);
                true
            }
            None => {
                warn!("Progress bar {id} released twice");
                false
            }
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &ProgressBar> {
        self.bars.iter()
    }
}

/// Services used by views and observers: sending requests and reporting.
pub struct Session {
    pub rpc: RpcClient,
    pub progress: ProgressManager,
    last_error: Option<String>,
    last_error_update: Instant,
}

impl Session {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            progress: ProgressManager::default(),
            last_error: None,
            last_error_update: Instant::now(),
        }
    }

    /// Send a request whose values are consumed by `observer`.
    pub fn invoke<T, O>(&mut self, request: RpcRequest, observer: O) -> RequestHandle
    where
        T: DeserializeOwned + 'static,
        O: Observer<T> + 'static,
    {
        let request_id = self.rpc.next_request_id();
        let bar = self
            .progress
            .new_progress_bar(request_id, observer.description());
        let receiver = RpcReceiver::new(request_id, bar, observer);
        self.rpc.send(request_id, request, Box::new(receiver))
    }

    pub fn cancel(&mut self, handle: &RequestHandle) -> bool {
        self.rpc.cancel(handle.id)
    }

    /// Cancel every request that still shows a progress bar.
    pub fn cancel_all(&mut self) -> usize {
        let running: Vec<RequestId> = self.progress.active().map(|b| b.request_id).collect();
        running
            .into_iter()
            .filter(|&request_id| self.rpc.cancel(request_id))
            .count()
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.last_error = Some(message);
        self.last_error_update = Instant::now();
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_error_update(&self) -> Instant {
        self.last_error_update
    }
}

pub struct Page {
    pub session: Session,
    view: Option<TableView>,
    // First table of the session, target of "home".
    initial_table_id: Option<RemoteObjectId>,
    next_view_serial: ViewSerial,
    range: Option<RangeView>,
}

impl Page {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            session: Session::new(rpc),
            view: None,
            initial_table_id: None,
            next_view_serial: 0,
            range: None,
        }
    }

    /// Dispatch every reply that arrived since the last call.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(frame) = self.session.rpc.try_next_reply() {
            handled += 1;
            let request_id = frame.request_id;
            let Some((object_id, mut handler)) = self.session.rpc.take_handler(request_id) else {
                trace!("Dropping reply for finished request {request_id}");
                continue;
            };
            if handler.handle(frame.reply, self) == ReceiverState::Active {
                self.session
                    .rpc
                    .restore_handler(request_id, object_id, handler);
            }
        }
        handled
    }

    pub fn view(&self) -> Option<&TableView> {
        self.view.as_ref()
    }

    pub fn view_mut(&mut self) -> Option<&mut TableView> {
        self.view.as_mut()
    }

    /// The current view, if it is still the one identified by `serial`.
    pub fn view_for(&mut self, serial: ViewSerial) -> Option<&mut TableView> {
        self.view.as_mut().filter(|v| v.serial() == serial)
    }

    #[cfg(test)]
    pub fn initial_table_id(&self) -> Option<&RemoteObjectId> {
        self.initial_table_id.as_ref()
    }

    pub fn set_data_view(&mut self, view: TableView) {
        if let Some(mut old) = self.view.take() {
            old.cancel_pending(&mut self.session);
        }
        self.range = None;
        self.view = Some(view);
    }

    pub fn new_table_view(&mut self, id: RemoteObjectId) -> ViewSerial {
        if self.initial_table_id.is_none() {
            debug!("Home table is {id}");
            self.initial_table_id = Some(id.clone());
        }
        let serial = self.next_view_serial;
        self.next_view_serial += 1;
        self.set_data_view(TableView::new(id, serial));
        serial
    }

    /// Show the table `id` and fetch its schema.
    pub fn show_table(&mut self, id: RemoteObjectId) -> Result<(), RtvError> {
        self.new_table_view(id);
        match self.view.as_mut() {
            Some(view) => view.get_schema(&mut self.session),
            None => Ok(()),
        }
    }

    /// Return to the first table of the session.
    pub fn go_home(&mut self) -> Result<(), RtvError> {
        let Some(id) = self.initial_table_id.clone() else {
            debug!("No table loaded yet, staying here");
            return Ok(());
        };
        self.show_table(id)
    }

    pub fn no_rows(&mut self) -> Result<(), RtvError> {
        match self.view.as_mut() {
            Some(view) => view.no_rows(&mut self.session),
            None => Ok(()),
        }
    }

    pub fn show_all_rows(&mut self) -> Result<(), RtvError> {
        match self.view.as_mut() {
            Some(view) => view.show_all_rows(&mut self.session),
            None => {
                self.session.report_error("No data loaded");
                Ok(())
            }
        }
    }

    pub fn show_column(&mut self, column: &str, directive: SortDirective) -> Result<(), RtvError> {
        match self.view.as_mut() {
            Some(view) => view.show_column(column, directive, &mut self.session),
            None => Ok(()),
        }
    }

    pub fn histogram(&mut self, column: &str) -> Result<(), RtvError> {
        match self.view.as_mut() {
            Some(view) => view.histogram(column, &mut self.session),
            None => Ok(()),
        }
    }

    pub fn refresh(&mut self) {
        match self.view.as_mut() {
            Some(view) => view.refresh(&mut self.session),
            None => self.session.report_error("Nothing to refresh"),
        }
    }

    pub fn range(&self) -> Option<&RangeView> {
        self.range.as_ref()
    }

    pub fn show_range(&mut self, range: RangeView) {
        self.range = Some(range);
    }

    pub fn close_range(&mut self) {
        self.range = None;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{answer, loopback_page, request_of};
    use super::*;
    use serde_json::json;

    fn schema_snapshot() -> serde_json::Value {
        json!({
            "schema": [{"kind": "Integer", "name": "A", "allowMissing": false}],
            "rowCount": 5
        })
    }

    #[test]
    fn go_home_returns_to_first_table() {
        let (mut page, transport, replies) = loopback_page();
        page.show_table(RemoteObjectId::new("t1")).unwrap();
        answer(&replies, request_of(&transport, "getSchema").request_id, schema_snapshot());
        page.pump();
        page.show_table(RemoteObjectId::new("t2")).unwrap();
        page.show_table(RemoteObjectId::new("t3")).unwrap();
        assert_eq!(page.view().unwrap().id().as_str(), "t3");

        page.go_home().unwrap();

        let view = page.view().unwrap();
        assert_eq!(view.id().as_str(), "t1");
        assert!(view.current_data().is_none());
        let request = request_of(&transport, "getSchema");
        assert_eq!(request.object_id.as_str(), "t1");
        assert_eq!(page.initial_table_id().unwrap().as_str(), "t1");
    }

    #[test]
    fn go_home_without_tables_does_nothing() {
        let (mut page, transport, _replies) = loopback_page();
        page.go_home().unwrap();
        assert!(page.view().is_none());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn replaced_view_ignores_late_snapshots() {
        let (mut page, transport, replies) = loopback_page();
        page.show_table(RemoteObjectId::new("t1")).unwrap();
        let first = request_of(&transport, "getSchema").request_id;
        page.show_table(RemoteObjectId::new("t2")).unwrap();
        // Replacing the view cancelled the first request.
        assert_eq!(transport.count(crate::rpc::CANCEL_METHOD), 1);

        answer(&replies, first, schema_snapshot());
        page.pump();

        let view = page.view().unwrap();
        assert_eq!(view.id().as_str(), "t2");
        assert!(view.current_data().is_none());
        assert_eq!(page.session.progress.active().count(), 1);
    }

    #[test]
    fn progress_bars_are_released_once() {
        let mut progress = ProgressManager::default();
        let a = progress.new_progress_bar(1, "a");
        let b = progress.new_progress_bar(2, "b");
        progress.set_progress(a, 3.0);
        assert_eq!(progress.active().next().unwrap().done, 1.0);
        assert!(progress.release(a));
        assert!(!progress.release(a));
        assert_eq!(progress.active().map(|p| p.id).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn cancel_all_finishes_every_request() {
        let (mut page, _transport, _replies) = loopback_page();
        page.show_table(RemoteObjectId::new("t1")).unwrap();
        page.histogram("A").unwrap();
        assert_eq!(page.session.progress.active().count(), 1);

        assert_eq!(page.session.cancel_all(), 1);
        page.pump();

        assert_eq!(page.session.progress.active().count(), 0);
        assert_eq!(page.session.rpc.pending_count(), 0);
    }

    #[test]
    fn show_all_rows_without_view_reports() {
        let (mut page, _transport, _replies) = loopback_page();
        page.show_all_rows().unwrap();
        assert_eq!(page.session.last_error(), Some("No data loaded"));
        page.refresh();
        assert_eq!(page.session.last_error(), Some("Nothing to refresh"));
    }
}
