//! Bootstrap chain: the well known root object prepares the set of files,
//! the file set loads a table, and the table is shown on the page.

use std::sync::OnceLock;

use tracing::{debug, info};

use crate::domain::RtvError;
use crate::page::{Page, Session};
use crate::rpc::{Observer, RemoteObject, RemoteObjectId, RequestHandle};

/// Identifier the server gives its root object.
pub const INITIAL_OBJECT_ID: &str = "0";

pub struct InitialObject {
    remote: RemoteObject,
}

static INSTANCE: OnceLock<InitialObject> = OnceLock::new();

impl InitialObject {
    pub fn instance() -> &'static InitialObject {
        INSTANCE.get_or_init(|| InitialObject {
            remote: RemoteObject::new(RemoteObjectId::new(INITIAL_OBJECT_ID)),
        })
    }

    #[cfg(test)]
    pub fn id(&self) -> &RemoteObjectId {
        self.remote.id()
    }

    pub fn load_table(&self, session: &mut Session) -> Result<RequestHandle, RtvError> {
        info!("Preparing files");
        let request = self.remote.create_rpc_request("prepareFiles", ())?;
        Ok(session.invoke(request, FileNamesReceiver::default()))
    }
}

/// Server side set of input files.
pub struct FileNames {
    remote: RemoteObject,
}

impl FileNames {
    pub fn new(id: RemoteObjectId) -> Self {
        Self {
            remote: RemoteObject::new(id),
        }
    }

    pub fn load_table(&self, session: &mut Session) -> Result<RequestHandle, RtvError> {
        let request = self.remote.create_rpc_request("loadTable", ())?;
        Ok(session.invoke(request, RemoteTableReceiver::default()))
    }
}

#[derive(Default)]
pub struct FileNamesReceiver {
    files: Option<FileNames>,
}

impl Observer<Option<RemoteObjectId>> for FileNamesReceiver {
    fn description(&self) -> &'static str {
        "Find files"
    }

    // The identifier comes back bare, without progress.
    fn reports_progress(&self) -> bool {
        false
    }

    // Only one value is expected.
    fn on_next(&mut self, value: Option<RemoteObjectId>, _page: &mut Page) {
        if let Some(id) = value {
            self.files = Some(FileNames::new(id));
        }
    }

    fn on_completed(&mut self, page: &mut Page) {
        let Some(files) = self.files.take() else {
            debug!("No files were prepared");
            return;
        };
        if let Err(e) = files.load_table(&mut page.session) {
            page.session.report_error(format!("Loading table: {e}"));
        }
    }
}

#[derive(Default)]
pub struct RemoteTableReceiver {
    table: Option<RemoteObjectId>,
}

impl Observer<Option<RemoteObjectId>> for RemoteTableReceiver {
    fn description(&self) -> &'static str {
        "Get schema"
    }

    fn on_next(&mut self, value: Option<RemoteObjectId>, _page: &mut Page) {
        if value.is_some() {
            self.table = value;
        }
    }

    fn on_completed(&mut self, page: &mut Page) {
        let Some(id) = self.table.take() else {
            debug!("No table was loaded");
            return;
        };
        info!("Showing table {id}");
        if let Err(e) = page.show_table(id) {
            page.session.report_error(format!("Showing table: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::{answer, loopback_page, request_of, send_reply};
    use crate::rpc::Reply;
    use serde_json::{json, Value};

    #[test]
    fn instance_is_the_root_object() {
        assert_eq!(InitialObject::instance().id().as_str(), "0");
        assert!(std::ptr::eq(InitialObject::instance(), InitialObject::instance()));
    }

    #[test]
    fn bootstrap_reaches_the_table() {
        let (mut page, transport, replies) = loopback_page();
        InitialObject::instance().load_table(&mut page.session).unwrap();
        let prepare = request_of(&transport, "prepareFiles");
        assert_eq!(prepare.object_id.as_str(), INITIAL_OBJECT_ID);
        assert_eq!(prepare.arguments, Value::Null);

        send_reply(&replies, prepare.request_id, Reply::Next { result: json!("files-1") });
        send_reply(&replies, prepare.request_id, Reply::Completed);
        page.pump();
        let load = request_of(&transport, "loadTable");
        assert_eq!(load.object_id.as_str(), "files-1");

        answer(&replies, load.request_id, json!("table-1"));
        page.pump();
        let schema = request_of(&transport, "getSchema");
        assert_eq!(schema.object_id.as_str(), "table-1");
        assert_eq!(page.view().unwrap().id().as_str(), "table-1");
        assert_eq!(page.initial_table_id().unwrap().as_str(), "table-1");
    }

    #[test]
    fn wrapped_file_set_is_an_unexpected_reply() {
        let (mut page, transport, replies) = loopback_page();
        let handle = InitialObject::instance().load_table(&mut page.session).unwrap();
        answer(&replies, handle.id, json!("files-1"));
        page.pump();

        assert_eq!(transport.count("loadTable"), 0);
        assert!(page
            .session
            .last_error()
            .unwrap()
            .starts_with("Find files: unexpected reply"));
    }

    #[test]
    fn missing_file_set_stops_silently() {
        let (mut page, transport, replies) = loopback_page();
        let handle = InitialObject::instance().load_table(&mut page.session).unwrap();
        send_reply(&replies, handle.id, Reply::Completed);
        page.pump();

        assert_eq!(transport.sent().len(), 1);
        assert!(page.view().is_none());
        assert!(page.session.last_error().is_none());
        assert_eq!(page.session.progress.active().count(), 0);
    }

    #[test]
    fn null_table_stops_silently() {
        let (mut page, transport, replies) = loopback_page();
        let handle = FileNames::new(RemoteObjectId::new("files-1"))
            .load_table(&mut page.session)
            .unwrap();
        answer(&replies, handle.id, Value::Null);
        page.pump();

        assert_eq!(transport.count("getSchema"), 0);
        assert!(page.view().is_none());
    }

    #[test]
    fn failed_prepare_is_reported() {
        let (mut page, transport, replies) = loopback_page();
        let handle = InitialObject::instance().load_table(&mut page.session).unwrap();
        send_reply(
            &replies,
            handle.id,
            Reply::Error {
                message: "no such directory".into(),
            },
        );
        page.pump();

        assert_eq!(page.session.last_error(), Some("Find files: no such directory"));
        assert_eq!(transport.count("loadTable"), 0);
    }
}
