//! Remote objects and the streaming request protocol.
//!
//! Every server side object is mirrored by a [`RemoteObject`] holding only its
//! identifier. A request sent to it answers with zero or more values followed
//! by exactly one terminal event. The values of one request are consumed by an
//! [`RpcReceiver`], which owns the progress bar of the request and forwards the
//! decoded values to an [`Observer`].

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::domain::RtvError;
use crate::page::{Page, ProgressBarId};
use crate::transport::Transport;

pub type RequestId = u64;

/// Identifier the server assigned to one of its objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteObjectId(String);

impl RemoteObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local handle of a server side object.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    id: RemoteObjectId,
}

impl RemoteObject {
    pub fn new(id: RemoteObjectId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &RemoteObjectId {
        &self.id
    }

    pub fn create_rpc_request(
        &self,
        method: &str,
        arguments: impl Serialize,
    ) -> Result<RpcRequest, RtvError> {
        Ok(RpcRequest {
            object_id: self.id.clone(),
            method: method.to_string(),
            arguments: serde_json::to_value(arguments)?,
        })
    }
}

/// A request that has not been sent yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub object_id: RemoteObjectId,
    pub method: String,
    pub arguments: Value,
}

/// Returned when a request is sent; used to cancel it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHandle {
    pub id: RequestId,
    pub object_id: RemoteObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    pub request_id: RequestId,
    pub object_id: RemoteObjectId,
    pub method: String,
    pub arguments: Value,
}

pub const CANCEL_METHOD: &str = "cancel";

impl RequestFrame {
    fn new(request_id: RequestId, request: RpcRequest) -> Self {
        Self {
            request_id,
            object_id: request.object_id,
            method: request.method,
            arguments: request.arguments,
        }
    }

    fn cancel(request_id: RequestId, object_id: RemoteObjectId) -> Self {
        Self {
            request_id,
            object_id,
            method: CANCEL_METHOD.to_string(),
            arguments: Value::Null,
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.method == CANCEL_METHOD
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    Next { result: Value },
    Error { message: String },
    Completed,
    /// Produced locally when a request is cancelled; never sent by the server.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFrame {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub reply: Reply,
}

impl ReplyFrame {
    pub fn new(request_id: RequestId, reply: Reply) -> Self {
        Self { request_id, reply }
    }
}

/// Streamed value together with the fraction of the work done so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult<T> {
    pub done: f64,
    pub data: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Active,
    Finished,
}

/// Consumer of the values of one request.
pub trait Observer<T> {
    /// Shown next to the progress bar while the request runs.
    fn description(&self) -> &'static str;

    fn on_next(&mut self, value: T, page: &mut Page);

    /// Whether values arrive wrapped in a [`PartialResult`] carrying progress.
    fn reports_progress(&self) -> bool {
        true
    }

    /// Called exactly once, after completion, cancellation or an error.
    fn on_completed(&mut self, _page: &mut Page) {}
}

/// Type erased receiver, stored by the client until the request finishes.
pub trait ReplyHandler {
    fn handle(&mut self, reply: Reply, page: &mut Page) -> ReceiverState;
}

pub struct RpcReceiver<T, O> {
    request_id: RequestId,
    progress_bar: ProgressBarId,
    state: ReceiverState,
    observer: O,
    value: PhantomData<fn() -> T>,
}

impl<T, O: Observer<T>> RpcReceiver<T, O> {
    pub fn new(request_id: RequestId, progress_bar: ProgressBarId, observer: O) -> Self {
        Self {
            request_id,
            progress_bar,
            state: ReceiverState::Active,
            observer,
            value: PhantomData,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    fn decode(&self, result: Value) -> Result<(Option<f64>, T), serde_json::Error>
    where
        T: DeserializeOwned,
    {
        if self.observer.reports_progress() {
            let partial: PartialResult<T> = serde_json::from_value(result)?;
            Ok((Some(partial.done), partial.data))
        } else {
            Ok((None, serde_json::from_value(result)?))
        }
    }

    fn finished(&mut self, page: &mut Page) {
        if self.state == ReceiverState::Finished {
            return;
        }
        self.state = ReceiverState::Finished;
        page.session.progress.release(self.progress_bar);
        self.observer.on_completed(page);
    }
}

impl<T: DeserializeOwned, O: Observer<T>> ReplyHandler for RpcReceiver<T, O> {
    fn handle(&mut self, reply: Reply, page: &mut Page) -> ReceiverState {
        if self.state == ReceiverState::Finished {
            trace!("Request {} already finished, ignoring {reply:?}", self.request_id);
            return self.state;
        }

        match reply {
            Reply::Next { result } => match self.decode(result) {
                Ok((done, value)) => {
                    if let Some(done) = done {
                        page.session.progress.set_progress(self.progress_bar, done);
                    }
                    self.observer.on_next(value, page);
                }
                Err(e) => {
                    page.session.report_error(format!(
                        "{}: unexpected reply: {e}",
                        self.observer.description()
                    ));
                    self.finished(page);
                }
            },
            Reply::Error { message } => {
                page.session
                    .report_error(format!("{}: {message}", self.observer.description()));
                self.finished(page);
            }
            Reply::Completed => self.finished(page),
            Reply::Cancelled => {
                debug!("Request {} cancelled", self.request_id);
                self.finished(page);
            }
        }
        self.state
    }
}

struct PendingRequest {
    object_id: RemoteObjectId,
    handler: Box<dyn ReplyHandler>,
}

/// Sends requests and routes replies back to their receivers.
pub struct RpcClient {
    transport: Box<dyn Transport>,
    replies: Receiver<ReplyFrame>,
    local: Sender<ReplyFrame>,
    pending: HashMap<RequestId, PendingRequest>,
    next_request_id: RequestId,
}

impl RpcClient {
    /// `local` must feed the same channel `replies` reads from; it is used to
    /// deliver cancellations and send failures in order with server replies.
    pub fn new(
        transport: Box<dyn Transport>,
        local: Sender<ReplyFrame>,
        replies: Receiver<ReplyFrame>,
    ) -> Self {
        Self {
            transport,
            replies,
            local,
            pending: HashMap::new(),
            next_request_id: 1,
        }
    }

    pub fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn send(
        &mut self,
        request_id: RequestId,
        request: RpcRequest,
        handler: Box<dyn ReplyHandler>,
    ) -> RequestHandle {
        let handle = RequestHandle {
            id: request_id,
            object_id: request.object_id.clone(),
        };
        debug!(
            "Request {request_id}: {}.{}({})",
            request.object_id, request.method, request.arguments
        );
        self.pending.insert(
            request_id,
            PendingRequest {
                object_id: handle.object_id.clone(),
                handler,
            },
        );

        let frame = RequestFrame::new(request_id, request);
        if let Err(e) = self.transport.send(&frame) {
            warn!("Sending request {request_id} failed: {e}");
            self.push_local(ReplyFrame::new(
                request_id,
                Reply::Error {
                    message: e.to_string(),
                },
            ));
        }
        handle
    }

    /// Cancel a running request. Its receiver still sees a terminal event.
    /// Returns `false` if the request already finished.
    pub fn cancel(&mut self, request_id: RequestId) -> bool {
        let Some(pending) = self.pending.get(&request_id) else {
            trace!("Request {request_id} is not running, nothing to cancel");
            return false;
        };
        let frame = RequestFrame::cancel(request_id, pending.object_id.clone());
        if let Err(e) = self.transport.send(&frame) {
            warn!("Sending cancellation of request {request_id} failed: {e}");
        }
        self.push_local(ReplyFrame::new(request_id, Reply::Cancelled));
        true
    }

    #[cfg(test)]
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn try_next_reply(&self) -> Result<ReplyFrame, TryRecvError> {
        self.replies.try_recv()
    }

    pub(crate) fn take_handler(&mut self, request_id: RequestId) -> Option<(RemoteObjectId, Box<dyn ReplyHandler>)> {
        self.pending
            .remove(&request_id)
            .map(|p| (p.object_id, p.handler))
    }

    pub(crate) fn restore_handler(
        &mut self,
        request_id: RequestId,
        object_id: RemoteObjectId,
        handler: Box<dyn ReplyHandler>,
    ) {
        self.pending
            .insert(request_id, PendingRequest { object_id, handler });
    }

    fn push_local(&self, frame: ReplyFrame) {
        if self.local.send(frame).is_err() {
            warn!("Reply channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::{loopback_page, request_of, send_reply};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Events {
        values: Vec<u64>,
        completed: usize,
    }

    struct Recorder(Rc<RefCell<Events>>);

    impl Observer<u64> for Recorder {
        fn description(&self) -> &'static str {
            "Counting"
        }

        fn on_next(&mut self, value: u64, _page: &mut Page) {
            self.0.borrow_mut().values.push(value);
        }

        fn on_completed(&mut self, _page: &mut Page) {
            self.0.borrow_mut().completed += 1;
        }
    }

    fn start(page: &mut Page) -> (RequestHandle, Rc<RefCell<Events>>) {
        let events = Rc::new(RefCell::new(Events::default()));
        let remote = RemoteObject::new(RemoteObjectId::new("7"));
        let request = remote.create_rpc_request("count", ()).unwrap();
        let handle = page.session.invoke(request, Recorder(events.clone()));
        (handle, events)
    }

    #[test]
    fn completion_fires_once_without_values() {
        let (mut page, transport, replies) = loopback_page();
        let (handle, events) = start(&mut page);
        assert_eq!(page.session.progress.active().count(), 1);

        send_reply(&replies, handle.id, Reply::Completed);
        page.pump();

        assert!(events.borrow().values.is_empty());
        assert_eq!(events.borrow().completed, 1);
        assert_eq!(page.session.progress.active().count(), 0);
        assert!(!page.session.rpc.is_pending(handle.id));
        assert_eq!(request_of(&transport, "count").arguments, Value::Null);
    }

    #[test]
    fn cancellation_mid_stream_completes_once() {
        let (mut page, transport, replies) = loopback_page();
        let (handle, events) = start(&mut page);

        send_reply(&replies, handle.id, Reply::Next { result: json!({"done": 0.5, "data": 1}) });
        page.pump();
        assert!(page.session.rpc.cancel(handle.id));
        // The server did not see the cancellation in time.
        send_reply(&replies, handle.id, Reply::Next { result: json!({"done": 1.0, "data": 2}) });
        send_reply(&replies, handle.id, Reply::Completed);
        page.pump();

        assert_eq!(events.borrow().values, vec![1]);
        assert_eq!(events.borrow().completed, 1);
        assert_eq!(page.session.progress.active().count(), 0);
        assert!(request_of(&transport, CANCEL_METHOD).is_cancel());
        assert!(!page.session.rpc.cancel(handle.id));
    }

    #[test]
    fn values_after_completion_are_ignored() {
        let (mut page, _transport, _replies) = loopback_page();
        let events = Rc::new(RefCell::new(Events::default()));
        let bar = page.session.progress.new_progress_bar(1, "Counting");
        let mut receiver = RpcReceiver::new(1, bar, Recorder(events.clone()));

        let state = receiver.handle(Reply::Next { result: json!({"done": 0.1, "data": 5}) }, &mut page);
        assert_eq!(state, ReceiverState::Active);
        receiver.handle(Reply::Completed, &mut page);
        let state = receiver.handle(Reply::Next { result: json!({"done": 1.0, "data": 6}) }, &mut page);
        receiver.handle(Reply::Cancelled, &mut page);

        assert_eq!(state, ReceiverState::Finished);
        assert_eq!(receiver.state(), ReceiverState::Finished);
        assert_eq!(events.borrow().values, vec![5]);
        assert_eq!(events.borrow().completed, 1);
    }

    #[test]
    fn malformed_value_is_reported_and_finishes() {
        let (mut page, _transport, replies) = loopback_page();
        let (handle, events) = start(&mut page);

        send_reply(&replies, handle.id, Reply::Next { result: json!({"done": 0.5, "data": "many"}) });
        page.pump();

        assert_eq!(events.borrow().completed, 1);
        assert!(page.session.last_error().unwrap().starts_with("Counting"));
        assert!(!page.session.rpc.is_pending(handle.id));
    }

    #[test]
    fn server_error_is_reported_and_finishes() {
        let (mut page, _transport, replies) = loopback_page();
        let (handle, events) = start(&mut page);

        send_reply(&replies, handle.id, Reply::Error { message: "table is gone".into() });
        send_reply(&replies, handle.id, Reply::Completed);
        page.pump();

        assert_eq!(events.borrow().completed, 1);
        assert_eq!(page.session.last_error(), Some("Counting: table is gone"));
    }

    #[test]
    fn send_failure_still_reaches_completion() {
        let (mut page, transport, _replies) = loopback_page();
        transport.fail_sends(true);
        let (_handle, events) = start(&mut page);
        page.pump();

        assert_eq!(events.borrow().completed, 1);
        assert_eq!(page.session.progress.active().count(), 0);
        assert!(page.session.last_error().is_some());
    }

    #[test]
    fn reply_frames_match_the_wire_shape() {
        let frame: ReplyFrame = serde_json::from_value(json!({
            "requestId": 3, "type": "next", "result": {"done": 1.0, "data": "12"}
        }))
        .unwrap();
        assert_eq!(frame.request_id, 3);
        assert!(matches!(frame.reply, Reply::Next { .. }));

        let frame: ReplyFrame =
            serde_json::from_value(json!({"requestId": 3, "type": "completed"})).unwrap();
        assert_eq!(frame.reply, Reply::Completed);

        let request = RequestFrame::new(
            4,
            RemoteObject::new(RemoteObjectId::new("0"))
                .create_rpc_request("prepareFiles", ())
                .unwrap(),
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"requestId": 4, "objectId": "0", "method": "prepareFiles", "arguments": null})
        );
    }
}
