use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::domain::RtvError;
use crate::rpc::{Reply, ReplyFrame, RequestFrame, RequestId};

/// How long the connection worker blocks on the socket before it looks at
/// the outgoing queue again.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Carries request frames to the server. Replies come back through the
/// channel handed to the transport when it is created.
pub trait Transport {
    fn send(&mut self, frame: &RequestFrame) -> Result<(), RtvError>;
}

/// Websocket connection served by a background thread. The thread only moves
/// frames; all replies are handled on the thread that owns the page.
pub struct WsTransport {
    outgoing: Option<Sender<RequestFrame>>,
    worker: Option<JoinHandle<()>>,
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

impl WsTransport {
    pub fn connect(url: &str, replies: Sender<ReplyFrame>) -> Result<Self, RtvError> {
        info!("Connecting to {url} ...");
        let (mut socket, _response) = tungstenite::connect(url)?;
        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream.set_read_timeout(Some(READ_TIMEOUT))?;
        }

        let (outgoing, queue) = mpsc::channel::<RequestFrame>();
        let worker = thread::Builder::new()
            .name("rtv-connection".to_string())
            .spawn(move || Self::connection_loop(socket, queue, replies))?;

        Ok(Self {
            outgoing: Some(outgoing),
            worker: Some(worker),
        })
    }

    fn connection_loop(mut socket: Socket, queue: Receiver<RequestFrame>, replies: Sender<ReplyFrame>) {
        // Requests the server still owes a terminal reply for.
        let mut running: HashSet<RequestId> = HashSet::new();

        'connection: loop {
            loop {
                match queue.try_recv() {
                    Ok(frame) => {
                        if frame.is_cancel() {
                            running.remove(&frame.request_id);
                        } else {
                            running.insert(frame.request_id);
                        }
                        if let Err(e) = Self::write_frame(&mut socket, &frame) {
                            error!("Writing request {} failed: {e}", frame.request_id);
                            break 'connection;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("Transport dropped, closing connection");
                        let _ = socket.close(None);
                        let _ = socket.flush();
                        break 'connection;
                    }
                }
            }

            match socket.read() {
                Ok(Message::Text(text)) => match serde_json::from_str::<ReplyFrame>(text.as_str()) {
                    Ok(frame) => {
                        if matches!(frame.reply, Reply::Completed | Reply::Error { .. }) {
                            running.remove(&frame.request_id);
                        }
                        if replies.send(frame).is_err() {
                            break 'connection;
                        }
                    }
                    Err(e) => warn!("Dropping malformed reply: {e}"),
                },
                Ok(Message::Close(_)) => {
                    info!("Server closed the connection");
                    break 'connection;
                }
                Ok(other) => trace!("Ignoring websocket message {other:?}"),
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => {
                    error!("Connection failed: {e}");
                    break 'connection;
                }
            }
        }

        // Whatever is still running will never complete.
        for request_id in running {
            let frame = ReplyFrame::new(
                request_id,
                Reply::Error {
                    message: RtvError::ConnectionClosed.to_string(),
                },
            );
            if replies.send(frame).is_err() {
                break;
            }
        }
    }

    fn write_frame(socket: &mut Socket, frame: &RequestFrame) -> Result<(), RtvError> {
        let json = serde_json::to_string(frame)?;
        socket.send(Message::text(json))?;
        Ok(())
    }
}

impl Transport for WsTransport {
    fn send(&mut self, frame: &RequestFrame) -> Result<(), RtvError> {
        let outgoing = self.outgoing.as_ref().ok_or(RtvError::ConnectionClosed)?;
        outgoing
            .send(frame.clone())
            .map_err(|_| RtvError::ConnectionClosed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        // Closing the queue stops the worker.
        self.outgoing.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
