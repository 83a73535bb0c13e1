//! Device session with the assigned hub.
//!
//! A single WebSocket carries device-to-cloud telemetry and the
//! cloud-to-device method channel. A background reader task routes each
//! inbound method request to the queue registered for its method name;
//! callers block on [`MethodRequests::recv`] to receive invocations.
//!
//! ```rust,ignore
//! let session = HubSession::connect(url, &device_key, &tls, cancel.child_token()).await?;
//! let mut requests = session.method_requests("RuuviGate_250*GetRuuviTags");
//! while let Some(req) = requests.recv().await {
//!     session.respond(&MethodResponse::for_request(&req, 200, json!([]))).await?;
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::message::{InboundFrame, MethodRequest, MethodResponse, OutboundFrame, TelemetryMessage};
use crate::provisioning::{Assignment, auth_header};
use crate::transport::TlsMode;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Status sent back for method names nobody is listening on.
const STATUS_NO_LISTENER: u16 = 404;

/// Build the session URL for an assignment.
///
/// A bare host becomes `wss://{host}/devices/{device_id}/session`; an
/// assigned hub that already carries a `ws://` or `wss://` scheme is used
/// as the base as-is.
pub fn session_url(assignment: &Assignment) -> Result<Url, Error> {
    let base = if assignment.assigned_hub.contains("://") {
        Url::parse(&assignment.assigned_hub)?
    } else {
        Url::parse(&format!("wss://{}", assignment.assigned_hub))?
    };
    let mut url = base;
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(["devices", assignment.device_id.as_str(), "session"]);
    Ok(url)
}

// ── HubSession ───────────────────────────────────────────────────────

/// Handle to an open device session.
///
/// Cheaply cloneable; all clones share the same connection.
#[derive(Clone)]
pub struct HubSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    writer: Mutex<SplitSink<WsStream, Message>>,
    routes: DashMap<String, mpsc::UnboundedSender<MethodRequest>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

/// Queue of inbound invocations for one method name.
pub struct MethodRequests {
    method_name: String,
    rx: mpsc::UnboundedReceiver<MethodRequest>,
}

impl MethodRequests {
    /// Wait for the next invocation.
    ///
    /// Returns `None` once the session is closed. Cancel-safe: dropping the
    /// future loses no request.
    pub async fn recv(&mut self) -> Option<MethodRequest> {
        self.rx.recv().await
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl HubSession {
    /// Open the session and spawn the inbound reader task.
    ///
    /// `tls` decides which CAs a `wss://` hub may present. The reader stops
    /// when `cancel` fires, the hub closes the socket, or
    /// [`close`](Self::close) is called.
    pub async fn connect(
        url: &Url,
        device_key: &SecretString,
        tls: &TlsMode,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        info!(url = %url, "opening hub session");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_header("Authorization", auth_header(device_key));

        let connector = tls.session_connector()?;
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| match e {
                    tungstenite::Error::Http(resp)
                        if resp.status() == 401 || resp.status() == 403 =>
                    {
                        Error::Authentication {
                            message: format!("hub rejected the session (HTTP {})", resp.status()),
                        }
                    }
                    other => Error::WebSocketConnect(other.to_string()),
                })?;
        let (write, read) = ws_stream.split();

        let inner = Arc::new(SessionInner {
            writer: Mutex::new(write),
            routes: DashMap::new(),
            closed: AtomicBool::new(false),
            cancel,
        });
        tokio::spawn(read_loop(Arc::clone(&inner), read));

        info!("hub session established");
        Ok(Self { inner })
    }

    /// Register interest in a method and get its request queue.
    ///
    /// Registering the same name again replaces the previous queue.
    pub fn method_requests(&self, method_name: &str) -> MethodRequests {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.routes.insert(method_name.to_owned(), tx);
        // The reader may have shut down between the insert and now; make
        // sure the queue observes the closure instead of waiting forever.
        if self.is_closed() {
            self.inner.routes.remove(method_name);
        }
        debug!(method = method_name, "method listener registered");
        MethodRequests {
            method_name: method_name.to_owned(),
            rx,
        }
    }

    /// Send one telemetry message.
    pub async fn send_telemetry(&self, message: &TelemetryMessage) -> Result<(), Error> {
        self.inner
            .send_frame("telemetry", &OutboundFrame::Telemetry(message))
            .await?;
        debug!(message_id = %message.message_id, "telemetry sent");
        Ok(())
    }

    /// Answer a method request.
    pub async fn respond(&self, response: &MethodResponse) -> Result<(), Error> {
        self.inner
            .send_frame("method response", &OutboundFrame::MethodResponse(response))
            .await
    }

    /// Whether the session has stopped (closed by either side).
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the session: stop the reader and send a close frame.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.send(Message::Close(None)).await {
            debug!(error = %e, "close frame not delivered");
        }
        info!("hub session closed");
    }
}

impl SessionInner {
    async fn send_frame(&self, what: &'static str, frame: &OutboundFrame<'_>) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        let text = serde_json::to_string(frame)?;
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::text(text))
            .await
            .map_err(|e| Error::Send {
                what,
                reason: e.to_string(),
            })
    }

    fn shut_down_routes(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.routes.clear();
    }
}

// ── Inbound reader ───────────────────────────────────────────────────

async fn read_loop(inner: Arc<SessionInner>, mut read: SplitStream<WsStream>) {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => route_frame(&inner, text.as_str()).await,
                    Some(Ok(Message::Ping(_))) => trace!("session ping"),
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(cf) => info!(code = %cf.code, reason = %cf.reason, "hub closed the session"),
                            None => info!("hub closed the session"),
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "session read failed");
                        break;
                    }
                    None => {
                        info!("session stream ended");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    inner.shut_down_routes();
    debug!("session reader exiting");
}

async fn route_frame(inner: &SessionInner, text: &str) {
    let request = match serde_json::from_str::<InboundFrame>(text) {
        Ok(InboundFrame::MethodRequest(req)) => req,
        Ok(InboundFrame::Unknown) => {
            trace!("ignoring unrecognised frame");
            return;
        }
        Err(e) => {
            debug!(error = %e, "failed to parse session frame");
            return;
        }
    };

    debug!(method = %request.method_name, request_id = %request.request_id, "method request received");

    let unrouted = match inner.routes.get(&request.method_name) {
        Some(route) => route.send(request).err().map(|e| e.0),
        None => Some(request),
    };

    if let Some(request) = unrouted {
        warn!(method = %request.method_name, "no listener for method");
        let response = MethodResponse::for_request(
            &request,
            STATUS_NO_LISTENER,
            json!({ "result": false, "data": format!("Unknown method {}", request.method_name) }),
        );
        if let Err(e) = inner
            .send_frame("method response", &OutboundFrame::MethodResponse(&response))
            .await
        {
            warn!(error = %e, "failed to reject unknown method");
        }
    }
}
