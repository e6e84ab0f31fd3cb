//! obs-websocket client.
//!
//! A single supervisor task owns the socket: it connects, runs the
//! Hello/Identify/Identified handshake, reads frames until the transport
//! fails, then sleeps on the reconnect backoff and starts over. Outbound
//! frames go through a channel to a per-connection writer task, so callers
//! never touch the socket directly.
//!
//! Locks inside [`Inner`] are plain `std::sync` locks that are only held for
//! map/field updates and never across an `.await`.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backoff::Backoff;
use super::error::ObsError;
use super::events::{ClientEvent, ObsEvent};
use super::protocol::{auth_response, subscription, Identify, Message, Request, RequestResponse, RPC_VERSION};
use crate::config::ObsConfig;
use crate::logs::diagnostics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingResult = Result<RequestResponse, ObsError>;

/// Observer callback. Invoked on the client's task; must not block.
pub type EventCallback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Clone)]
pub struct ClientOptions {
    pub url: String,
    pub password: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub min_obs_version: semver::Version,
    pub backoff: Backoff,
    pub event_subscriptions: u32,
    /// Issue `GetVersion` after every handshake and warn on old OBS builds.
    pub check_version: bool,
    pub shutdown_grace: Duration,
}

impl ClientOptions {
    pub fn from_config(config: &ObsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            url: config.url(),
            password: config.password.clone().filter(|p| !p.is_empty()),
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            min_obs_version: semver::Version::parse(&config.min_obs_version)?,
            backoff: Backoff::new(
                Duration::from_secs(config.reconnect_initial_seconds),
                Duration::from_secs(config.reconnect_max_seconds),
                config.reconnect_jitter,
            ),
            event_subscriptions: subscription::DAEMON_DEFAULT,
            check_version: true,
            shutdown_grace: Duration::from_secs(3),
        })
    }
}

/// Snapshot of the connection, readable from outside the client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub identified: bool,
    pub engine_version: Option<String>,
    pub websocket_version: Option<String>,
    pub protocol_version: Option<u32>,
    pub reconnect_attempt: u32,
    pub next_backoff_ms: Option<u64>,
    pub version_compatible: Option<bool>,
}

struct Inner {
    options: ClientOptions,
    state: Mutex<ConnectionState>,
    pending: Mutex<HashMap<String, oneshot::Sender<PendingResult>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    observers: RwLock<Vec<EventCallback>>,
    ready: watch::Sender<bool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct ObsClient {
    inner: Arc<Inner>,
}

struct Handshaken {
    websocket_version: String,
    rpc_version: u32,
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Removes a pending entry however the request future ends.
struct PendingGuard {
    inner: Arc<Inner>,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.inner.pending).remove(&self.request_id);
    }
}

impl ObsClient {
    pub fn new(options: ClientOptions) -> Self {
        Self::with_cancel(options, CancellationToken::new())
    }

    /// Client that also stops when `cancel` fires. In-flight requests then
    /// return [`ObsError::Shutdown`] instead of waiting out their timeout.
    pub fn with_cancel(options: ClientOptions, cancel: CancellationToken) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                options,
                state: Mutex::new(ConnectionState::default()),
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                observers: RwLock::new(Vec::new()),
                ready,
                cancel,
                task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the connection supervisor. Calling it again is a no-op.
    pub fn start(&self) {
        let mut task = lock(&self.inner.task);
        if task.is_some() {
            return;
        }
        info!("Connecting to OBS at {}", self.inner.options.url);
        *task = Some(tokio::spawn(supervise(Arc::clone(&self.inner))));
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.inner
            .observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(callback));
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.state).clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.ready.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    pub(crate) fn min_obs_version(&self) -> &semver::Version {
        &self.inner.options.min_obs_version
    }

    pub(crate) fn update_state<F: FnOnce(&mut ConnectionState)>(&self, f: F) {
        f(&mut lock(&self.inner.state));
    }

    /// Send one request and wait for its correlated response.
    ///
    /// Returns the `responseData` on success. Request-level failures come back
    /// as errors but leave the connection untouched.
    pub async fn request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> Result<Option<Value>, ObsError> {
        if self.inner.cancel.is_cancelled() {
            return Err(ObsError::Shutdown);
        }
        let sender = lock(&self.inner.outbound)
            .clone()
            .ok_or(ObsError::NotConnected)?;

        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(request_id.clone(), tx);
        let _pending = PendingGuard {
            inner: Arc::clone(&self.inner),
            request_id: request_id.clone(),
        };

        let frame = Message::Request(Request {
            request_type: request_type.to_string(),
            request_id: request_id.clone(),
            request_data,
        })
        .encode()?;

        debug!("-> {} ({})", request_type, request_id);
        sender
            .send(WsMessage::Text(frame))
            .map_err(|_| ObsError::NotConnected)?;

        let timeout = self.inner.options.request_timeout;
        let waited = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => return Err(ObsError::Shutdown),
            waited = tokio::time::timeout(timeout, rx) => waited,
        };
        let response = match waited {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(ObsError::NotConnected),
            Err(_) => {
                let err = ObsError::Timeout {
                    request_type: request_type.to_string(),
                    timeout,
                };
                warn!("{}; connection stays up", err);
                return Err(err);
            }
        };

        if response.request_status.result {
            return Ok(response.response_data);
        }

        let err = ObsError::from_status(request_type, &response.request_status);
        if err.is_invalid_request_kind() {
            warn!(
                "{} (likely an OBS/obs-websocket version mismatch); continuing",
                err
            );
        } else if err.is_processing_failure() {
            warn!("{}; continuing", err);
        } else {
            debug!("{}", err);
        }
        Err(err)
    }

    /// Close the socket and stop reconnecting, waiting at most the grace period.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = lock(&self.inner.task).take();
        if let Some(mut handle) = handle {
            let grace = self.inner.options.shutdown_grace;
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("OBS client did not stop within {:?}; aborting", grace);
                handle.abort();
            }
        }
        self.inner.ready.send_replace(false);
        fail_pending(&self.inner, ObsError::Shutdown);
        info!("OBS client stopped");
    }
}

async fn supervise(inner: Arc<Inner>) {
    let mut backoff = inner.options.backoff.clone();

    loop {
        if inner.cancel.is_cancelled() {
            break;
        }

        let reason = match connect(&inner).await {
            Ok((ws, session)) => {
                backoff.reset();
                match serve(&inner, ws, session).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(reason) => reason,
                }
            }
            Err(ObsError::Shutdown) => break,
            Err(e) => {
                warn!("OBS connection attempt to {} failed: {}", inner.options.url, e);
                e.to_string()
            }
        };

        let delay = backoff.next_delay();
        {
            let mut state = lock(&inner.state);
            state.reconnect_attempt = backoff.attempt();
            state.next_backoff_ms = Some(delay.as_millis() as u64);
        }
        info!(
            "Reconnecting to OBS in {:.1}s (attempt {}, last error: {})",
            delay.as_secs_f64(),
            backoff.attempt(),
            reason
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.cancel.cancelled() => break,
        }
    }

    debug!("OBS connection supervisor stopped");
}

async fn connect(inner: &Arc<Inner>) -> Result<(WsStream, Handshaken), ObsError> {
    let options = &inner.options;
    let attempt = async {
        let (mut ws, _response) = tokio_tungstenite::connect_async(options.url.as_str())
            .await
            .map_err(|e| ObsError::Transport(e.to_string()))?;
        let session = handshake(&mut ws, options).await?;
        Ok::<_, ObsError>((ws, session))
    };

    tokio::select! {
        result = tokio::time::timeout(options.connect_timeout, attempt) => match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ObsError::Transport(format!(
                "connect timed out after {}s",
                options.connect_timeout.as_secs_f64()
            ))),
        },
        _ = inner.cancel.cancelled() => Err(ObsError::Shutdown),
    }
}

async fn handshake(ws: &mut WsStream, options: &ClientOptions) -> Result<Handshaken, ObsError> {
    let hello = match read_frame(ws).await? {
        Message::Hello(hello) => hello,
        other => {
            return Err(ObsError::Handshake(format!(
                "expected Hello, got op {}",
                other.op()
            )))
        }
    };
    debug!(
        "OBS hello: obs-websocket {}, rpc {}, auth {}",
        hello.obs_web_socket_version,
        hello.rpc_version,
        hello.authentication.is_some()
    );

    if hello.rpc_version < RPC_VERSION {
        return Err(ObsError::UnsupportedRpcVersion {
            offered: hello.rpc_version,
            supported: RPC_VERSION,
        });
    }

    let authentication = match (&hello.authentication, &options.password) {
        (Some(challenge), Some(password)) => Some(auth_response(password, challenge)),
        (Some(_), None) => {
            return Err(ObsError::Handshake(
                "OBS requires authentication but no password is configured".to_string(),
            ))
        }
        (None, _) => None,
    };

    let frame = Message::Identify(Identify {
        rpc_version: RPC_VERSION,
        authentication,
        event_subscriptions: Some(options.event_subscriptions),
    })
    .encode()?;
    diagnostics::emit(
        "obs",
        "identify_sent",
        None,
        serde_json::from_str(&frame).unwrap_or(Value::Null),
    );
    ws.send(WsMessage::Text(frame))
        .await
        .map_err(|e| ObsError::Transport(e.to_string()))?;

    let identified = match read_frame(ws).await? {
        Message::Identified(identified) => identified,
        other => {
            return Err(ObsError::Handshake(format!(
                "expected Identified, got op {}",
                other.op()
            )))
        }
    };

    if identified.negotiated_rpc_version != RPC_VERSION {
        return Err(ObsError::UnsupportedRpcVersion {
            offered: identified.negotiated_rpc_version,
            supported: RPC_VERSION,
        });
    }

    Ok(Handshaken {
        websocket_version: hello.obs_web_socket_version,
        rpc_version: identified.negotiated_rpc_version,
    })
}

async fn read_frame(ws: &mut WsStream) -> Result<Message, ObsError> {
    while let Some(frame) = ws.next().await {
        match frame.map_err(|e| ObsError::Transport(e.to_string()))? {
            WsMessage::Text(text) => return Message::decode(&text),
            WsMessage::Close(frame) => return Err(ObsError::Transport(close_reason(frame.as_ref()))),
            _ => continue,
        }
    }
    Err(ObsError::Transport(
        "connection closed during handshake".to_string(),
    ))
}

fn close_reason(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) => format!("closed by OBS ({}): {}", u16::from(frame.code), frame.reason),
        None => "closed by OBS".to_string(),
    }
}

async fn serve(inner: &Arc<Inner>, ws: WsStream, session: Handshaken) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    *lock(&inner.outbound) = Some(tx);

    {
        let mut state = lock(&inner.state);
        state.connected = true;
        state.identified = true;
        state.protocol_version = Some(session.rpc_version);
        state.websocket_version = Some(session.websocket_version.clone());
        state.reconnect_attempt = 0;
        state.next_backoff_ms = None;
    }
    inner.ready.send_replace(true);
    info!(
        "Connected to OBS at {} (obs-websocket {}, rpc {})",
        inner.options.url, session.websocket_version, session.rpc_version
    );
    dispatch(
        inner,
        &ClientEvent::Connected {
            rpc_version: session.rpc_version,
        },
    );

    let cancel = inner.cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            debug!("OBS writer stopped: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = cancel.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    if inner.options.check_version {
        let client = ObsClient {
            inner: Arc::clone(inner),
        };
        tokio::spawn(async move {
            client.check_version().await;
        });
    }

    let end = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => handle_frame(inner, &text),
                Some(Ok(WsMessage::Close(frame))) => break SessionEnd::Lost(close_reason(frame.as_ref())),
                Some(Ok(_)) => {}
                Some(Err(e)) => break SessionEnd::Lost(e.to_string()),
                None => break SessionEnd::Lost("connection closed".to_string()),
            },
            _ = inner.cancel.cancelled() => break SessionEnd::Shutdown,
        }
    };

    lock(&inner.outbound).take();
    inner.ready.send_replace(false);
    {
        let mut state = lock(&inner.state);
        state.connected = false;
        state.identified = false;
    }
    fail_pending(inner, ObsError::NotConnected);
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;

    if let SessionEnd::Lost(reason) = &end {
        warn!("Lost connection to OBS: {}", reason);
        dispatch(
            inner,
            &ClientEvent::Disconnected {
                reason: reason.clone(),
            },
        );
    }
    end
}

fn handle_frame(inner: &Inner, text: &str) {
    match Message::decode(text) {
        Ok(Message::RequestResponse(response)) => {
            let waiter = lock(&inner.pending).remove(&response.request_id);
            match waiter {
                Some(tx) => {
                    debug!("<- {} ({})", response.request_type, response.request_id);
                    let _ = tx.send(Ok(response));
                }
                None => debug!(
                    "Dropping response for unknown request {} ({})",
                    response.request_id, response.request_type
                ),
            }
        }
        Ok(Message::Event(event)) => {
            dispatch(inner, &ClientEvent::Engine(ObsEvent::from_wire(&event)));
        }
        Ok(other) => debug!("Ignoring unexpected op {} from OBS", other.op()),
        Err(e) => warn!("Dropping frame from OBS: {}", e),
    }
}

fn fail_pending(inner: &Inner, error: ObsError) {
    let drained: Vec<_> = lock(&inner.pending).drain().collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(error.clone()));
    }
}

/// Call observers on a cloned list so no client lock is held during callbacks.
fn dispatch(inner: &Inner, event: &ClientEvent) {
    let observers: Vec<EventCallback> = inner
        .observers
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    for observer in observers {
        observer(event);
    }
}
