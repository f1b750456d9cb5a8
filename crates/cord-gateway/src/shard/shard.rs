//! A single gateway connection
//!
//! Each shard owns at most one live websocket at a time. A connection is split
//! into a writer task fed by an unbounded channel and a reader task that
//! inflates, decodes and handles every inbound payload. The reader is the only
//! place a connection ends: whatever the cause (remote close, transport error,
//! zombie heartbeat, Reconnect or Invalid Session) it reports the reason to
//! `on_disconnect`, which decides between resume, fresh identify and giving up.

use super::inflater::Inflater;
use super::state::ShardState;
use super::supervisor::ShardSupervisor;
use crate::error::{GatewayError, GatewayResult};
use crate::events::ShardEvent;
use crate::protocol::{
    CloseCode, Envelope, GatewayMessage, IdentifyPayload, IdentifyProperties, OpCode, ReadyPayload,
    Recovery, ResumePayload,
};
use cord_core::{Dispatcher, TimesPer};
use futures::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default outbound allowance per [`ShardConfig::send_period`]
pub const DEFAULT_SEND_LIMIT: u32 = 120;

/// Default outbound rate-limit window
pub const DEFAULT_SEND_PERIOD: Duration = Duration::from_secs(60);

/// Default wait before reconnecting after an Invalid Session or failed connect
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Static description of one shard
#[derive(Clone)]
pub struct ShardConfig {
    pub shard_id: u32,
    pub shard_count: u32,
    /// Full connection URL including query parameters
    pub url: String,
    pub token: String,
    pub intents: u64,
    pub properties: IdentifyProperties,
    /// Shard set this shard belongs to; bumped on every rescale
    pub generation: u64,
    pub send_limit: u32,
    pub send_period: Duration,
    pub reconnect_delay: Duration,
}

impl ShardConfig {
    pub fn new(
        shard_id: u32,
        shard_count: u32,
        url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            shard_id,
            shard_count,
            url: url.into(),
            token: token.into(),
            intents: 0,
            properties: IdentifyProperties::default(),
            generation: 0,
            send_limit: DEFAULT_SEND_LIMIT,
            send_period: DEFAULT_SEND_PERIOD,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl fmt::Debug for ShardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardConfig")
            .field("shard_id", &self.shard_id)
            .field("shard_count", &self.shard_count)
            .field("url", &self.url)
            .field("token", &"[redacted]")
            .field("intents", &self.intents)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Why a connection ended
#[derive(Debug)]
enum Disconnect {
    /// The shard was closed by its owner
    Owner,
    /// The remote side closed, with its close code if it sent one
    Remote(Option<u16>),
    Transport(String),
    /// A heartbeat went unacknowledged
    Zombie,
    /// The gateway sent op 7
    Reconnect,
    /// The gateway sent op 9
    InvalidSession,
    CorruptStream,
}

impl Disconnect {
    /// Close code we send on our side of the socket, if we initiated the close
    ///
    /// Anything other than 1000 keeps the session resumable.
    const fn close_code(&self) -> Option<u16> {
        match self {
            Self::Owner => Some(1000),
            Self::Zombie => Some(1008),
            Self::Reconnect | Self::InvalidSession | Self::CorruptStream => Some(4000),
            Self::Remote(_) | Self::Transport(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    session_id: Option<String>,
    sequence: Option<u64>,
    heartbeat_acked: bool,
}

struct Connection {
    id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    kill: Option<oneshot::Sender<Disconnect>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Connection {
    /// Stop the heartbeat, optionally send a close frame and end the reader.
    ///
    /// Dropping `outbound` afterwards ends the writer, which closes the socket.
    fn shutdown(mut self, close_code: Option<u16>) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if let Some(code) = close_code {
            let frame = CloseFrame {
                code: WsCloseCode::from(code),
                reason: "".into(),
            };
            self.outbound.send(Message::Close(Some(frame))).ok();
        }
        if let Some(kill) = self.kill.take() {
            kill.send(Disconnect::Owner).ok();
        }
    }
}

struct ShardInner {
    config: ShardConfig,
    supervisor: Weak<dyn ShardSupervisor>,
    session: Mutex<Session>,
    connection: Mutex<Option<Connection>>,
    /// Ids handed to connections; zero means never connected
    connections: AtomicU64,
    send_limiter: TimesPer,
    opcodes: Dispatcher<OpCode, GatewayMessage>,
    events: Dispatcher<String, ShardEvent>,
    state: watch::Sender<ShardState>,
    closed: AtomicBool,
}

/// Handle to one gateway shard
///
/// Cloning yields another handle to the same shard.
#[derive(Clone)]
pub struct Shard {
    inner: Arc<ShardInner>,
}

impl Shard {
    /// Create a disconnected shard
    ///
    /// `events` receives every dispatch under its event name, tagged with this
    /// shard's id.
    pub fn new(
        config: ShardConfig,
        supervisor: Weak<dyn ShardSupervisor>,
        events: Dispatcher<String, ShardEvent>,
    ) -> Self {
        let send_limiter = TimesPer::new(config.send_limit, config.send_period);
        let (state, _) = watch::channel(ShardState::Disconnected);

        Self {
            inner: Arc::new(ShardInner {
                config,
                supervisor,
                session: Mutex::new(Session::default()),
                connection: Mutex::new(None),
                connections: AtomicU64::new(0),
                send_limiter,
                opcodes: Dispatcher::new(),
                events,
                state,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.inner.config.shard_id
    }

    pub fn shard_count(&self) -> u32 {
        self.inner.config.shard_count
    }

    pub fn generation(&self) -> u64 {
        self.inner.config.generation
    }

    pub fn config(&self) -> &ShardConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ShardState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ShardState> {
        self.inner.state.subscribe()
    }

    /// Wait until the shard reaches `target`
    ///
    /// Returns `false` if the shard closed first.
    pub async fn wait_for_state(&self, target: ShardState) -> bool {
        let mut rx = self.inner.state.subscribe();
        let reached = match rx
            .wait_for(|state| *state == target || *state == ShardState::Closed)
            .await
        {
            Ok(state) => *state == target,
            Err(_) => false,
        };
        reached
    }

    /// Per-opcode bus fed with every decoded payload of this shard
    pub fn opcodes(&self) -> &Dispatcher<OpCode, GatewayMessage> {
        &self.inner.opcodes
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session.lock().session_id.clone()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.inner.session.lock().sequence
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Open a websocket and identify or resume on it
    ///
    /// Returns once Identify or Resume has been queued; READY or RESUMED is
    /// reported through [`Shard::state`]. From then on the connection's reader
    /// owns reconnection.
    pub async fn connect(&self) -> GatewayResult<()> {
        let shard_id = self.id();
        if self.is_closed() {
            return Err(GatewayError::ShardClosed { shard_id });
        }

        self.set_state(ShardState::Connecting);
        tracing::info!(
            shard_id,
            shard_count = self.shard_count(),
            url = %self.inner.config.url,
            "Connecting to gateway"
        );

        let (socket, _) = tokio_tungstenite::connect_async(self.inner.config.url.as_str()).await?;
        if self.is_closed() {
            return Err(GatewayError::ShardClosed { shard_id });
        }

        let (sink, stream) = socket.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (kill, kill_rx) = oneshot::channel();
        let (alive, mut alive_rx) = watch::channel(());
        let id = self.inner.connections.fetch_add(1, Ordering::SeqCst) + 1;

        self.inner.session.lock().heartbeat_acked = true;
        let previous = self.inner.connection.lock().replace(Connection {
            id,
            outbound,
            kill: Some(kill),
            heartbeat: None,
        });
        if let Some(previous) = previous {
            previous.shutdown(Some(4000));
        }

        tokio::spawn(write_loop(shard_id, sink, outbound_rx));
        tokio::spawn(self.clone().read_loop(id, stream, kill_rx, alive));

        let session_id = self.session_id();
        let sent = match session_id {
            None => {
                self.set_state(ShardState::Identifying);
                let Some(supervisor) = self.inner.supervisor.upgrade() else {
                    return Err(GatewayError::ShardClosed { shard_id });
                };
                let limiter = supervisor.identify_limiter(shard_id)?;
                drop(supervisor);

                tokio::select! {
                    () = limiter.acquire() => {}
                    _ = alive_rx.changed() => {
                        tracing::debug!(shard_id, "Connection lost while waiting to identify");
                        return Ok(());
                    }
                }
                self.identify(id).await
            }
            Some(session_id) => {
                self.set_state(ShardState::Resuming);
                self.resume(id, session_id).await
            }
        };

        match sent {
            Ok(()) => Ok(()),
            Err(GatewayError::ShardClosed { .. }) => {
                tracing::debug!(shard_id, "Connection ended before the handshake was sent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Send a payload on the current connection, subject to the send limit
    pub async fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.send_on(None, message).await
    }

    /// Close the connection for good. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let connection = self.inner.connection.lock().take();
        if let Some(connection) = connection {
            connection.shutdown(Disconnect::Owner.close_code());
        }
        self.set_state(ShardState::Closed);
        tracing::info!(shard_id = self.id(), "Shard closed");
    }

    /// Connect in the background after `delay`, retrying failed attempts
    pub fn spawn_connect(&self, delay: Duration) -> JoinHandle<()> {
        tokio::spawn(self.clone().run_connect(delay))
    }

    fn run_connect(self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let shard_id = self.id();
            let mut delay = delay;

            loop {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if self.is_closed() {
                    return;
                }

                match self.connect().await {
                    Ok(()) | Err(GatewayError::ShardClosed { .. }) => return,
                    Err(GatewayError::Transport(error)) => {
                        self.set_state(ShardState::Disconnected);
                        if !self.may_reconnect() {
                            return;
                        }
                        delay = self.inner.config.reconnect_delay;
                        tracing::warn!(
                            shard_id,
                            error = %error,
                            retry_in_ms = delay.as_millis() as u64,
                            "Gateway connection failed"
                        );
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(shard_id, error = %e, "Shard cannot continue");
                        self.fail(e);
                        return;
                    }
                    Err(e) => {
                        tracing::error!(shard_id, error = %e, "Shard connect failed");
                        return;
                    }
                }
            }
        })
    }

    fn may_reconnect(&self) -> bool {
        !self.is_closed()
            && self
                .inner
                .supervisor
                .upgrade()
                .is_some_and(|supervisor| supervisor.should_reconnect(self))
    }

    /// Mark the shard closed and hand `error` to the supervisor
    fn fail(&self, error: GatewayError) {
        self.close();
        if let Some(supervisor) = self.inner.supervisor.upgrade() {
            supervisor.report_fatal(error);
        }
    }

    fn set_state(&self, state: ShardState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            tracing::debug!(shard_id = self.id(), from = %previous, to = %state, "Shard state changed");
        }
    }

    fn clear_session(&self) {
        let mut session = self.inner.session.lock();
        session.session_id = None;
        session.sequence = None;
    }

    async fn identify(&self, conn_id: u64) -> GatewayResult<()> {
        let config = &self.inner.config;
        let message = GatewayMessage::identify(&IdentifyPayload {
            token: config.token.clone(),
            intents: config.intents,
            properties: config.properties.clone(),
            shard: [config.shard_id, config.shard_count],
        })?;
        self.send_on(Some(conn_id), message).await?;
        tracing::info!(shard_id = config.shard_id, "Identify sent");
        Ok(())
    }

    async fn resume(&self, conn_id: u64, session_id: String) -> GatewayResult<()> {
        let seq = self.sequence();
        let message = GatewayMessage::resume(&ResumePayload {
            token: self.inner.config.token.clone(),
            session_id,
            seq,
        })?;
        self.send_on(Some(conn_id), message).await?;
        tracing::info!(shard_id = self.id(), ?seq, "Resume sent");
        Ok(())
    }

    /// Queue `message` on connection `conn_id`, or on whichever is current
    async fn send_on(&self, conn_id: Option<u64>, message: GatewayMessage) -> GatewayResult<()> {
        let shard_id = self.id();
        if self.is_closed() {
            return Err(GatewayError::ShardClosed { shard_id });
        }
        if self.inner.connections.load(Ordering::SeqCst) == 0 {
            return Err(GatewayError::NotConnected { shard_id });
        }

        let payload = message.to_json()?;
        self.inner.send_limiter.acquire().await;

        let connection = self.inner.connection.lock();
        let current = connection
            .as_ref()
            .filter(|c| conn_id.is_none_or(|id| id == c.id));
        let Some(current) = current else {
            return Err(GatewayError::ShardClosed { shard_id });
        };

        tracing::trace!(shard_id, op = %message.op, "Sending payload");
        current
            .outbound
            .send(Message::Text(payload))
            .map_err(|_| GatewayError::ShardClosed { shard_id })
    }

    async fn read_loop(
        self,
        conn_id: u64,
        mut stream: SplitStream<WsStream>,
        mut kill: oneshot::Receiver<Disconnect>,
        alive: watch::Sender<()>,
    ) {
        let shard_id = self.id();
        let mut inflater = Inflater::new();

        let reason = loop {
            let frame = tokio::select! {
                reason = &mut kill => break reason.unwrap_or(Disconnect::Owner),
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Binary(data))) => match inflater.push(&data) {
                    Ok(Some(raw)) => {
                        if let Some(reason) = self.handle_payload(conn_id, &raw) {
                            break reason;
                        }
                    }
                    Ok(None) => {
                        tracing::trace!(shard_id, buffered = inflater.buffered(), "Partial frame");
                    }
                    Err(error) => {
                        tracing::warn!(shard_id, %error, "Corrupt compressed stream");
                        break Disconnect::CorruptStream;
                    }
                },
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(shard_id, len = text.len(), "Ignoring text frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    break Disconnect::Remote(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => break Disconnect::Transport(error.to_string()),
                None => break Disconnect::Remote(None),
            }
        };

        drop(alive);
        self.on_disconnect(conn_id, reason);
    }

    /// Handle one decoded payload; `Some` ends the connection
    fn handle_payload(&self, conn_id: u64, raw: &[u8]) -> Option<Disconnect> {
        let shard_id = self.id();
        let envelope = match Envelope::from_slice(raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(shard_id, %error, "Dropping undecodable payload");
                return None;
            }
        };

        if let Some(seq) = envelope.s {
            self.inner.session.lock().sequence = Some(seq);
        }
        if envelope.opcode().is_none() {
            tracing::debug!(shard_id, op = envelope.op, seq = ?envelope.s, "Skipping unknown opcode");
            return None;
        }

        let message = match GatewayMessage::from_slice(raw) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(shard_id, %error, "Dropping undecodable payload");
                return None;
            }
        };
        tracing::trace!(shard_id, op = %message.op, seq = ?message.s, event = ?message.t, "Received payload");

        let outcome = match message.op {
            OpCode::Hello => {
                match message.as_hello() {
                    Some(hello) => {
                        self.start_heartbeat(conn_id, Duration::from_millis(hello.heartbeat_interval));
                    }
                    None => tracing::warn!(shard_id, "Hello without a heartbeat interval"),
                }
                None
            }
            OpCode::HeartbeatAck => {
                self.inner.session.lock().heartbeat_acked = true;
                None
            }
            OpCode::Heartbeat => {
                let shard = self.clone();
                tokio::spawn(async move {
                    let seq = shard.sequence();
                    shard.send_on(Some(conn_id), GatewayMessage::heartbeat(seq)).await.ok();
                });
                None
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id, "Gateway requested a reconnect");
                Some(Disconnect::Reconnect)
            }
            OpCode::InvalidSession => {
                let resumable = message.d.as_bool().unwrap_or(false);
                if !resumable {
                    self.clear_session();
                }
                tracing::info!(shard_id, resumable, "Session invalidated");
                Some(Disconnect::InvalidSession)
            }
            OpCode::Dispatch => {
                self.handle_dispatch(&message);
                None
            }
            _ => None,
        };

        self.inner.opcodes.dispatch(message.op, message.clone());
        if let (OpCode::Dispatch, Some(event)) = (message.op, message.t) {
            self.inner.events.dispatch(
                event,
                ShardEvent {
                    shard_id,
                    data: message.d,
                },
            );
        }

        outcome
    }

    fn handle_dispatch(&self, message: &GatewayMessage) {
        let shard_id = self.id();
        match message.event_name() {
            Some("READY") => match serde_json::from_value::<ReadyPayload>(message.d.clone()) {
                Ok(ready) => {
                    tracing::info!(shard_id, session_id = %ready.session_id, "Shard ready");
                    self.inner.session.lock().session_id = Some(ready.session_id);
                    self.set_state(ShardState::Connected);
                }
                Err(error) => tracing::warn!(shard_id, %error, "READY without a session id"),
            },
            Some("RESUMED") => {
                tracing::info!(shard_id, seq = ?self.sequence(), "Session resumed");
                self.set_state(ShardState::Connected);
            }
            _ => {}
        }
    }

    fn start_heartbeat(&self, conn_id: u64, interval: Duration) {
        let shard = self.clone();
        let shard_id = self.id();

        let handle = tokio::spawn(async move {
            let jitter = interval.mul_f64(rand::random::<f64>());
            tracing::debug!(
                shard_id,
                interval_ms = interval.as_millis() as u64,
                jitter_ms = jitter.as_millis() as u64,
                "Starting heartbeat"
            );
            tokio::time::sleep(jitter).await;

            loop {
                let sequence = {
                    let mut session = shard.inner.session.lock();
                    if session.heartbeat_acked {
                        session.heartbeat_acked = false;
                        Some(session.sequence)
                    } else {
                        None
                    }
                };
                let Some(sequence) = sequence else {
                    tracing::warn!(shard_id, "Heartbeat not acknowledged, dropping zombie connection");
                    shard.kill(conn_id, Disconnect::Zombie);
                    return;
                };

                if shard
                    .send_on(Some(conn_id), GatewayMessage::heartbeat(sequence))
                    .await
                    .is_err()
                {
                    return;
                }
                tracing::trace!(shard_id, ?sequence, "Heartbeat sent");
                tokio::time::sleep(interval).await;
            }
        });

        let mut connection = self.inner.connection.lock();
        match connection.as_mut() {
            Some(current) if current.id == conn_id => {
                if let Some(previous) = current.heartbeat.replace(handle) {
                    previous.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    /// Ask the reader of `conn_id` to end with `reason`
    fn kill(&self, conn_id: u64, reason: Disconnect) {
        let mut connection = self.inner.connection.lock();
        if let Some(current) = connection.as_mut().filter(|c| c.id == conn_id) {
            if let Some(kill) = current.kill.take() {
                kill.send(reason).ok();
            }
        }
    }

    fn on_disconnect(&self, conn_id: u64, reason: Disconnect) {
        let shard_id = self.id();
        let connection = {
            let mut guard = self.inner.connection.lock();
            match guard.as_ref() {
                Some(current) if current.id == conn_id => guard.take(),
                _ => None,
            }
        };
        let Some(connection) = connection else {
            tracing::debug!(shard_id, conn_id, "Stale connection ended");
            return;
        };
        connection.shutdown(reason.close_code());

        if self.is_closed() {
            self.set_state(ShardState::Closed);
            return;
        }
        self.set_state(ShardState::Disconnected);
        tracing::info!(shard_id, reason = ?reason, "Disconnected from gateway");

        if !self.may_reconnect() {
            tracing::info!(shard_id, "Not reconnecting");
            return;
        }

        let mut delay = Duration::ZERO;
        match reason {
            Disconnect::Remote(Some(code)) => match CloseCode::from_u16(code) {
                Some(code) => match code.recovery() {
                    Recovery::Fatal => {
                        tracing::error!(shard_id, %code, "Unrecoverable close code");
                        self.fail(GatewayError::from_close_code(code));
                        return;
                    }
                    Recovery::NewSession => {
                        tracing::info!(shard_id, %code, "Session cannot be resumed");
                        self.clear_session();
                    }
                    Recovery::Reconnect => {}
                },
                None => tracing::debug!(shard_id, code, "Closed with a non-gateway code"),
            },
            Disconnect::InvalidSession | Disconnect::Transport(_) => {
                delay = self.inner.config.reconnect_delay;
            }
            _ => {}
        }

        self.spawn_connect(delay);
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id())
            .field("shard_count", &self.shard_count())
            .field("generation", &self.generation())
            .field("state", &self.state())
            .finish()
    }
}

async fn write_loop(
    shard_id: u32,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(error) = sink.send(message).await {
            tracing::debug!(shard_id, %error, "Write failed, stopping writer");
            return;
        }
        if closing {
            break;
        }
    }
    sink.close().await.ok();
}
