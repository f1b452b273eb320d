//! Session controller for the receiver
//!
//! Owns the single [`Session`], enforces single-client admission and routes
//! every control request through one lock, so RTSP handling, the watchdog
//! and teardown never race on session state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::audio_pipeline::PipelineHandle;
use super::config::ReceiverConfig;
use super::decoder::DecoderRegistry;
use super::events::ReceiverEvent;
use super::rtp_receiver::{RtpReceiver, TimeoutHandler};
use super::session::{Session, SessionState};
use super::rtsp_handler;
use crate::error::RaopError;
use crate::protocol::crypto::ServerKey;
use crate::protocol::rtsp::{
    Method, ParseError, ResponseBuilder, RtspRequest, RtspResponse, StatusCode,
};

/// Identifies one accepted control connection
pub type ConnectionId = u64;

/// Per-connection context handed back by [`SessionController::accept`]
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Connection id
    pub id: ConnectionId,
    /// Sender address
    pub peer: SocketAddr,
    /// Our end of the connection; used for the Apple-Challenge response
    pub local: SocketAddr,
    /// Cancelled when the receiver wants this connection closed
    pub close: CancellationToken,
}

/// Outcome of one request
#[derive(Debug)]
pub struct HandleOutcome {
    /// Response to write
    pub response: RtspResponse,
    /// Close the connection after writing
    pub close: bool,
}

/// State guarded by the controller lock
#[derive(Debug, Default)]
pub(crate) struct ControllerState {
    /// Latest accepted connection
    pub(crate) handling: Option<ConnectionId>,
    /// Connection whose `ANNOUNCE` succeeded
    pub(crate) connected: Option<ConnectionContext>,
    pub(crate) session: Session,
    pub(crate) pipeline: Option<PipelineHandle>,
    pub(crate) rtp: Option<RtpReceiver>,
    /// Bumped per connected client so a stale watchdog cannot end a newer one
    pub(crate) generation: u64,
}

impl ControllerState {
    pub(crate) fn is_connected(&self, conn: &ConnectionContext) -> bool {
        self.connected.as_ref().is_some_and(|c| c.id == conn.id)
    }
}

/// Everything a handler needs for one request
pub(crate) struct HandlerContext<'a> {
    pub(crate) conn: &'a ConnectionContext,
    pub(crate) state: &'a mut ControllerState,
    pub(crate) controller: &'a SessionController,
}

impl HandlerContext<'_> {
    pub(crate) fn config(&self) -> &ReceiverConfig {
        &self.controller.inner.config
    }

    pub(crate) fn server_key(&self) -> &ServerKey {
        &self.controller.inner.key
    }

    pub(crate) fn decoders(&self) -> &DecoderRegistry {
        &self.controller.inner.decoders
    }

    pub(crate) fn emit(&self, event: ReceiverEvent) {
        self.controller.emit(event);
    }

    /// Fail with 455 unless this connection is the connected client
    pub(crate) fn require_connected(&self, method: Method) -> Result<(), RaopError> {
        if self.state.is_connected(self.conn) {
            Ok(())
        } else {
            Err(RaopError::InvalidState(format!(
                "{method} from connection {} which is not the connected client",
                self.conn.id
            )))
        }
    }

    /// Watchdog callback bound to the current client
    pub(crate) fn timeout_handler(&self) -> TimeoutHandler {
        let controller = Arc::downgrade(&self.controller.inner);
        let generation = self.state.generation;

        Arc::new(move || {
            let Some(inner) = Weak::upgrade(&controller) else {
                return;
            };
            let controller = SessionController { inner };
            tokio::spawn(async move {
                controller.expire(generation).await;
            });
        })
    }
}

/// Result type for method handlers
pub(crate) type HandlerResult = Result<ResponseBuilder, RaopError>;

struct ControllerInner {
    config: ReceiverConfig,
    key: Arc<ServerKey>,
    decoders: DecoderRegistry,
    events: mpsc::UnboundedSender<ReceiverEvent>,
    state: Mutex<ControllerState>,
    next_id: AtomicU64,
}

/// RTSP state machine and single-client admission
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Create a controller that reports to `events`
    #[must_use]
    pub fn new(
        config: ReceiverConfig,
        key: Arc<ServerKey>,
        decoders: DecoderRegistry,
        events: mpsc::UnboundedSender<ReceiverEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                key,
                decoders,
                events,
                state: Mutex::new(ControllerState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Receiver configuration
    #[must_use]
    pub fn config(&self) -> &ReceiverConfig {
        &self.inner.config
    }

    pub(crate) fn emit(&self, event: ReceiverEvent) {
        let kind = event.kind();
        if self.inner.events.send(event).is_err() {
            tracing::trace!("No listener for {} event", kind);
        }
    }

    /// Admit a new control connection
    ///
    /// Returns `None` if another connection is still negotiating and nobody
    /// is connected yet; the caller should close the socket.
    pub async fn accept(&self, peer: SocketAddr, local: SocketAddr) -> Option<ConnectionContext> {
        let mut state = self.inner.state.lock().await;

        if state.handling.is_some() && state.connected.is_none() {
            tracing::info!("Refusing {}: another client is negotiating", peer);
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        state.handling = Some(id);
        tracing::debug!("Accepted control connection {} from {}", id, peer);

        Some(ConnectionContext {
            id,
            peer,
            local,
            close: CancellationToken::new(),
        })
    }

    /// Handle one request and build its response
    pub async fn handle(&self, conn: &ConnectionContext, request: &RtspRequest) -> HandleOutcome {
        let cseq = request.headers.cseq_raw().map(str::to_string);
        self.log_request(conn, request);

        let mut state = self.inner.state.lock().await;
        let mut ctx = HandlerContext {
            conn,
            state: &mut *state,
            controller: self,
        };

        let result = rtsp_handler::handle_request(request, &mut ctx).await;
        drop(state);

        let (builder, close) = match result {
            Ok(builder) => (builder, false),
            Err(err) => {
                tracing::warn!("{} rejected: {}", request.method, err);
                let status = err.status().unwrap_or(StatusCode::INTERNAL_ERROR);
                (ResponseBuilder::error(status), err.closes_connection())
            }
        };

        HandleOutcome {
            response: builder.cseq(cseq.as_deref()).server_identity().build(),
            close,
        }
    }

    /// Response for a request that could not be parsed; always closes
    #[must_use]
    pub fn reject_unparseable(&self, conn: &ConnectionContext, err: &ParseError) -> HandleOutcome {
        tracing::warn!("Bad request on connection {}: {}", conn.id, err);
        let cseq = err.cseq();
        let err = RaopError::Protocol(err.to_string());
        let status = err.status().unwrap_or(StatusCode::BAD_REQUEST);

        HandleOutcome {
            response: ResponseBuilder::error(status)
                .cseq(cseq)
                .server_identity()
                .build(),
            close: err.closes_connection(),
        }
    }

    /// The connection went away
    pub async fn disconnect(&self, conn: &ConnectionContext) {
        let mut state = self.inner.state.lock().await;

        if state.handling == Some(conn.id) {
            state.handling = None;
        }
        if state.is_connected(conn) {
            tracing::info!("Client {} disconnected", conn.peer);
            self.end_session(&mut state);
        }
    }

    /// Tear down the connected client and close its connection
    ///
    /// Idempotent: with nobody connected this does nothing.
    pub async fn force_disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(conn) = state.connected.clone() {
            self.end_session(&mut state);
            conn.close.cancel();
        }
    }

    async fn expire(&self, generation: u64) {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            return;
        }
        if let Some(conn) = state.connected.clone() {
            tracing::info!("{}", RaopError::Timeout);
            self.end_session(&mut state);
            conn.close.cancel();
        }
    }

    /// Whether a client is connected
    pub async fn has_client(&self) -> bool {
        self.inner.state.lock().await.connected.is_some()
    }

    /// Current session state
    pub async fn session_state(&self) -> SessionState {
        self.inner.state.lock().await.session.state()
    }

    #[cfg(test)]
    pub(crate) async fn with_state<R>(&self, f: impl FnOnce(&ControllerState) -> R) -> R {
        f(&*self.inner.state.lock().await)
    }

    /// Stop audio, wipe keys and metadata, and report the disconnect once
    pub(crate) fn end_session(&self, state: &mut ControllerState) -> bool {
        if state.connected.take().is_none() {
            return false;
        }

        if let Some(mut rtp) = state.rtp.take() {
            rtp.stop();
        }
        if let Some(mut pipeline) = state.pipeline.take() {
            pipeline.close();
        }
        state.session.reset();

        self.emit(ReceiverEvent::ClientDisconnected);
        true
    }

    fn log_request(&self, conn: &ConnectionContext, request: &RtspRequest) {
        let cseq = request.headers.cseq_raw().unwrap_or("-");
        if self.inner.config.verbose {
            tracing::info!(
                "[{}] {} {} (CSeq: {}) headers={:?}",
                conn.id,
                request.method,
                request.uri,
                cseq,
                request.headers
            );
        } else {
            tracing::debug!("[{}] {} {} (CSeq: {})", conn.id, request.method, request.uri, cseq);
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("name", &self.inner.config.name)
            .finish_non_exhaustive()
    }
}
