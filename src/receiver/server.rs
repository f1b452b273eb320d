//! Main AirTunes receiver implementation

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::ReceiverConfig;
use super::decoder::DecoderRegistry;
use super::events::ReceiverEvent;
use super::session_manager::{ConnectionContext, HandleOutcome, SessionController};
use crate::protocol::crypto::ServerKey;
use crate::protocol::rtsp::{RtspServerCodec, encode_response};

/// Read buffer for control connections
const READ_BUFFER_SIZE: usize = 4096;

/// RAOP receiver: RTSP listener plus the session controller behind it
pub struct AirTunesReceiver {
    config: ReceiverConfig,
    key: Arc<ServerKey>,
    decoders: DecoderRegistry,
    event_tx: mpsc::UnboundedSender<ReceiverEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<ReceiverEvent>>,
    running: Option<Running>,
}

struct Running {
    controller: SessionController,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl AirTunesReceiver {
    /// Create a receiver; nothing is bound until [`start`](Self::start)
    #[must_use]
    pub fn new(config: ReceiverConfig, key: Arc<ServerKey>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            config,
            key,
            decoders: DecoderRegistry::default(),
            event_tx,
            event_rx: Some(event_rx),
            running: None,
        }
    }

    /// Replace the decoder registry
    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    /// Take the event channel; only the first call returns it
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ReceiverEvent>> {
        self.event_rx.take()
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Bound RTSP address while running
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Listening
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Session controller while running
    #[must_use]
    pub fn controller(&self) -> Option<&SessionController> {
        self.running.as_ref().map(|r| &r.controller)
    }

    /// Bind the RTSP port and start accepting
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::AlreadyRunning` on a second call, or
    /// `ReceiverError::Bind` if the port is taken.
    pub async fn start(&mut self) -> Result<SocketAddr, ReceiverError> {
        if self.running.is_some() {
            return Err(ReceiverError::AlreadyRunning);
        }

        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ReceiverError::Bind { addr: bind_addr, source })?;
        let local_addr = listener.local_addr()?;

        let controller = SessionController::new(
            self.config.clone(),
            self.key.clone(),
            self.decoders.clone(),
            self.event_tx.clone(),
        );
        let shutdown = CancellationToken::new();

        let accept_task = tokio::spawn(accept_loop(listener, controller.clone(), shutdown.clone()));

        tracing::info!(
            "{} listening on {} ({})",
            self.config.name,
            local_addr,
            self.config.service_name()
        );
        controller.emit(ReceiverEvent::Started {
            name: self.config.name.clone(),
            port: local_addr.port(),
        });

        self.running = Some(Running {
            controller,
            local_addr,
            shutdown,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Stop accepting, drop every connection and tear down the session
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::Io` if the accept task panicked.
    pub async fn stop(&mut self) -> Result<(), ReceiverError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.shutdown.cancel();
        running.controller.force_disconnect().await;
        if let Err(e) = running.accept_task.await {
            if e.is_panic() {
                return Err(ReceiverError::Io(std::io::Error::other(e.to_string())));
            }
        }

        tracing::info!("{} stopped", self.config.name);
        running.controller.emit(ReceiverEvent::Stopped);
        Ok(())
    }
}

impl Drop for AirTunesReceiver {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for AirTunesReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirTunesReceiver")
            .field("name", &self.config.name)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

async fn accept_loop(listener: TcpListener, controller: SessionController, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let controller = controller.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, controller, shutdown).await {
                                tracing::debug!("Connection {} ended with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        }
    }
}

/// Serve one control connection until it closes
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    controller: SessionController,
    shutdown: CancellationToken,
) -> Result<(), ReceiverError> {
    let local = stream.local_addr()?;
    let Some(conn) = controller.accept(peer, local).await else {
        // dropping the stream closes it
        return Ok(());
    };

    let result = serve(&mut stream, &conn, &controller, &shutdown).await;
    controller.disconnect(&conn).await;
    result
}

async fn serve(
    stream: &mut TcpStream,
    conn: &ConnectionContext,
    controller: &SessionController,
    shutdown: &CancellationToken,
) -> Result<(), ReceiverError> {
    let mut codec = RtspServerCodec::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = conn.close.cancelled() => {
                tracing::debug!("Closing connection {} on request", conn.id);
                return Ok(());
            }
            read = stream.read(&mut buf) => read?,
        };
        if n == 0 {
            return Ok(());
        }

        codec.feed(&buf[..n]);

        loop {
            let outcome = match codec.decode() {
                Ok(Some(request)) => controller.handle(conn, &request).await,
                Ok(None) => break,
                Err(e) => controller.reject_unparseable(conn, &e),
            };

            if write_outcome(stream, &outcome).await? {
                return Ok(());
            }
        }
    }
}

/// Write a response; true if the connection should now close
async fn write_outcome(stream: &mut TcpStream, outcome: &HandleOutcome) -> Result<bool, ReceiverError> {
    stream.write_all(&encode_response(&outcome.response)).await?;
    if outcome.close {
        stream.shutdown().await?;
    }
    Ok(outcome.close)
}

/// Receiver errors
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// Receiver already running
    #[error("Receiver already running")]
    AlreadyRunning,

    /// RTSP port could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
