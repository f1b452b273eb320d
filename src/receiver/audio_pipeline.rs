//! Decode pipeline: reorder buffer -> codec decoder -> output stream
//!
//! The application only ever sees the [`AudioStream`] end. Backpressure runs
//! the other way: when the stream holds `high_water` undelivered chunks the
//! decode stage reports "full", the reorder buffer starts queueing, and the
//! consumer's next read wakes a resume task that drains it.

use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::decoder::AudioDecoder;
use super::reorder_buffer::{FlowMode, PacketSink, ReorderBuffer};

/// Default output high-water mark, in decoded chunks
pub const DEFAULT_OUTPUT_CHUNKS: usize = 64;

/// Pipeline shared between the RTP audio task, the resume task and the
/// session controller
pub type SharedPipeline = Arc<Mutex<DecodePipeline>>;

struct FlowState {
    pending: AtomicUsize,
    high_water: usize,
    producer_waiting: AtomicBool,
    ready: Arc<Notify>,
}

impl FlowState {
    fn consumed(&self) {
        let left = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        if left < self.high_water && self.producer_waiting.swap(false, Ordering::SeqCst) {
            self.ready.notify_one();
        }
    }
}

type OutputSender = Arc<std::sync::Mutex<Option<mpsc::UnboundedSender<Bytes>>>>;

/// Producer half of the output stream
struct OutputSink {
    tx: OutputSender,
    flow: Arc<FlowState>,
}

impl OutputSink {
    fn push(&mut self, chunk: Bytes) -> bool {
        let flow = &self.flow;
        let queued = flow.pending.fetch_add(1, Ordering::SeqCst) + 1;

        let sent = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(chunk).is_ok());
        if !sent {
            // stream closed or consumer gone; keep draining the network side
            flow.pending.fetch_sub(1, Ordering::SeqCst);
            return true;
        }
        if queued < flow.high_water {
            return true;
        }

        flow.producer_waiting.store(true, Ordering::SeqCst);
        if flow.pending.load(Ordering::SeqCst) < flow.high_water {
            flow.producer_waiting.store(false, Ordering::SeqCst);
            return true;
        }
        false
    }

    /// Consumer dropped its stream, or the session closed it
    fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(mpsc::UnboundedSender::is_closed)
    }

    fn has_capacity(&self) -> bool {
        self.flow.pending.load(Ordering::SeqCst) < self.flow.high_water
    }
}

/// Decoded PCM handed to the application on `ClientConnected`
///
/// Yields interleaved 16-bit little-endian chunks in playback order and ends
/// when the session is torn down.
pub struct AudioStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
    flow: Arc<FlowState>,
}

impl AudioStream {
    /// Next decoded chunk, or `None` once the session is gone
    pub async fn recv(&mut self) -> Option<Bytes> {
        std::future::poll_fn(|cx| self.poll_chunk(cx)).await
    }

    /// Next chunk if one is already buffered
    pub fn try_recv(&mut self) -> Option<Bytes> {
        let chunk = self.rx.try_recv().ok()?;
        self.flow.consumed();
        Some(chunk)
    }

    /// Chunks decoded but not yet read
    #[must_use]
    pub fn pending_chunks(&self) -> usize {
        self.flow.pending.load(Ordering::SeqCst)
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = polled {
            self.flow.consumed();
        }
        polled
    }
}

impl Stream for AudioStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.get_mut().poll_chunk(cx)
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("pending_chunks", &self.pending_chunks())
            .finish()
    }
}

/// Decoder stage; a [`PacketSink`] for the reorder buffer
struct DecodeStage {
    decoder: Box<dyn AudioDecoder>,
    output: OutputSink,
}

impl PacketSink for DecodeStage {
    fn push(&mut self, chunk: Bytes) -> bool {
        match self.decoder.decode(&chunk) {
            Ok(pcm) => self.output.push(pcm),
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                self.output.has_capacity()
            }
        }
    }
}

/// The three-stage receive pipeline for one session
pub struct DecodePipeline {
    reorder: ReorderBuffer,
    stage: DecodeStage,
}

impl DecodePipeline {
    /// Build a pipeline and the stream its output feeds
    #[must_use]
    pub fn new(decoder: Box<dyn AudioDecoder>, high_water: usize) -> (Self, AudioStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let flow = Arc::new(FlowState {
            pending: AtomicUsize::new(0),
            high_water: high_water.max(1),
            producer_waiting: AtomicBool::new(false),
            ready: Arc::new(Notify::new()),
        });

        let pipeline = Self {
            reorder: ReorderBuffer::new(),
            stage: DecodeStage {
                decoder,
                output: OutputSink {
                    tx: Arc::new(std::sync::Mutex::new(Some(tx))),
                    flow: flow.clone(),
                },
            },
        };

        (pipeline, AudioStream { rx, flow })
    }

    /// Feed a decrypted payload
    ///
    /// Once nobody reads the output, queued packets are discarded and the
    /// buffer goes back to flowing so nothing accumulates.
    pub fn add(&mut self, chunk: Bytes, sequence: u16) {
        if self.reorder.mode() == FlowMode::Buffering && self.stage.output.is_closed() {
            let dropped = self.reorder.clear();
            tracing::debug!(dropped, "Audio stream closed, releasing reorder buffer");
            self.reorder.resume(&mut self.stage);
        }
        self.reorder.add(chunk, sequence, &mut self.stage);
    }

    /// The consumer has room again
    pub fn resume(&mut self) {
        self.reorder.resume(&mut self.stage);
    }

    /// Drop queued packets (`FLUSH`), returning how many were dropped
    pub fn flush(&mut self) -> usize {
        self.reorder.clear()
    }

    /// Current reorder-buffer mode
    #[must_use]
    pub fn mode(&self) -> FlowMode {
        self.reorder.mode()
    }

    /// Packets held in the reorder buffer
    #[must_use]
    pub fn queued(&self) -> usize {
        self.reorder.len()
    }

    /// Signalled when a consumer read frees space while the pipeline is
    /// buffering
    #[must_use]
    pub fn readiness(&self) -> Arc<Notify> {
        self.stage.output.flow.ready.clone()
    }
}

/// A running pipeline: the shared pipeline plus its resume task
///
/// Closing the handle ends the [`AudioStream`] once buffered chunks are read.
pub struct PipelineHandle {
    pipeline: SharedPipeline,
    output: OutputSender,
    shutdown: CancellationToken,
    resume_task: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Share `pipeline` and start its resume task
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(pipeline: DecodePipeline) -> Self {
        let ready = pipeline.readiness();
        let output = pipeline.stage.output.tx.clone();
        let shared = Arc::new(Mutex::new(pipeline));
        let shutdown = CancellationToken::new();

        let task_pipeline = shared.clone();
        let task_shutdown = shutdown.clone();
        let resume_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_shutdown.cancelled() => break,
                    () = ready.notified() => {
                        task_pipeline.lock().await.resume();
                    }
                }
            }
            tracing::trace!("Pipeline resume task stopped");
        });

        Self {
            pipeline: shared,
            output,
            shutdown,
            resume_task: Some(resume_task),
        }
    }

    /// The pipeline, for the RTP audio task and `FLUSH`
    #[must_use]
    pub fn shared(&self) -> SharedPipeline {
        self.pipeline.clone()
    }

    /// Stop resuming and end the output stream; safe to call repeatedly
    pub fn close(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.resume_task.take() {
            task.abort();
        }
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Closed already
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
