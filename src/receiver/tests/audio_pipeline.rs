use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio_test::{assert_pending, assert_ready_eq, task};

use crate::receiver::audio_pipeline::*;
use crate::receiver::decoder::{AudioDecoder, DecodeError, PcmDecoder};
use crate::receiver::reorder_buffer::FlowMode;

fn pcm_pipeline(high_water: usize) -> (DecodePipeline, AudioStream) {
    DecodePipeline::new(Box::new(PcmDecoder), high_water)
}

/// Big-endian sample carrying the sequence number; comes out little-endian
fn frame(seq: u16) -> Bytes {
    Bytes::copy_from_slice(&seq.to_be_bytes())
}

fn seq_of(chunk: &Bytes) -> u16 {
    u16::from_le_bytes([chunk[0], chunk[1]])
}

#[test]
fn test_decoded_chunks_reach_stream() {
    let (mut pipeline, mut stream) = pcm_pipeline(8);

    pipeline.add(Bytes::from_static(&[0x01, 0x02, 0x03, 0x04]), 1);

    assert_eq!(stream.try_recv().unwrap().as_ref(), &[0x02, 0x01, 0x04, 0x03]);
    assert!(stream.try_recv().is_none());
}

#[test]
fn test_high_water_triggers_buffering() {
    let (mut pipeline, stream) = pcm_pipeline(2);

    pipeline.add(frame(1), 1);
    assert_eq!(pipeline.mode(), FlowMode::Flowing);
    pipeline.add(frame(2), 2);
    assert_eq!(pipeline.mode(), FlowMode::Buffering);

    pipeline.add(frame(4), 4);
    pipeline.add(frame(3), 3);
    assert_eq!(pipeline.queued(), 2);
    assert_eq!(stream.pending_chunks(), 2);
}

#[test]
fn test_dropped_stream_releases_queue() {
    let (mut pipeline, stream) = pcm_pipeline(1);

    pipeline.add(frame(1), 1);
    assert_eq!(pipeline.mode(), FlowMode::Buffering);
    pipeline.add(frame(2), 2);
    assert_eq!(pipeline.queued(), 1);

    drop(stream);
    for seq in 3..1003 {
        pipeline.add(frame(seq), seq);
    }

    assert_eq!(pipeline.queued(), 0);
    assert_eq!(pipeline.mode(), FlowMode::Flowing);
}

#[tokio::test]
async fn test_closed_handle_releases_queue() {
    let (mut pipeline, _stream) = pcm_pipeline(1);
    pipeline.add(frame(1), 1);
    pipeline.add(frame(2), 2);

    let mut handle = PipelineHandle::start(pipeline);
    handle.close();

    let shared = handle.shared();
    let mut pipeline = shared.lock().await;
    pipeline.add(frame(3), 3);
    assert_eq!(pipeline.queued(), 0);
    assert_eq!(pipeline.mode(), FlowMode::Flowing);
}

#[test]
fn test_resume_after_read_drains_in_order() {
    let (mut pipeline, mut stream) = pcm_pipeline(2);

    pipeline.add(frame(1), 1);
    pipeline.add(frame(2), 2);
    for seq in [5, 3, 4] {
        pipeline.add(frame(seq), seq);
    }

    let mut delivered = Vec::new();
    while pipeline.queued() > 0 || stream.pending_chunks() > 0 {
        while let Some(chunk) = stream.try_recv() {
            delivered.push(seq_of(&chunk));
        }
        pipeline.resume();
    }

    assert_eq!(delivered, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_read_below_high_water_signals_readiness() {
    let (mut pipeline, mut stream) = pcm_pipeline(1);
    let ready = pipeline.readiness();

    pipeline.add(frame(1), 1);
    assert_eq!(pipeline.mode(), FlowMode::Buffering);

    let mut notified = task::spawn(ready.notified());
    assert_pending!(notified.poll());

    stream.try_recv().unwrap();
    assert!(notified.is_woken());
    assert_ready_eq!(notified.poll(), ());
}

#[test]
fn test_flush_drops_queued_packets() {
    let (mut pipeline, _stream) = pcm_pipeline(1);
    pipeline.add(frame(1), 1);
    pipeline.add(frame(2), 2);
    pipeline.add(frame(3), 3);

    assert_eq!(pipeline.flush(), 2);
    assert_eq!(pipeline.queued(), 0);
}

#[test]
fn test_decode_error_drops_frame() {
    struct Picky;
    impl AudioDecoder for Picky {
        fn decode(&mut self, frame: &[u8]) -> Result<Bytes, DecodeError> {
            if frame.is_empty() {
                return Err(DecodeError::Frame("empty".into()));
            }
            Ok(Bytes::copy_from_slice(frame))
        }
    }

    let (mut pipeline, mut stream) = DecodePipeline::new(Box::new(Picky), 4);
    pipeline.add(Bytes::new(), 1);
    pipeline.add(Bytes::from_static(b"ok"), 2);

    assert_eq!(stream.try_recv().unwrap().as_ref(), b"ok");
    assert!(stream.try_recv().is_none());
    assert_eq!(pipeline.mode(), FlowMode::Flowing);
}

#[test]
fn test_stream_pending_until_data() {
    let (mut pipeline, mut stream) = pcm_pipeline(4);

    let mut next = task::spawn(stream.recv());
    assert_pending!(next.poll());

    pipeline.add(frame(9), 9);
    assert!(next.is_woken());
    assert_ready_eq!(next.poll(), Some(Bytes::from_static(&[9, 0])));
}

#[tokio::test]
async fn test_close_ends_stream_after_buffered_chunks() {
    let (mut pipeline, stream) = pcm_pipeline(4);
    pipeline.add(frame(1), 1);

    let mut handle = PipelineHandle::start(pipeline);
    handle.shared().lock().await.add(frame(2), 2);
    handle.close();
    handle.close();
    assert!(handle.is_closed());

    let chunks: Vec<Bytes> = stream.collect().await;
    assert_eq!(chunks.iter().map(seq_of).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_resume_task_drains_when_consumer_reads() {
    let (pipeline, mut stream) = pcm_pipeline(2);
    let handle = PipelineHandle::start(pipeline);
    let shared = handle.shared();

    {
        let mut pipeline = shared.lock().await;
        pipeline.add(frame(1), 1);
        pipeline.add(frame(2), 2);
        for seq in [6, 4, 5, 3] {
            pipeline.add(frame(seq), seq);
        }
        assert_eq!(pipeline.queued(), 4);
    }

    let mut delivered = Vec::new();
    while delivered.len() < 6 {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("resume task stalled")
            .unwrap();
        delivered.push(seq_of(&chunk));
    }

    assert_eq!(delivered, vec![1, 2, 3, 4, 5, 6]);
}
