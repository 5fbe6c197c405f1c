//! Frame queue and camera stream descriptor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

/// Ordered, thread-safe FIFO queue of opaque video frames.
///
/// The camera decode path pushes frames; the relay worker thread drains
/// them. Single-producer/single-consumer use is assumed; FIFO order is
/// preserved. The queue is unbounded -- backpressure is the producer's
/// concern.
pub struct FrameQueue {
    inner: Mutex<VecDeque<Bytes>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a frame to the back of the queue.
    pub fn push(&self, frame: Bytes) {
        self.inner.lock().push_back(frame);
    }

    /// Remove and return the oldest frame, if any.
    pub fn try_pop(&self) -> Option<Bytes> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameQueue").field("len", &self.len()).finish()
    }
}

/// Descriptor for one camera stream consumed by the daemon.
#[derive(Debug, Clone)]
pub struct CameraStream {
    /// Unique stream identifier.
    pub id: String,
    /// Input codec tag of the camera's elementary stream (e.g. "h264").
    pub codec: String,
    /// RTSP publish URL the transcoder pushes to.
    pub stream_url: String,
    /// Decoded frame queue produced by the camera.
    pub video_queue: Arc<FrameQueue>,
}

impl CameraStream {
    pub fn new(codec: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            codec: codec.into(),
            stream_url: stream_url.into(),
            video_queue: Arc::new(FrameQueue::new()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_fifo_order() {
        let queue = FrameQueue::new();
        queue.push(Bytes::from_static(b"a"));
        queue.push(Bytes::from_static(b"bb"));
        queue.push(Bytes::from_static(b"ccc"));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(queue.try_pop().unwrap(), Bytes::from_static(b"bb"));
        assert_eq!(queue.try_pop().unwrap(), Bytes::from_static(b"ccc"));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn empty_queue_pops_none() {
        let queue = FrameQueue::new();
        assert!(queue.is_empty());
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn camera_stream_gets_unique_ids() {
        let a = CameraStream::new("h264", "rtsp://localhost:8554/a");
        let b = CameraStream::new("h264", "rtsp://localhost:8554/b");
        assert_ne!(a.id, b.id);
        assert!(a.video_queue.is_empty());
    }
}
