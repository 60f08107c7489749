use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, warn};

/// JPEG start-of-image marker.
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
const EOI: [u8; 2] = [0xFF, 0xD9];

/// One complete JPEG image from the camera.
///
/// Frames are immutable once published and handed out as `Arc<Frame>`, so every
/// consumer of a given `seq` shares the same allocation.
#[derive(Debug)]
pub struct Frame {
    pub jpeg: Bytes,
    /// Monotonic sequence number. The first published frame is 1.
    pub seq: u64,
    pub captured_at_ms: i64,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Returns true if `data` is delimited by the JPEG SOI and EOI markers.
pub fn is_complete_jpeg(data: &[u8]) -> bool {
    data.len() >= SOI.len() + EOI.len() && data.starts_with(&SOI) && data.ends_with(&EOI)
}

/// Holds the latest camera frame and wakes consumers when it is replaced.
///
/// Single writer, many readers. The current frame lives in a `watch` channel:
/// `publish` swaps it and notifies every waiter in one step, and readers only
/// ever clone the `Arc`, never the JPEG bytes.
pub struct FrameBroker {
    tx: watch::Sender<Option<Arc<Frame>>>,
}

impl FrameBroker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Install a new frame, replacing the previous one.
    ///
    /// Buffers that are not a complete JPEG are dropped and the previous frame
    /// stays current.
    pub fn publish(&self, jpeg: Bytes) -> Result<Arc<Frame>, FrameError> {
        if !is_complete_jpeg(&jpeg) {
            warn!(bytes = jpeg.len(), "dropping incomplete JPEG frame");
            return Err(FrameError::Incomplete { len: jpeg.len() });
        }

        // Only the producer publishes, so nothing can slip in between reading
        // the current seq and replacing the frame.
        let seq = self.current_seq() + 1;
        let frame = Arc::new(Frame {
            jpeg,
            seq,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
        });
        self.tx.send_replace(Some(Arc::clone(&frame)));
        debug!(seq = frame.seq, bytes = frame.len(), "frame published");
        Ok(frame)
    }

    /// Current frame without waiting. `None` until the first publish.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.tx.borrow().clone()
    }

    /// Sequence number of the current frame, 0 if none has been published.
    pub fn current_seq(&self) -> u64 {
        self.tx.borrow().as_ref().map_or(0, |f| f.seq)
    }

    /// Wait for a frame newer than `last_seen`.
    ///
    /// Returns immediately if the current frame is already newer. A consumer
    /// that falls behind skips straight to the latest frame.
    pub async fn await_next(&self, last_seen: u64) -> Arc<Frame> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if let Some(frame) = current.as_ref().filter(|f| f.seq > last_seen) {
                    return Arc::clone(frame);
                }
            }
            // The sender lives as long as `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for FrameBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("incomplete JPEG frame ({len} bytes)")]
    Incomplete { len: usize },
}
