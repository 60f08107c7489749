use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use doorbell_common::frame::FrameBroker;
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::ProducerError;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--<boundary>\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` body.
///
/// A part is only emitted once the following boundary has been seen, so a
/// returned buffer always holds the whole body of one part.
pub struct MultipartParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MultipartParser {
    /// `boundary` is the token from the Content-Type header, without dashes.
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    /// Feed a chunk from the wire and collect every part it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();
        let boundary_len = self.boundary.len();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        let _ = self.buffer.split_to(pos + boundary_len);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > boundary_len {
                            let _ = self.buffer.split_to(self.buffer.len() - boundary_len);
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let found = find_subsequence(&self.buffer[self.jpeg_start..], &self.boundary);
                    let Some(pos) = found else {
                        // Avoid rescanning bytes already known not to hold a boundary.
                        self.jpeg_start = self.buffer.len().saturating_sub(boundary_len);
                        break;
                    };

                    let jpeg_end = self.jpeg_start + pos;
                    let part = self.buffer.split_to(jpeg_end).freeze();
                    let _ = self.buffer.split_to(boundary_len);

                    // Strip trailing \r\n before boundary
                    let part = if part.ends_with(b"\r\n") {
                        part.slice(..part.len() - 2)
                    } else {
                        part
                    };
                    if !part.is_empty() {
                        parts.push(part);
                    }

                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        parts
    }
}

/// Consume the camera's MJPEG stream and publish every frame to the broker.
/// Reconnects with exponential backoff on failure.
pub async fn run_mjpeg_producer(stream_url: &str, boundary: &str, broker: Arc<FrameBroker>) {
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);

    loop {
        info!(url = stream_url, "connecting to MJPEG stream");
        match consume_stream(stream_url, boundary, &broker).await {
            Ok(()) => {
                info!("stream ended cleanly, reconnecting");
                backoff = Duration::from_secs(2);
            }
            Err(e) => {
                error!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn consume_stream(
    url: &str,
    boundary: &str,
    broker: &FrameBroker,
) -> Result<(), ProducerError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(ProducerError::HttpConnect)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(ProducerError::HttpConnect)?;

    if !response.status().is_success() {
        return Err(ProducerError::HttpStatus(response.status().as_u16()));
    }

    info!(status = %response.status(), "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MultipartParser::new(boundary);

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(ProducerError::HttpStream)?;
        for jpeg in parser.push(&chunk) {
            // Incomplete parts are logged and dropped by the broker.
            if let Ok(frame) = broker.publish(jpeg) {
                if frame.seq % 100 == 0 {
                    debug!(seq = frame.seq, "frames published");
                }
            }
        }
    }

    Ok(())
}

/// Polling-based fallback: periodically fetch single frames.
pub async fn run_polling_producer(frame_url: &str, broker: Arc<FrameBroker>, interval: Duration) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match client.get(frame_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(jpeg) => {
                    let _ = broker.publish(jpeg);
                }
                Err(e) => {
                    warn!(error = %e, "failed to read camera frame body");
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), "non-success response from camera");
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch camera frame");
            }
        }
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_A: &[u8] = &[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];
    const JPEG_B: &[u8] = &[0xFF, 0xD8, 0x03, 0x04, 0x05, 0xFF, 0xD9];

    fn part(jpeg: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
        out.extend_from_slice(jpeg);
        out.extend_from_slice(b"\r\n");
        out
    }

    #[test]
    fn part_is_emitted_only_after_next_boundary() {
        let mut parser = MultipartParser::new("frame");
        assert!(parser.push(&part(JPEG_A)).is_empty());

        let parts = parser.push(&part(JPEG_B));
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0][..], JPEG_A);
    }

    #[test]
    fn parts_split_across_chunks() {
        let mut stream = Vec::new();
        stream.extend(part(JPEG_A));
        stream.extend(part(JPEG_B));
        stream.extend(part(JPEG_A));

        let mut parser = MultipartParser::new("frame");
        let mut parts = Vec::new();
        for chunk in stream.chunks(3) {
            parts.extend(parser.push(chunk));
        }

        assert_eq!(parts.len(), 2);
        assert_eq!(&parts[0][..], JPEG_A);
        assert_eq!(&parts[1][..], JPEG_B);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut stream = b"HTTP noise before the first part".to_vec();
        stream.extend(part(JPEG_B));
        stream.extend(part(JPEG_A));

        let mut parser = MultipartParser::new("frame");
        let parts = parser.push(&stream);
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0][..], JPEG_B);
    }

    #[test]
    fn parsed_parts_publish_to_broker() {
        let broker = FrameBroker::new();
        let mut stream = part(JPEG_A);
        // A torn part: the body stops before the EOI marker.
        stream.extend(part(&JPEG_B[..4]));
        stream.extend(part(JPEG_A));

        let mut parser = MultipartParser::new("frame");
        let published: Vec<_> = parser
            .push(&stream)
            .into_iter()
            .filter_map(|jpeg| broker.publish(jpeg).ok())
            .collect();

        assert_eq!(published.len(), 1);
        assert_eq!(broker.current_seq(), 1);
        assert_eq!(&broker.latest().unwrap().jpeg[..], JPEG_A);
    }
}
