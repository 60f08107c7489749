use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::{BufMut, Bytes, BytesMut};
use doorbell_common::frame::{Frame, FrameBroker};
use tracing::debug;

pub const BOUNDARY: &str = "FRAME";

/// Encode one frame as a `multipart/x-mixed-replace` part.
pub fn encode_part(frame: &Frame) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(&frame.jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// One viewer's cursor into the broker. Dropped by hyper when the client goes away.
struct Session {
    broker: Arc<FrameBroker>,
    last_seq: u64,
    sent: u64,
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(frames = self.sent, last_seq = self.last_seq, "stream client disconnected");
    }
}

/// Endless body that writes every new frame once, skipping any the client was
/// too slow to receive.
pub fn mjpeg_body(broker: Arc<FrameBroker>) -> Body {
    let session = Session {
        broker,
        last_seq: 0,
        sent: 0,
    };
    let frames = futures_util::stream::unfold(session, |mut session| async move {
        let frame = session.broker.await_next(session.last_seq).await;
        session.last_seq = frame.seq;
        session.sent += 1;
        Some((Ok::<_, Infallible>(encode_part(&frame)), session))
    });
    Body::from_stream(frames)
}

pub fn mjpeg_response(broker: Arc<FrameBroker>) -> Response {
    debug!("stream client connected");
    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::AGE, "0".to_string()),
            (header::CACHE_CONTROL, "no-cache, private".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
        ],
        mjpeg_body(broker),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn jpeg(fill: u8) -> Bytes {
        Bytes::from(vec![0xFF, 0xD8, fill, fill, 0xFF, 0xD9])
    }

    #[test]
    fn part_has_headers_and_trailing_crlf() {
        let broker = FrameBroker::new();
        let frame = broker.publish(jpeg(7)).unwrap();
        let part = encode_part(&frame);

        let expected_head = b"--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: 6\r\n\r\n";
        assert!(part.starts_with(expected_head));
        assert_eq!(&part[expected_head.len()..part.len() - 2], &frame.jpeg[..]);
        assert!(part.ends_with(b"\r\n"));
    }

    #[tokio::test]
    async fn body_sends_current_frame_then_waits_for_next() {
        let broker = Arc::new(FrameBroker::new());
        broker.publish(jpeg(1)).unwrap();

        let mut data = mjpeg_body(Arc::clone(&broker)).into_data_stream();
        let first = data.next().await.unwrap().unwrap();
        assert!(first.windows(2).any(|w| w == [1, 1]));

        let pending = tokio::time::timeout(Duration::from_millis(30), data.next()).await;
        assert!(pending.is_err(), "no new frame was published");

        broker.publish(jpeg(2)).unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), data.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(second.windows(2).any(|w| w == [2, 2]));
    }

    #[tokio::test]
    async fn slow_client_skips_to_latest() {
        let broker = Arc::new(FrameBroker::new());
        let mut data = mjpeg_body(Arc::clone(&broker)).into_data_stream();

        broker.publish(jpeg(1)).unwrap();
        broker.publish(jpeg(2)).unwrap();
        broker.publish(jpeg(3)).unwrap();

        let part = data.next().await.unwrap().unwrap();
        assert!(part.windows(2).any(|w| w == [3, 3]));
    }
}
