use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const ENCODE_FAILED_LINE: &str = "{\"error\":\"failed to encode stream record\"}\n";

/// Streams every record from `rx` as one JSON object per line. The body ends
/// when the producer drops its sender; dropping the body drops `rx`, which is
/// how producers learn the client went away.
pub fn ndjson_response<T>(rx: mpsc::Receiver<T>) -> Response
where
    T: Serialize + Send + 'static,
{
    let lines = ReceiverStream::new(rx).map(|record| {
        let line = match sonic_rs::to_string(&record) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                error!(error = %e, "failed to encode stream record");
                ENCODE_FAILED_LINE.to_string()
            }
        };
        Ok::<_, Infallible>(Bytes::from(line))
    });

    ([(CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(lines)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamChunk;

    #[tokio::test]
    async fn one_object_per_line() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamChunk::Response("Hi".into())).await.unwrap();
        tx.send(StreamChunk::Response(" there".into())).await.unwrap();
        drop(tx);

        let resp = ndjson_response(rx);
        assert_eq!(resp.headers()[CONTENT_TYPE], NDJSON_CONTENT_TYPE);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "{\"response\":\"Hi\"}\n{\"response\":\" there\"}\n"
        );
    }
}
