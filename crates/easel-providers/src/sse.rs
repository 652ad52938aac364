//! Server-Sent Events decoding.
//!
//! [`SseDecoder`] is a push-based line decoder; [`parse_sse_stream`] drives it
//! from a `reqwest::Response` body.

use std::collections::VecDeque;

use futures::Stream;
use tokio_stream::StreamExt;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental SSE decoder. Bytes may be split anywhere, including mid-line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    ready: VecDeque<SseEvent>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.line(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Next complete event, if any.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        self.ready.pop_front()
    }

    /// Flush a trailing event not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.line(line.trim_end_matches('\r'));
        }
        self.dispatch();
        self.ready.pop_front()
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
        } else if line.starts_with(':') {
            // comment
        } else if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            self.id = Some(value.trim_start().to_string());
        }
    }

    fn dispatch(&mut self) {
        if self.data.is_empty() {
            self.event = None;
            return;
        }
        self.ready.push_back(SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        });
        self.data.clear();
    }
}

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send {
    let byte_stream = response.bytes_stream();

    futures::stream::unfold(
        (Box::pin(byte_stream), SseDecoder::new(), false),
        |(mut bytes, mut decoder, mut ended)| async move {
            loop {
                if let Some(event) = decoder.next_event() {
                    return Some((Ok(event), (bytes, decoder, ended)));
                }
                if ended {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => decoder.push(&chunk),
                    Some(Err(e)) => {
                        ended = true;
                        return Some((
                            Err(anyhow::anyhow!("SSE stream error: {e}")),
                            (bytes, decoder, ended),
                        ));
                    }
                    None => {
                        ended = true;
                        if let Some(event) = decoder.finish() {
                            return Some((Ok(event), (bytes, decoder, ended)));
                        }
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: message\nda");
        assert!(decoder.next_event().is_none());
        decoder.push(b"ta: {\"a\":1}\r\n\r\n");
        let event = decoder.next_event().unwrap();
        assert_eq!(event.event.as_deref(), Some("message"));
        assert_eq!(event.data, r#"{"a":1}"#);
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        decoder.push(b": keep-alive\n\ndata: one\ndata: two\nid: 7\n\n");
        let event = decoder.next_event().unwrap();
        assert_eq!(event.data, "one\ntwo");
        assert_eq!(event.id.as_deref(), Some("7"));
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: [DONE]");
        assert!(decoder.next_event().is_none());
        assert_eq!(decoder.finish().unwrap().data, "[DONE]");
    }
}
