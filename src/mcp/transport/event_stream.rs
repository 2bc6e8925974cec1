//! Server-sent event decoding shared by both HTTP transports
//!
//! Events are blocks of `field: value` lines separated by a blank line.
//! `data:` lines are joined with `\n`; `event:` and `id:` are kept; comment
//! lines (leading `:`) and `retry:` are ignored. Bytes are buffered until a
//! full block is available, so multi-byte characters split across chunks
//! decode correctly.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// One decoded event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; `None` means the default `message` type
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
    /// `id:` field
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type, defaulting to `message`
    pub fn kind(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    /// Keep-alive events carry no payload for the client.
    pub fn is_ping(&self) -> bool {
        self.kind().eq_ignore_ascii_case("ping") || self.data.eq_ignore_ascii_case("[ping]")
    }
}

/// Incremental decoder.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::transport::event_stream::SseDecoder;
///
/// let mut decoder = SseDecoder::default();
/// assert!(decoder.push(b"event: endpoint\ndata: /messages?s").is_empty());
/// let events = decoder.push(b"ession=1\n\n");
/// assert_eq!(events[0].kind(), "endpoint");
/// assert_eq!(events[0].data, "/messages?session=1");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..pos])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&rest))
    }
}

/// Parse one event block. Blocks with no fields of interest yield `None`.
pub fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut seen = false;

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => {
                data_lines.push(value);
                seen = true;
            }
            "event" => {
                event.event = Some(value.to_string());
                seen = true;
            }
            "id" => event.id = Some(value.to_string()),
            _ => {}
        }
    }

    if !seen {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// Decode `byte_stream` and hand each non-ping event to `on_event` until the
/// stream ends, `cancel` fires, or `on_event` returns `false`.
pub async fn pump_events<S, F>(byte_stream: S, cancel: CancellationToken, mut on_event: F)
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send,
    F: FnMut(SseEvent) -> bool + Send,
{
    let mut decoder = SseDecoder::default();
    tokio::pin!(byte_stream);

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            chunk = byte_stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for event in decoder.push(&bytes) {
                    if event.is_ping() {
                        continue;
                    }
                    if !on_event(event) {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::debug!("event stream ended with error: {e}");
                break;
            }
            None => break,
        }
    }

    if let Some(event) = decoder.finish() {
        if !event.is_ping() {
            on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_events_in_one_chunk() {
        let mut d = SseDecoder::default();
        let events = d.push(b"data: first\n\ndata: second\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "first");
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn test_crlf_and_multiline_data() {
        let mut d = SseDecoder::default();
        let events = d.push(b"id: 42\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].kind(), "message");
    }

    #[test]
    fn test_comments_only_block_is_skipped() {
        let mut d = SseDecoder::default();
        assert!(d.push(b": keep-alive\n\n").is_empty());
    }

    #[test]
    fn test_split_utf8_character() {
        let mut d = SseDecoder::default();
        let text = "data: caf\u{e9}\n\n".as_bytes();
        let split = text.len() - 3;
        assert!(d.push(&text[..split]).is_empty());
        assert_eq!(d.push(&text[split..])[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_ping_detection() {
        assert!(parse_block("event: ping\ndata: x").unwrap().is_ping());
        assert!(parse_block("data: [PING]").unwrap().is_ping());
        assert!(!parse_block("data: {}").unwrap().is_ping());
    }

    #[tokio::test]
    async fn test_pump_skips_pings_and_flushes_tail() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"event: ping\ndata: -\n\n")),
            Ok(Bytes::from_static(b"data: one\n\ndata: two")),
        ];
        let mut seen = Vec::new();
        pump_events(
            futures::stream::iter(chunks),
            CancellationToken::new(),
            |e| {
                seen.push(e.data);
                true
            },
        )
        .await;
        assert_eq!(seen, vec!["one", "two"]);
    }
}
