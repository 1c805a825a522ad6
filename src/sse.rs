//! Incremental Server-Sent-Events parsing.
//!
//! Network reads split frames at arbitrary byte offsets, so the parser keeps two
//! carry-over buffers: undecoded trailing bytes of a multi-byte character, and the
//! text received since the last frame delimiter. Only complete frames are
//! classified; the tail waits for the next read.

use serde_json::Value;
use tracing::{debug, warn};

/// Prefix of a payload line
pub const DATA_PREFIX: &str = "data:";
/// Prefix of an event-type line
pub const EVENT_PREFIX: &str = "event:";
/// Legacy end-of-stream marker sent as a raw payload
pub const DONE_SENTINEL: &str = "[DONE]";

const FRAME_DELIMITER: &str = "\n\n";
const ERROR_EVENT: &str = "error";

/// Why the backend considers the reply finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Literal `[DONE]` payload. Informational; reading continues until end of data.
    DoneMarker,
    /// `{"done": true}` payload. Reading stops immediately.
    DoneFlag,
}

/// Classified content of a complete SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ContentChunk(String),
    Termination(Termination),
    ServerError(String),
    MalformedFrame { payload: String, reason: String },
}

impl ServerEvent {
    /// Whether the read loop must stop and cancel the stream after this event.
    pub fn stops_stream(&self) -> bool {
        matches!(
            self,
            ServerEvent::Termination(Termination::DoneFlag) | ServerEvent::ServerError(_)
        )
    }
}

/// Streaming UTF-8 decoder that carries incomplete multi-byte sequences across reads.
///
/// Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any carried-over bytes) as forms complete characters.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Truncated character at the end: keep it for the next read
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Incremental frame parser for one request/response cycle
#[derive(Debug, Default)]
pub struct SseParser {
    decoder: Utf8Decoder,
    /// Text received since the last frame delimiter
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the network. Returns events of every frame completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ServerEvent> {
        let text = self.decoder.decode(bytes);
        self.feed_str(&text)
    }

    /// Feed already-decoded text.
    pub fn feed_str(&mut self, text: &str) -> Vec<ServerEvent> {
        self.buffer.push_str(text);
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let Some(last) = self.buffer.rfind(FRAME_DELIMITER) else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last + FRAME_DELIMITER.len());
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete
            .split(FRAME_DELIMITER)
            .filter(|frame| !frame.trim().is_empty())
            .flat_map(classify_frame)
            .collect()
    }

    /// Flush the decoder and classify a trailing frame that never got its delimiter.
    pub fn finish(&mut self) -> Vec<ServerEvent> {
        let rest = self.decoder.finish();
        self.buffer.push_str(&rest);
        let frame = std::mem::take(&mut self.buffer);
        if frame.trim().is_empty() {
            return Vec::new();
        }
        debug!(bytes = frame.len(), "Flushing unterminated trailing frame");
        classify_frame(&frame)
    }

    /// Text still waiting for a frame delimiter.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drop all carried-over state.
    pub fn reset(&mut self) {
        self.decoder = Utf8Decoder::new();
        self.buffer.clear();
    }
}

/// Classify every payload line of one complete frame, in line order.
pub fn classify_frame(frame: &str) -> Vec<ServerEvent> {
    let error_line = frame
        .lines()
        .find(|line| event_type(line) == Some(ERROR_EVENT));
    let is_error_event = error_line.is_some();

    let mut events = Vec::new();
    let mut reported_error = false;

    for line in frame.lines() {
        let Some(payload) = data_payload(line) else {
            continue;
        };

        if payload == DONE_SENTINEL {
            debug!("Received [DONE] marker");
            events.push(ServerEvent::Termination(Termination::DoneMarker));
            continue;
        }

        let json = match serde_json::from_str::<Value>(payload) {
            Ok(json) => json,
            Err(e) if is_error_event => {
                // Error event with an unstructured payload: report the payload as-is
                events.push(ServerEvent::ServerError(payload.to_string()));
                reported_error = true;
                debug!(%e, "Error event carried a non-JSON payload");
                continue;
            }
            Err(e) => {
                warn!(%e, payload_bytes = payload.len(), "Invalid SSE JSON payload");
                events.push(ServerEvent::MalformedFrame {
                    payload: payload.to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if json.get("done").and_then(Value::as_bool) == Some(true) {
            events.push(ServerEvent::Termination(Termination::DoneFlag));
        } else if let Some(chunk) = json.get("chunk").and_then(Value::as_str) {
            events.push(ServerEvent::ContentChunk(chunk.to_string()));
        } else if let Some(message) = json
            .get("message")
            .and_then(Value::as_str)
            .filter(|_| is_error_event)
        {
            events.push(ServerEvent::ServerError(message.to_string()));
            reported_error = true;
        } else {
            debug!(payload, "Ignoring unrecognized SSE payload");
        }
    }

    if let Some(line) = error_line {
        if !reported_error {
            events.push(ServerEvent::ServerError(line.trim().to_string()));
        }
    }

    events
}

fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(str::trim)
}

fn event_type(line: &str) -> Option<&str> {
    line.strip_prefix(EVENT_PREFIX).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> ServerEvent {
        ServerEvent::ContentChunk(text.to_string())
    }

    fn concat_chunks(events: &[ServerEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                ServerEvent::ContentChunk(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_complete_frames() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"chunk\":\"He\"}\n\ndata: {\"chunk\":\"llo\"}\n\n");
        assert_eq!(events, vec![chunk("He"), chunk("llo")]);
        assert!(parser.pending().is_empty());
    }

    #[test]
    fn keeps_incomplete_frame_buffered() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"chu").is_empty());
        assert_eq!(parser.pending(), "data: {\"chu");
        let events = parser.feed(b"nk\":\"Hi\"}\n\n");
        assert_eq!(events, vec![chunk("Hi")]);
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_result() {
        let stream = "data: {\"chunk\":\"Hel\"}\n\ndata: {\"chunk\":\"lo, \"}\n\ndata: {\"chunk\":\"wörld\"}\n\ndata: {\"done\":true}\n\n";
        let bytes = stream.as_bytes();

        let mut whole = SseParser::new();
        let expected = whole.feed(bytes);

        for size in [1, 2, 3, 5, 7, 11] {
            let mut parser = SseParser::new();
            let mut events = Vec::new();
            for piece in bytes.chunks(size) {
                events.extend(parser.feed(piece));
            }
            events.extend(parser.finish());
            assert_eq!(events, expected, "read size {}", size);
        }
        assert_eq!(concat_chunks(&expected), "Hello, wörld");
    }

    #[test]
    fn reassembles_multibyte_characters_split_across_reads() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "né".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "n");
        assert_eq!(decoder.decode(&bytes[2..]), "é");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn invalid_utf8_becomes_replacement_character() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn crlf_delimiters_are_normalized() {
        let mut parser = SseParser::new();
        let mut events = parser.feed(b"data: {\"chunk\":\"a\"}\r\n\r");
        events.extend(parser.feed(b"\ndata: {\"chunk\":\"b\"}\r\n\r\n"));
        assert_eq!(events, vec![chunk("a"), chunk("b")]);
    }

    #[test]
    fn done_sentinel_does_not_stop_scanning() {
        let events = classify_frame("data: [DONE]\ndata: {\"chunk\":\"tail\"}");
        assert_eq!(
            events,
            vec![ServerEvent::Termination(Termination::DoneMarker), chunk("tail")]
        );
        assert!(!events[0].stops_stream());
    }

    #[test]
    fn done_flag_stops_the_stream() {
        let events = classify_frame("data: {\"done\":true}");
        assert_eq!(events, vec![ServerEvent::Termination(Termination::DoneFlag)]);
        assert!(events[0].stops_stream());
    }

    #[test]
    fn done_false_is_not_a_termination() {
        let events = classify_frame("data: {\"done\":false,\"chunk\":\"x\"}");
        assert_eq!(events, vec![chunk("x")]);
    }

    #[test]
    fn error_event_with_message_is_a_server_error() {
        let events = classify_frame("event: error\ndata: {\"message\":\"rate limited\"}");
        assert_eq!(events, vec![ServerEvent::ServerError("rate limited".to_string())]);
        assert!(events[0].stops_stream());
    }

    #[test]
    fn message_without_error_event_is_ignored() {
        assert!(classify_frame("data: {\"message\":\"hello\"}").is_empty());
    }

    #[test]
    fn bare_error_event_falls_back_to_raw_line() {
        let events = classify_frame("event: error");
        assert_eq!(events, vec![ServerEvent::ServerError("event: error".to_string())]);
    }

    #[test]
    fn error_event_with_unstructured_payload_reports_payload() {
        let events = classify_frame("event: error\ndata: upstream exploded");
        assert_eq!(
            events,
            vec![ServerEvent::ServerError("upstream exploded".to_string())]
        );
    }

    #[test]
    fn malformed_payload_is_classified_not_fatal() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {not json\n\ndata: {\"chunk\":\"ok\"}\n\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            ServerEvent::MalformedFrame { payload, .. } if payload == "{not json"
        ));
        assert!(!events[0].stops_stream());
        assert_eq!(events[1], chunk("ok"));
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let events = classify_frame(": keep-alive\nid: 7\nretry: 100\ndata: {\"chunk\":\"x\"}");
        assert_eq!(events, vec![chunk("x")]);
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"chunk\":\"end\"}").is_empty());
        assert_eq!(parser.finish(), vec![chunk("end")]);
        assert!(parser.pending().is_empty());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn reset_drops_buffered_text() {
        let mut parser = SseParser::new();
        parser.feed(b"data: {\"chunk\":\"stale");
        parser.reset();
        assert!(parser.pending().is_empty());
        assert_eq!(parser.feed(b"data: {\"chunk\":\"fresh\"}\n\n"), vec![chunk("fresh")]);
    }
}
