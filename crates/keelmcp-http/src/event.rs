//! Server-sent event wire parsing.

/// One parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, defaulting to `message`
    pub event: String,
    /// Concatenated `data:` lines
    pub data: String,
    /// `id:` field, when present
    pub id: Option<String>,
}

impl SseEvent {
    /// Parse one event block (the text between blank-line separators).
    ///
    /// Comment lines (leading `:`) are keep-alives and are ignored; an
    /// all-comment block returns `None`.
    pub fn parse(block: &str) -> Option<Self> {
        let mut event = None;
        let mut data: Vec<&str> = Vec::new();
        let mut id = None;

        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }
            if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            } else if let Some(value) = line.strip_prefix("id:") {
                id = Some(value.trim_start().to_string());
            }
        }

        if event.is_none() && data.is_empty() && id.is_none() {
            return None;
        }
        Some(Self {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
            id,
        })
    }
}

/// Incremental splitter: appends chunks and yields complete event
/// blocks as they become available.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    /// New empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain any completed events.
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);
            if let Some(event) = SseEvent::parse(&block) {
                events.push(event);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_event_and_data() {
        let event = SseEvent::parse("event: endpoint\ndata: /messages/abc").unwrap();
        assert_eq!(event.event, "endpoint");
        assert_eq!(event.data, "/messages/abc");
    }

    #[test]
    fn defaults_to_message_event() {
        let event = SseEvent::parse("data: {\"jsonrpc\":\"2.0\"}").unwrap();
        assert_eq!(event.event, "message");
    }

    #[test]
    fn multi_line_data_joins_with_newline() {
        let event = SseEvent::parse("data: one\ndata: two").unwrap();
        assert_eq!(event.data, "one\ntwo");
    }

    #[test]
    fn comment_blocks_are_dropped() {
        assert_eq!(SseEvent::parse(": keep-alive"), None);
    }

    #[test]
    fn buffer_yields_complete_events_across_chunks() {
        let mut buffer = SseBuffer::new();
        assert!(buffer.push("event: message\ndata: {\"a\"").is_empty());
        let events = buffer.push(":1}\n\nevent: message\ndata: x\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[1].data, "x");
    }
}
