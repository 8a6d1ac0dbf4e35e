//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only the `data` field matters for job logs. Multiple `data:` lines in one
//! event are joined with `\n`; a blank line dispatches the event.

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Ends the body. An event still missing its blank line is dropped, the
    /// same as a browser `EventSource` does. Returns whether one was dropped.
    pub fn finish(&mut self) -> bool {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest);
        let partial_line = !line.is_empty() && !line.starts_with(':');
        let dropped = partial_line || !self.data.is_empty();
        self.data.clear();
        dropped
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_split_across_chunks_are_reassembled() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: Provisioning con").is_empty());
        assert_eq!(
            decoder.push(b"tainer 4\n\ndata: next\r\n\r\n"),
            vec!["Provisioning container 4".to_string(), "next".to_string()]
        );
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\nevent: log\nid: 7\ndata:tight\n\n");
        assert_eq!(events, vec!["tight".to_string()]);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn unterminated_event_is_dropped_on_finish() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: Teardown compl").is_empty());
        assert!(decoder.finish());

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: Teardown completed\n").is_empty());
        assert!(decoder.finish());
        assert!(!decoder.finish());
    }

    #[test]
    fn finish_after_complete_events_drops_nothing() {
        let mut decoder = SseDecoder::default();
        assert_eq!(decoder.push(b"data: done\n\n: ping"), vec!["done".to_string()]);
        assert!(!decoder.finish());
    }
}
