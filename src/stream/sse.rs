//! Event-stream block assembly.
//!
//! Lines are fed one at a time (terminator already stripped). `data:` lines
//! accumulate into the current block; a blank line closes it. Other fields
//! (`event:`, `id:`, `retry:`, comments) carry nothing the extractor needs
//! and are ignored.

use super::LineOutcome;

pub(crate) const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Default)]
pub(crate) struct SseBlock {
    data: String,
    has_data: bool,
}

impl SseBlock {
    pub(crate) fn process_line(&mut self, line: &str, frames: &mut Vec<String>) -> LineOutcome {
        if line.is_empty() {
            return self.dispatch(frames);
        }

        // Comment line
        if line.starts_with(':') {
            return LineOutcome::Continue;
        }

        if let Some(value) = line.strip_prefix("data:") {
            if self.has_data {
                self.data.push('\n');
            } else {
                self.has_data = true;
            }
            self.data.push_str(value.trim());
        }
        LineOutcome::Continue
    }

    /// Close the current block. Empty payloads are discarded; `[DONE]` ends
    /// the stream.
    pub(crate) fn dispatch(&mut self, frames: &mut Vec<String>) -> LineOutcome {
        if !self.has_data {
            return LineOutcome::Continue;
        }
        self.has_data = false;
        let payload = std::mem::take(&mut self.data);
        if payload == DONE_SENTINEL {
            return LineOutcome::Done;
        }
        if !payload.is_empty() {
            frames.push(payload);
        }
        LineOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_lines(block: &mut SseBlock, lines: &[&str]) -> (Vec<String>, bool) {
        let mut frames = Vec::new();
        for line in lines {
            if block.process_line(line, &mut frames) == LineOutcome::Done {
                return (frames, true);
            }
        }
        (frames, false)
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let mut block = SseBlock::default();
        let (frames, done) = feed_lines(&mut block, &["data: line1", "data:line2", ""]);
        assert_eq!(frames, vec!["line1\nline2".to_string()]);
        assert!(!done);
    }

    #[test]
    fn event_and_id_fields_are_ignored() {
        let mut block = SseBlock::default();
        let (frames, _) = feed_lines(
            &mut block,
            &["event: message", "id: 7", ": keepalive", "data: {}", ""],
        );
        assert_eq!(frames, vec!["{}".to_string()]);
    }

    #[test]
    fn empty_payload_is_discarded() {
        let mut block = SseBlock::default();
        let (frames, _) = feed_lines(&mut block, &["data:", "", "data:   ", ""]);
        assert!(frames.is_empty());
    }

    #[test]
    fn done_block_stops() {
        let mut block = SseBlock::default();
        let (frames, done) = feed_lines(&mut block, &["data: a", "", "data: [DONE]", "", "data: b", ""]);
        assert_eq!(frames, vec!["a".to_string()]);
        assert!(done);
    }

    #[test]
    fn blank_lines_without_data_do_nothing() {
        let mut block = SseBlock::default();
        let (frames, done) = feed_lines(&mut block, &["", "", ""]);
        assert!(frames.is_empty());
        assert!(!done);
    }
}
