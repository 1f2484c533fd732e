//! Frame decoding: response body bytes in, discrete protocol frames out.

pub mod idle;
pub(crate) mod sse;
pub mod utf8;

use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use memchr::memchr2;

use crate::error::ClientError;
use crate::extract::BodyFraming;

pub use idle::{IdleElapsed, IdleTimeout};
use sse::SseBlock;
pub use utf8::Utf8Decoder;

const COMPACT_THRESHOLD_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Continue,
    Done,
}

/// Incremental frame decoder.
///
/// Feed it body bytes in whatever slices the transport delivers; complete
/// frames come out in arrival order and partial ones stay buffered. The
/// output is independent of how the input was sliced.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: BodyFraming,
    utf8: Utf8Decoder,
    buffer: String,
    read_offset: usize,
    sse: SseBlock,
    done: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(framing: BodyFraming) -> Self {
        Self {
            framing,
            utf8: Utf8Decoder::new(),
            buffer: String::new(),
            read_offset: 0,
            sse: SseBlock::default(),
            done: false,
        }
    }

    #[must_use]
    pub fn framing(&self) -> BodyFraming {
        self.framing
    }

    /// `true` once an event-stream `[DONE]` block has been seen. A done
    /// decoder ignores further input.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode one network read and append every completed frame to `frames`.
    pub fn feed(&mut self, bytes: &[u8], frames: &mut Vec<String>) {
        if self.done {
            return;
        }
        self.utf8.decode(bytes, &mut self.buffer);
        if self.framing == BodyFraming::Whole {
            return;
        }
        self.split_complete_lines(frames, false);
    }

    /// End of stream: finalize partial characters and flush the remainder as
    /// complete.
    pub fn finish(&mut self, frames: &mut Vec<String>) {
        if self.done {
            return;
        }
        self.utf8.flush(&mut self.buffer);

        match self.framing {
            BodyFraming::Whole => {
                frames.push(std::mem::take(&mut self.buffer));
                self.read_offset = 0;
            }
            BodyFraming::Sse | BodyFraming::Lines => {
                self.split_complete_lines(frames, true);
                if self.done {
                    return;
                }
                let tail = std::mem::take(&mut self.buffer);
                let tail = &tail[self.read_offset..];
                self.read_offset = 0;
                let tail = tail.strip_suffix('\r').unwrap_or(tail);
                if !tail.is_empty() && self.process_line(tail, frames) == LineOutcome::Done {
                    return;
                }
                if self.framing == BodyFraming::Sse && self.sse.dispatch(frames) == LineOutcome::Done {
                    self.done = true;
                }
            }
        }
    }

    fn process_line(&mut self, line: &str, frames: &mut Vec<String>) -> LineOutcome {
        let outcome = process_line(self.framing, &mut self.sse, line, frames);
        if outcome == LineOutcome::Done {
            self.done = true;
        }
        outcome
    }

    /// Cut complete lines off the buffer. `\n`, `\r\n` and a bare `\r` all
    /// end a line; a `\r` at the very end of the buffer waits for the next
    /// read unless `at_eof` is set.
    fn split_complete_lines(&mut self, frames: &mut Vec<String>, at_eof: bool) {
        let mut processed_up_to = self.read_offset;
        let mut finished = false;
        while let Some(rel_pos) = memchr2(b'\n', b'\r', &self.buffer.as_bytes()[processed_up_to..]) {
            let line_end = processed_up_to + rel_pos;
            let next_line = if self.buffer.as_bytes()[line_end] == b'\r' {
                match self.buffer.as_bytes().get(line_end + 1) {
                    Some(b'\n') => line_end + 2,
                    Some(_) => line_end + 1,
                    None if at_eof => line_end + 1,
                    None => break,
                }
            } else {
                line_end + 1
            };
            let line = &self.buffer[processed_up_to..line_end];
            processed_up_to = next_line;
            if process_line(self.framing, &mut self.sse, line, frames) == LineOutcome::Done {
                finished = true;
                break;
            }
        }

        if finished {
            // Anything after [DONE] in this read is never consumed.
            self.done = true;
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2
                || self.read_offset >= COMPACT_THRESHOLD_BYTES);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

fn process_line(
    framing: BodyFraming,
    sse: &mut SseBlock,
    line: &str,
    frames: &mut Vec<String>,
) -> LineOutcome {
    match framing {
        BodyFraming::Sse => sse.process_line(line, frames),
        BodyFraming::Lines => {
            if !line.trim().is_empty() {
                frames.push(line.to_owned());
            }
            LineOutcome::Continue
        }
        BodyFraming::Whole => LineOutcome::Continue,
    }
}

/// Decode a complete byte sequence in one pass.
#[must_use]
pub fn decode_all(framing: BodyFraming, bytes: &[u8]) -> Vec<String> {
    let mut decoder = FrameDecoder::new(framing);
    let mut frames = Vec::new();
    decoder.feed(bytes, &mut frames);
    decoder.finish(&mut frames);
    frames
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Body reads with transport errors mapped to `network_error` and, when
/// `idle` is set, a `timeout` error after a silent gap of that length.
pub type GuardedReads = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, ClientError>> + Send>>;

/// Wrap a byte stream into [`GuardedReads`]. Must be called inside a Tokio
/// runtime when `idle` is set.
pub fn guarded_reads<S, E>(byte_stream: S, idle: Option<Duration>) -> GuardedReads
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    match idle {
        Some(period) => Box::pin(IdleTimeout::new(byte_stream, period).map(|item| match item {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(err)) => Err(ClientError::Network(err.to_string())),
            Err(elapsed) => Err(ClientError::Timeout(elapsed.to_string())),
        })),
        None => Box::pin(
            byte_stream.map(|item| item.map_err(|err| ClientError::Network(err.to_string()))),
        ),
    }
}

/// Split a newline-delimited byte stream into lines.
///
/// When `idle` is set the read fails with a `timeout` error if the body goes
/// silent for that long; the timer restarts on every read. Read errors end
/// the stream after being reported as `network_error`.
pub fn line_stream<S, E>(
    byte_stream: S,
    idle: Option<Duration>,
) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let reads = guarded_reads(byte_stream, idle);

    futures_util::stream::unfold(
        (
            reads,
            FrameDecoder::new(BodyFraming::Lines),
            std::collections::VecDeque::<String>::new(),
            Vec::<String>::new(),
            false,
        ),
        |(mut reads, mut decoder, mut pending, mut parsed, mut finished)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (reads, decoder, pending, parsed, finished)));
                }
                if finished {
                    return None;
                }

                match reads.as_mut().next().await {
                    Some(Ok(bytes)) => decoder.feed(&bytes, &mut parsed),
                    Some(Err(err)) => {
                        finished = true;
                        return Some((Err(err), (reads, decoder, pending, parsed, finished)));
                    }
                    None => {
                        decoder.finish(&mut parsed);
                        finished = true;
                    }
                }
                pending.extend(parsed.drain(..));
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_in_slices(framing: BodyFraming, input: &[u8], slices: &[usize]) -> Vec<String> {
        let mut decoder = FrameDecoder::new(framing);
        let mut frames = Vec::new();
        let mut start = 0;
        for &end in slices {
            decoder.feed(&input[start..end], &mut frames);
            start = end;
        }
        decoder.feed(&input[start..], &mut frames);
        decoder.finish(&mut frames);
        frames
    }

    #[test]
    fn sse_frames_survive_every_two_way_split() {
        let input = "data: {\"t\":\"é😀\"}\n\n: ping\n\ndata: a\ndata: b\r\n\r\ndata: tail".as_bytes();
        let whole = decode_all(BodyFraming::Sse, input);
        assert_eq!(
            whole,
            vec![
                "{\"t\":\"é😀\"}".to_string(),
                "a\nb".to_string(),
                "tail".to_string()
            ]
        );
        for split in 0..=input.len() {
            assert_eq!(
                decode_in_slices(BodyFraming::Sse, input, &[split]),
                whole,
                "split at {split}"
            );
        }
    }

    #[test]
    fn sse_frames_survive_byte_at_a_time() {
        let input = "data: one\n\ndata: twö\n\n".as_bytes();
        let slices: Vec<usize> = (1..input.len()).collect();
        assert_eq!(
            decode_in_slices(BodyFraming::Sse, input, &slices),
            vec!["one".to_string(), "twö".to_string()]
        );
    }

    #[test]
    fn done_halts_the_current_read() {
        let mut decoder = FrameDecoder::new(BodyFraming::Sse);
        let mut frames = Vec::new();
        decoder.feed(b"data: a\n\ndata: [DONE]\n\ndata: b\n\n", &mut frames);
        assert_eq!(frames, vec!["a".to_string()]);
        assert!(decoder.is_done());

        decoder.feed(b"data: c\n\n", &mut frames);
        decoder.finish(&mut frames);
        assert_eq!(frames, vec!["a".to_string()]);
    }

    #[test]
    fn done_in_flushed_tail_is_not_emitted() {
        let frames = decode_all(BodyFraming::Sse, b"data: a\n\ndata: [DONE]");
        assert_eq!(frames, vec!["a".to_string()]);
    }

    #[test]
    fn lines_are_verbatim_and_blank_lines_skipped() {
        let input = b"{\"a\":1}\r\n\ndata: not-stripped\nplain text";
        let whole = decode_all(BodyFraming::Lines, input);
        assert_eq!(
            whole,
            vec![
                "{\"a\":1}".to_string(),
                "data: not-stripped".to_string(),
                "plain text".to_string()
            ]
        );
        for split in 0..=input.len() {
            assert_eq!(decode_in_slices(BodyFraming::Lines, input, &[split]), whole);
        }
    }

    #[test]
    fn bare_carriage_returns_end_lines() {
        let input = b"{\"a\":1}\r{\"b\":2}\r\n\rplain\r";
        let whole = decode_all(BodyFraming::Lines, input);
        assert_eq!(
            whole,
            vec![
                "{\"a\":1}".to_string(),
                "{\"b\":2}".to_string(),
                "plain".to_string()
            ]
        );
        for split in 0..=input.len() {
            assert_eq!(
                decode_in_slices(BodyFraming::Lines, input, &[split]),
                whole,
                "split at {split}"
            );
        }

        let sse = b"data: one\r\rdata: two\r\ndata: three\r\r";
        let frames = decode_all(BodyFraming::Sse, sse);
        assert_eq!(frames, vec!["one".to_string(), "two\nthree".to_string()]);
        for split in 0..=sse.len() {
            assert_eq!(decode_in_slices(BodyFraming::Sse, sse, &[split]), frames, "split at {split}");
        }
    }

    #[test]
    fn whole_buffer_emits_single_document_at_finish() {
        let mut decoder = FrameDecoder::new(BodyFraming::Whole);
        let mut frames = Vec::new();
        decoder.feed(b"{\"output\":", &mut frames);
        decoder.feed(b"{\"text\":\"hi\"}}\n", &mut frames);
        assert!(frames.is_empty());
        decoder.finish(&mut frames);
        assert_eq!(frames, vec!["{\"output\":{\"text\":\"hi\"}}\n".to_string()]);
    }

    #[test]
    fn large_streams_compact_without_losing_frames() {
        let mut input = String::new();
        for i in 0..2_000 {
            input.push_str(&format!("data: {{\"i\":{i}}}\n\n"));
        }
        let slices: Vec<usize> = (1..input.len()).step_by(97).collect();
        let frames = decode_in_slices(BodyFraming::Sse, input.as_bytes(), &slices);
        assert_eq!(frames.len(), 2_000);
        assert_eq!(frames[1_999], "{\"i\":1999}");
    }

    #[tokio::test]
    async fn line_stream_reassembles_lines() {
        let source = futures_util::stream::iter(vec![
            Ok::<Bytes, std::convert::Infallible>(Bytes::from_static(b"first\nsec")),
            Ok(Bytes::from_static(b"ond\n")),
            Ok(Bytes::from_static(b"third")),
        ]);
        let lines: Vec<_> = line_stream(source, None).collect().await;
        assert_eq!(
            lines,
            vec![
                Ok("first".to_string()),
                Ok("second".to_string()),
                Ok("third".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn line_stream_idle_gap_is_timeout() {
        let source = futures_util::stream::iter(vec![Ok::<Bytes, std::convert::Infallible>(
            Bytes::from_static(b"only\n"),
        )])
        .chain(futures_util::stream::pending());
        let mut lines = Box::pin(line_stream(source, Some(Duration::from_millis(20))));
        assert_eq!(lines.next().await, Some(Ok("only".to_string())));
        let err = lines.next().await.and_then(Result::err).map(|e| e.code());
        assert_eq!(err.as_deref(), Some("timeout"));
        assert_eq!(lines.next().await, None);
    }
}
