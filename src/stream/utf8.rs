/// Incremental UTF-8 decoder.
///
/// Multi-byte sequences split across reads are carried over to the next
/// [`decode`](Utf8Decoder::decode) call. Invalid bytes become U+FFFD; an
/// incomplete tail is only finalized by [`flush`](Utf8Decoder::flush).
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` and append the complete characters to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        if self.pending.is_empty() {
            decode_into(bytes, out, &mut self.pending);
            return;
        }

        let mut joined = std::mem::take(&mut self.pending);
        joined.extend_from_slice(bytes);
        decode_into(&joined, out, &mut self.pending);
    }

    /// End of input: an unfinished sequence becomes a replacement character.
    pub fn flush(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn decode_into(mut input: &[u8], out: &mut String, pending: &mut Vec<u8>) {
    loop {
        match std::str::from_utf8(input) {
            Ok(text) => {
                out.push_str(text);
                return;
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                if let Ok(valid) = std::str::from_utf8(&input[..valid_up_to]) {
                    out.push_str(valid);
                }
                match err.error_len() {
                    Some(invalid_len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        input = &input[valid_up_to + invalid_len..];
                    }
                    None => {
                        pending.extend_from_slice(&input[valid_up_to..]);
                        return;
                    }
                }
            }
        }
    }
}
