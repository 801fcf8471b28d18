//! Newline-delimited frame decoder.

use bytes::BytesMut;

/// Splits a byte stream delivered in arbitrary chunks into complete lines.
///
/// A frame is yielded only once its terminating `\n` has arrived; the bytes
/// after the last newline are carried over to the next delivery. Frames are
/// yielded without the newline and are otherwise verbatim (a trailing `\r`
/// is kept). There is no size limit on a single frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    remainder: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder with an empty remainder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivery and return every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Only the new bytes can contain a boundary we have not seen yet.
        let scan_from = self.remainder.len();
        self.remainder.extend_from_slice(chunk);

        let Some(last_newline) = self.remainder[scan_from..]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|pos| scan_from + pos)
        else {
            return Vec::new();
        };

        let complete = self.remainder.split_to(last_newline + 1);
        let mut frames: Vec<String> = complete[..]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        // Splitting "a\nb\n" yields a trailing empty piece after the final newline.
        frames.pop();
        frames
    }

    /// Consume the decoder at end of stream, yielding an unterminated
    /// trailing frame if one is buffered.
    #[must_use]
    pub fn finish(self) -> Option<String> {
        if self.remainder.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&self.remainder).into_owned())
    }

    /// Number of buffered bytes not yet part of a complete frame.
    #[must_use]
    pub fn remainder_len(&self) -> usize {
        self.remainder.len()
    }
}
