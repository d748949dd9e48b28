//! Incremental decoder for the `data: ` line protocol.
//!
//! The response body arrives in arbitrary fragments. Fragment boundaries may
//! fall inside a line or inside a multi-byte UTF-8 character, so the decoder
//! keeps both undecoded bytes and an unterminated line between calls.

use parley_core::StreamEvent;
use tracing::{debug, trace, warn};

use crate::types::WireFrame;

/// Fixed prefix every accepted record starts with.
pub const FRAME_PREFIX: &str = "data: ";

/// Stateful decoder for one response body.
///
/// Create one per request; it is never reused across requests.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    buffer: String,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    frames_accepted: u64,
    lines_discarded: u64,
}

impl FrameDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw fragment and return every event it completes, in order.
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        if fragment.is_empty() {
            return Vec::new();
        }

        self.decode_utf8(fragment);

        let mut buffer = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = buffer[from..].find('\n') {
            let end = from + offset;
            if let Some(event) = self.parse_line(&buffer[start..end]) {
                events.push(event);
            }
            start = end + 1;
            from = start;
        }

        buffer.drain(..start);
        self.scanned = buffer.len();
        self.buffer = buffer;
        events
    }

    /// Flush at end of body.
    ///
    /// A final record that lacks its newline is still decoded if it is well
    /// formed; anything else left over is dropped. Never invents a terminal
    /// event.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let event = self.parse_line(&rest);
        debug!(
            frames = self.frames_accepted,
            discarded = self.lines_discarded,
            "Frame decoder finished"
        );
        event
    }

    /// Number of records decoded into events so far.
    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted
    }

    /// Number of non-blank lines dropped as malformed so far.
    pub fn lines_discarded(&self) -> u64 {
        self.lines_discarded
    }

    /// Append the decodable part of `fragment` to the line buffer.
    ///
    /// An incomplete sequence at the end is held back for the next fragment.
    /// Invalid sequences become U+FFFD.
    fn decode_utf8(&mut self, fragment: &[u8]) {
        let mut input = std::mem::take(&mut self.pending_bytes);
        input.extend_from_slice(fragment);

        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending_bytes = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return None;
        }

        let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
            self.lines_discarded += 1;
            debug!(line_len = line.len(), "Discarding line without data prefix");
            return None;
        };

        match serde_json::from_str::<WireFrame>(payload) {
            Ok(frame) => {
                self.frames_accepted += 1;
                let event = StreamEvent::from(frame);
                trace!(kind = event.kind(), "Decoded frame");
                Some(event)
            }
            Err(e) => {
                self.lines_discarded += 1;
                let preview: String = payload.chars().take(200).collect();
                warn!(error = %e, preview = %preview, "Discarding malformed frame");
                None
            }
        }
    }
}
