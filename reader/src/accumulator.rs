//! Byte-stream framing for the serial link.
//!
//! The station sends one frame at a time but the host serial layer delivers
//! it in arbitrary chunks, so bytes are collected until a whole frame is
//! present. A lone non-STX byte is a complete control frame of its own.

use std::time::{Duration, Instant};

use siread_common::frame::{MAX_FRAME_LEN, STX, SiFrame};

/// A partial frame older than this is a leftover of a broken transfer.
const STALE_AFTER: Duration = Duration::from_millis(500);

/// Collects serial chunks into whole frames.
pub struct FrameAccumulator {
    buf: [u8; MAX_FRAME_LEN],
    end: usize,
    last_chunk: Option<Instant>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_FRAME_LEN],
            end: 0,
            last_chunk: None,
        }
    }

    /// Appends a chunk and returns every frame it completes, in order.
    ///
    /// `now` is the arrival time of the chunk; a gap longer than half a
    /// second discards whatever partial frame was pending.
    pub fn accumulate(&mut self, chunk: &[u8], now: Instant) -> Vec<SiFrame> {
        if let Some(last) = self.last_chunk {
            if self.end > 0 && now.duration_since(last) > STALE_AFTER {
                self.end = 0;
            }
        }
        self.last_chunk = Some(now);

        let mut frames = Vec::new();
        for &byte in chunk {
            if self.end < self.buf.len() {
                self.buf[self.end] = byte;
                self.end += 1;
            }
            if self.end == 1 && self.buf[0] != STX {
                frames.push(SiFrame::control(self.buf[0]));
                self.end = 0;
            } else if self.end >= 3 {
                // STX, command, length, payload, two CRC bytes, ETX.
                let expected = usize::from(self.buf[2]) + 6;
                if self.end >= expected {
                    frames.push(SiFrame::from_raw(self.buf[..expected].to_vec()));
                    self.buf.copy_within(expected..self.end, 0);
                    self.end -= expected;
                }
            }
        }
        frames
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
