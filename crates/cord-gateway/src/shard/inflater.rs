//! zlib-stream reassembly
//!
//! The gateway compresses the whole connection as one zlib stream. A logical
//! message may span several binary frames and is complete once the buffered
//! bytes end with the sync-flush marker. The decompression context carries the
//! dictionary across messages, so it lives as long as the connection.

use flate2::{Decompress, DecompressError, FlushDecompress, Status};

/// Sync-flush marker ending every complete compressed message
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

const MIN_OUTPUT_GROWTH: usize = 4096;

pub struct Inflater {
    decompress: Decompress,
    buffer: Vec<u8>,
}

impl Inflater {
    #[must_use]
    pub fn new() -> Self {
        Self {
            decompress: Decompress::new(true),
            buffer: Vec::new(),
        }
    }

    /// Feed one binary frame
    ///
    /// Returns `Ok(None)` while the message is still incomplete. On a corrupt
    /// stream the context and buffer are reset before the error is returned;
    /// the peer's stream cannot be resynchronised after that.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>, DecompressError> {
        self.buffer.extend_from_slice(frame);
        if !self.buffer.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        let result = self.inflate();
        self.buffer.clear();
        if result.is_err() {
            self.reset();
        }
        result.map(Some)
    }

    /// Bytes buffered towards an incomplete message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.decompress = Decompress::new(true);
        self.buffer.clear();
    }

    fn inflate(&mut self) -> Result<Vec<u8>, DecompressError> {
        let mut out = Vec::with_capacity((self.buffer.len() * 4).max(MIN_OUTPUT_GROWTH));
        let mut offset = 0;

        loop {
            let in_before = self.decompress.total_in();
            let offset_before = offset;
            let out_before = out.len();

            let status =
                self.decompress
                    .decompress_vec(&self.buffer[offset..], &mut out, FlushDecompress::Sync)?;

            offset += (self.decompress.total_in() - in_before) as usize;
            let consumed_all = offset >= self.buffer.len();
            let room_left = out.len() < out.capacity();

            if status == Status::StreamEnd || (consumed_all && room_left) {
                break;
            }
            if room_left && offset == offset_before && out.len() == out_before {
                // No progress with space to spare: nothing more to get from this input
                break;
            }

            out.reserve(out.capacity().max(MIN_OUTPUT_GROWTH));
        }

        Ok(out)
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("buffered", &self.buffer.len())
            .field("total_in", &self.decompress.total_in())
            .field("total_out", &self.decompress.total_out())
            .finish()
    }
}
