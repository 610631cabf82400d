//! Payload compression.
//!
//! Payloads above a size threshold are deflated with zlib framing. The compressed
//! form is kept only when it saves at least 10% of the input; otherwise the
//! original bytes are stored and the record is marked uncompressed. The zlib
//! header and Adler-32 trailer make a damaged stream fail decoding instead of
//! yielding garbage.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::CodecError;

/// Minimum fraction of the input that compression must save, in percent.
const MIN_SAVINGS_PERCENT: u64 = 10;

/// Output of [`PayloadCodec::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Bytes to store.
    pub bytes: Vec<u8>,
    /// Whether `bytes` is the compressed form.
    pub compressed: bool,
}

/// Deflate-based payload codec with a size threshold.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    threshold: usize,
    level: Compression,
}

impl PayloadCodec {
    /// Creates a codec that compresses inputs strictly larger than `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            level: Compression::default(),
        }
    }

    /// Overrides the deflate level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Returns the size threshold in bytes.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Compresses `input` if it is large enough and compression pays off.
    pub fn compress(&self, input: &[u8]) -> Result<Encoded, CodecError> {
        if input.len() <= self.threshold {
            return Ok(Encoded {
                bytes: input.to_vec(),
                compressed: false,
            });
        }

        let mut encoder = ZlibEncoder::new(Vec::with_capacity(input.len() / 2), self.level);
        encoder
            .write_all(input)
            .map_err(|e| CodecError::Compression {
                message: e.to_string(),
            })?;
        let deflated = encoder.finish().map_err(|e| CodecError::Compression {
            message: e.to_string(),
        })?;

        if worth_it(input.len(), deflated.len()) {
            Ok(Encoded {
                bytes: deflated,
                compressed: true,
            })
        } else {
            Ok(Encoded {
                bytes: input.to_vec(),
                compressed: false,
            })
        }
    }

    /// Inflates a payload produced by [`compress`](Self::compress).
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = ZlibDecoder::new(input);
        let mut out = Vec::with_capacity(input.len().saturating_mul(3));
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CodecError::CorruptPayload {
                message: e.to_string(),
            })?;
        Ok(out)
    }

    /// Returns the caller's bytes for a stored payload.
    pub fn decode(&self, payload: &[u8], compressed: bool) -> Result<Vec<u8>, CodecError> {
        if compressed {
            self.decompress(payload)
        } else {
            Ok(payload.to_vec())
        }
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn worth_it(original: usize, compressed: usize) -> bool {
    (compressed as u64) * 100 <= (original as u64) * (100 - MIN_SAVINGS_PERCENT)
}
