//! Waveform codec: packed little-endian f32 blobs.
//!
//! # Responsibility
//! - Serialize a pulse waveform (time and signal sequences) to the raw blob
//!   layout stored in the `pulses` table, and back.
//!
//! # Invariants
//! - No header or length prefix; sample count is blob length divided by 4.
//! - Round-trips are bit-exact, including NaN and infinity payloads.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Upper bound on samples per sequence, capping a single blob at 64 MiB.
pub const MAX_WAVEFORM_SAMPLES: usize = 1 << 24;

#[derive(Debug)]
pub enum EncodingError {
    /// A sequence exceeds [`MAX_WAVEFORM_SAMPLES`].
    TooLong { len: usize },
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong { len } => write!(
                f,
                "waveform of {len} samples exceeds the {MAX_WAVEFORM_SAMPLES} sample limit"
            ),
        }
    }
}

impl Error for EncodingError {}

#[derive(Debug)]
pub enum DecodeError {
    /// Blob length is not a whole number of f32 samples.
    Truncated { len: usize },
    /// Decoded time and signal sequences differ in length.
    LengthMismatch { time: usize, signal: usize },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { len } => {
                write!(f, "waveform blob of {len} bytes is not a multiple of 4")
            }
            Self::LengthMismatch { time, signal } => write!(
                f,
                "time sequence has {time} samples but signal has {signal}"
            ),
        }
    }
}

impl Error for DecodeError {}

/// Packs the time and signal sequences into two independent blobs.
pub fn encode(time: &[f32], signal: &[f32]) -> Result<(Vec<u8>, Vec<u8>), EncodingError> {
    Ok((pack(time)?, pack(signal)?))
}

/// Unpacks two blobs into equal-length time and signal sequences.
pub fn decode(time: &[u8], signal: &[u8]) -> Result<(Vec<f32>, Vec<f32>), DecodeError> {
    let time = unpack(time)?;
    let signal = unpack(signal)?;
    if time.len() != signal.len() {
        return Err(DecodeError::LengthMismatch {
            time: time.len(),
            signal: signal.len(),
        });
    }
    Ok((time, signal))
}

fn pack(values: &[f32]) -> Result<Vec<u8>, EncodingError> {
    if values.len() > MAX_WAVEFORM_SAMPLES {
        return Err(EncodingError::TooLong { len: values.len() });
    }
    let mut blob = Vec::with_capacity(values.len() * 4);
    for value in values {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    Ok(blob)
}

fn unpack(blob: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if blob.len() % 4 != 0 {
        return Err(DecodeError::Truncated { len: blob.len() });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
