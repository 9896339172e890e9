//! Pulse domain model.
//!
//! # Responsibility
//! - Define the waveform record shapes shared by the write and read paths.
//! - Validate structural invariants before anything reaches storage.
//!
//! # Invariants
//! - `time` and `signal` always have equal length (zero allowed).
//! - A trace is stitched or averaged, never both.
//! - A composed trace has at least two sources.

use std::error::Error;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::raster::{KVPair, Point3D};

/// Stable identifier for every stored pulse.
pub type PulseId = Uuid;

/// Measurement category of a user-facing pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceVariant {
    Reference,
    Sample,
    Noise,
    Other,
}

/// How a derived pulse was built from its sources.
///
/// Persisted per final pulse so reconstruction never has to infer the edge
/// semantics from which insertion path wrote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionKind {
    /// Positionally ordered concatenation with per-segment shift.
    Stitch,
    /// Point-wise average of the sources; order is kept for reproducibility.
    Average,
}

/// Source-level pulse: waveform plus identity, nothing spatial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub uuid: PulseId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub time: Vec<f32>,
    pub signal: Vec<f32>,
    /// Optional link to the noise trace recorded alongside this pulse.
    pub noise: Option<PulseId>,
}

impl Pulse {
    pub fn new(timestamp: i64, time: Vec<f32>, signal: Vec<f32>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            timestamp,
            time,
            signal,
            noise: None,
        }
    }

    pub fn validate(&self) -> Result<(), PulseValidationError> {
        check_waveform(self.uuid, &self.time, &self.signal)
    }
}

/// One stitch segment: the source pulse, its slot in the concatenation
/// order, and the time shift applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseComposition {
    pub pulse: Pulse,
    pub position: u32,
    pub shift: f32,
}

/// User-facing pulse that may carry derivation lineage.
///
/// A stitched trace lists its segments in `derived_from`; an averaged trace
/// lists its inputs in `averaged_from`, and those inputs may themselves be
/// stitched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub uuid: PulseId,
    pub timestamp: i64,
    pub time: Vec<f32>,
    pub signal: Vec<f32>,
    pub noise: Option<PulseId>,
    pub derived_from: Option<Vec<PulseComposition>>,
    pub averaged_from: Option<Vec<Trace>>,
}

impl Trace {
    /// Creates a plain (leaf) trace with a generated identity.
    pub fn new(timestamp: i64, time: Vec<f32>, signal: Vec<f32>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            timestamp,
            time,
            signal,
            noise: None,
            derived_from: None,
            averaged_from: None,
        }
    }

    /// The stored composition discriminant this trace maps to, if any.
    pub fn composition_kind(&self) -> Option<CompositionKind> {
        match (&self.derived_from, &self.averaged_from) {
            (Some(_), _) => Some(CompositionKind::Stitch),
            (None, Some(_)) => Some(CompositionKind::Average),
            (None, None) => None,
        }
    }

    /// Copies the identity/waveform fields without lineage.
    pub fn as_pulse(&self) -> Pulse {
        Pulse {
            uuid: self.uuid,
            timestamp: self.timestamp,
            time: self.time.clone(),
            signal: self.signal.clone(),
            noise: self.noise,
        }
    }

    /// Validates the trace and, recursively, every composed source.
    pub fn validate(&self) -> Result<(), PulseValidationError> {
        check_waveform(self.uuid, &self.time, &self.signal)?;

        if self.derived_from.is_some() && self.averaged_from.is_some() {
            return Err(PulseValidationError::StitchedAndAveraged { uuid: self.uuid });
        }

        if let Some(segments) = &self.derived_from {
            if segments.len() < 2 {
                return Err(PulseValidationError::TooFewSources {
                    uuid: self.uuid,
                    count: segments.len(),
                });
            }
            for segment in segments {
                segment.pulse.validate()?;
            }
        }

        if let Some(sources) = &self.averaged_from {
            if sources.len() < 2 {
                return Err(PulseValidationError::TooFewSources {
                    uuid: self.uuid,
                    count: sources.len(),
                });
            }
            for source in sources {
                source.validate()?;
            }
        }

        Ok(())
    }
}

/// A final pulse with its spatial and acquisition metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub pulse: Trace,
    pub point: Point3D,
    pub variant: TraceVariant,
    /// The reference pulse this measurement was acquired against.
    pub reference: Option<PulseId>,
    pub annotations: Option<Vec<KVPair>>,
    /// Pass index for multi-pass rasters.
    pub pass_number: Option<i64>,
}

impl Measurement {
    pub fn validate(&self) -> Result<(), PulseValidationError> {
        self.pulse.validate()
    }
}

#[derive(Debug)]
pub enum PulseValidationError {
    WaveformLengthMismatch {
        uuid: PulseId,
        time: usize,
        signal: usize,
    },
    StitchedAndAveraged {
        uuid: PulseId,
    },
    TooFewSources {
        uuid: PulseId,
        count: usize,
    },
}

impl Display for PulseValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaveformLengthMismatch { uuid, time, signal } => write!(
                f,
                "pulse {uuid}: time has {time} samples but signal has {signal}"
            ),
            Self::StitchedAndAveraged { uuid } => {
                write!(f, "pulse {uuid}: cannot be both stitched and averaged")
            }
            Self::TooFewSources { uuid, count } => write!(
                f,
                "pulse {uuid}: composed traces need at least two sources, got {count}"
            ),
        }
    }
}

impl Error for PulseValidationError {}

fn check_waveform(
    uuid: PulseId,
    time: &[f32],
    signal: &[f32],
) -> Result<(), PulseValidationError> {
    if time.len() != signal.len() {
        return Err(PulseValidationError::WaveformLengthMismatch {
            uuid,
            time: time.len(),
            signal: signal.len(),
        });
    }
    Ok(())
}
