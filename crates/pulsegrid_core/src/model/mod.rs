//! Domain model for pulse waveforms and raster session metadata.
//!
//! # Responsibility
//! - Define canonical data structures used by the store and its callers.
//! - Keep validation of structural invariants next to the data they guard.
//!
//! # Invariants
//! - Every pulse is identified by a stable `PulseId`.
//! - Whether a pulse is "final" is never part of the model; it is derived
//!   from composition edge membership at query time.

pub mod pulse;
pub mod raster;
