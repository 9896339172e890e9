//! Raster session metadata model.
//!
//! # Responsibility
//! - Define the device, scan-configuration and session structures persisted
//!   in the single-row `raster_info` table.
//! - Validate configuration invariants before persistence.
//!
//! # Invariants
//! - An axes mapping assigns each machine axis to a distinct target axis.
//! - Repetition settings are strictly positive.

use std::error::Error;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point where each coordinate may be individually unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }
}

/// A fully defined offset vector in machine coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One scan line of a raster, from start to end point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterPattern {
    pub start_point: Point3D,
    pub end_point: Point3D,
}

/// Multi-pass repetition settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionsConfig {
    pub passes: u32,
    pub interval_millisecs: f64,
}

impl RepetitionsConfig {
    pub fn validate(&self) -> Result<(), RasterValidationError> {
        if self.passes == 0 {
            return Err(RasterValidationError::NonPositivePasses);
        }
        if self.interval_millisecs <= 0.0 {
            return Err(RasterValidationError::NonPositiveInterval {
                interval_millisecs: self.interval_millisecs,
            });
        }
        Ok(())
    }
}

/// Scan configuration for one raster session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterConfig {
    pub patterns: Vec<RasterPattern>,
    pub stepsize: f64,
    pub reference_point: Option<Point3D>,
    /// Acquire a fresh reference pulse every N sample pulses.
    pub acquire_ref_every: Option<i64>,
    pub repetitions_config: Option<RepetitionsConfig>,
}

impl RasterConfig {
    pub fn validate(&self) -> Result<(), RasterValidationError> {
        if let Some(repetitions) = &self.repetitions_config {
            repetitions.validate()?;
        }
        Ok(())
    }
}

/// Identity of the acquiring device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub device_serial_number: String,
    pub device_firmware_version: String,
}

/// Free-form annotation value: string, integer or float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KVValue {
    Text(String),
    Int(i64),
    Float(f64),
}

/// One key/value annotation pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KVPair {
    pub key: String,
    pub value: KVValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Maps one user axis onto a machine axis with a direction sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMap {
    pub axis: Axis,
    /// +1 or -1.
    pub sign: i8,
}

/// Assignment of the user x/y/z axes onto machine axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxesMapping {
    pub x: AxisMap,
    pub y: AxisMap,
    pub z: AxisMap,
}

impl AxesMapping {
    pub fn validate(&self) -> Result<(), RasterValidationError> {
        for map in [self.x, self.y, self.z] {
            if map.sign != 1 && map.sign != -1 {
                return Err(RasterValidationError::InvalidSign { sign: map.sign });
            }
        }
        let targets = [self.x.axis, self.y.axis, self.z.axis];
        for (i, axis) in targets.iter().enumerate() {
            if targets[i + 1..].contains(axis) {
                return Err(RasterValidationError::DuplicateAxisTarget { axis: *axis });
            }
        }
        Ok(())
    }
}

/// Transformation between user and machine coordinate systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    pub id: Uuid,
    /// User-chosen label.
    pub name: String,
    pub offset: Offset3D,
    pub mapping: AxesMapping,
    /// Milliseconds since the Unix epoch.
    pub last_used: i64,
    pub notes: Option<String>,
}

impl CoordinateTransform {
    pub fn validate(&self) -> Result<(), RasterValidationError> {
        self.mapping.validate()
    }
}

/// Session-level metadata for one raster acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub app_version: String,
    pub raster_id: Option<Uuid>,
    /// Acquisition start, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub annotations: Vec<KVPair>,
    /// Raw device configuration dump, kept opaque.
    pub device_configuration: serde_json::Value,
    pub user_coordinates: Option<CoordinateTransform>,
}

impl RasterMetadata {
    pub fn validate(&self) -> Result<(), RasterValidationError> {
        if let Some(transform) = &self.user_coordinates {
            transform.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum RasterValidationError {
    DuplicateAxisTarget { axis: Axis },
    InvalidSign { sign: i8 },
    NonPositivePasses,
    NonPositiveInterval { interval_millisecs: f64 },
}

impl Display for RasterValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateAxisTarget { axis } => {
                write!(f, "each axis must map to a unique target, {axis:?} is reused")
            }
            Self::InvalidSign { sign } => {
                write!(f, "axis sign must be 1 or -1, got {sign}")
            }
            Self::NonPositivePasses => write!(f, "repetition passes must be positive"),
            Self::NonPositiveInterval { interval_millisecs } => {
                write!(
                    f,
                    "repetition interval must be positive, got {interval_millisecs}"
                )
            }
        }
    }
}

impl Error for RasterValidationError {}
