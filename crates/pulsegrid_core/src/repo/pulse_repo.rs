//! Pulse row persistence.
//!
//! # Responsibility
//! - Insert final and source pulse rows and read them back.
//! - Own the mapping between domain structs, the waveform codec and the
//!   `pulses` table columns.
//!
//! # Invariants
//! - Write paths validate domain structs before SQL mutations.
//! - Source rows carry only waveform/identity columns; variant and spatial
//!   columns stay NULL.
//! - Pulse rows are append-only; nothing here updates or deletes them.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::codec::{self, DecodeError, EncodingError};
use crate::db::DbError;
use crate::model::pulse::{
    CompositionKind, Measurement, Pulse, PulseId, PulseValidationError, TraceVariant,
};
use crate::model::raster::{KVPair, RasterValidationError};
use crate::repo::{from_json, to_json};

const PULSE_SELECT_SQL: &str = "SELECT
    uuid,
    time,
    signal,
    timestamp,
    x,
    y,
    z,
    reference,
    variant,
    annotations,
    pass_number,
    noise,
    composition
FROM pulses";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for pulse, lineage and session-metadata persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(PulseValidationError),
    RasterValidation(RasterValidationError),
    Db(DbError),
    Encoding(EncodingError),
    Decode(DecodeError),
    /// The (final, position) or (final, source) pair already exists.
    DuplicateEdge {
        final_uuid: PulseId,
        source_uuid: PulseId,
        position: u32,
    },
    /// Composition edges loop back onto an ancestor pulse.
    CompositionCycle {
        uuid: PulseId,
    },
    /// The single-row `raster_info` table is empty.
    MetadataMissing {
        path: PathBuf,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::RasterValidation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Encoding(err) => write!(f, "{err}"),
            Self::Decode(err) => write!(f, "{err}"),
            Self::DuplicateEdge {
                final_uuid,
                source_uuid,
                position,
            } => write!(
                f,
                "composition edge for final {final_uuid} at position {position} \
                 or with source {source_uuid} already exists"
            ),
            Self::CompositionCycle { uuid } => {
                write!(f, "composition edges form a cycle through pulse {uuid}")
            }
            Self::MetadataMissing { path } => {
                write!(f, "store `{}` has no raster metadata row", path.display())
            }
            Self::InvalidData(message) => write!(f, "invalid persisted pulse data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::RasterValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Encoding(err) => Some(err),
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PulseValidationError> for RepoError {
    fn from(value: PulseValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RasterValidationError> for RepoError {
    fn from(value: RasterValidationError) -> Self {
        Self::RasterValidation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::from(value))
    }
}

impl From<EncodingError> for RepoError {
    fn from(value: EncodingError) -> Self {
        Self::Encoding(value)
    }
}

impl From<DecodeError> for RepoError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Decoded `pulses` row. Waveform blobs stay packed until a caller asks
/// for samples.
#[derive(Debug, Clone)]
pub struct PulseRow {
    pub uuid: PulseId,
    pub timestamp: i64,
    pub time_blob: Vec<u8>,
    pub signal_blob: Vec<u8>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub reference: Option<PulseId>,
    pub variant: Option<TraceVariant>,
    pub annotations: Option<Vec<KVPair>>,
    pub pass_number: Option<i64>,
    pub noise: Option<PulseId>,
    pub composition: Option<CompositionKind>,
}

impl PulseRow {
    /// Unpacks the stored waveform blobs.
    pub fn waveform(&self) -> RepoResult<(Vec<f32>, Vec<f32>)> {
        Ok(codec::decode(&self.time_blob, &self.signal_blob)?)
    }
}

/// Inserts a final pulse row with its full measurement metadata.
///
/// Composition edges are recorded separately by the lineage repository; this
/// only persists the row itself, including the composition discriminant.
pub fn insert_measurement(conn: &Connection, measurement: &Measurement) -> RepoResult<()> {
    measurement.validate()?;

    let trace = &measurement.pulse;
    let (time_blob, signal_blob) = codec::encode(&trace.time, &trace.signal)?;
    let annotations = measurement
        .annotations
        .as_ref()
        .map(|pairs| to_json(pairs, "pulse annotations"))
        .transpose()?;

    conn.execute(
        "INSERT INTO pulses (
            uuid,
            time,
            signal,
            timestamp,
            x,
            y,
            z,
            reference,
            variant,
            annotations,
            pass_number,
            noise,
            composition
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
        params![
            trace.uuid.to_string(),
            time_blob,
            signal_blob,
            trace.timestamp,
            measurement.point.x,
            measurement.point.y,
            measurement.point.z,
            measurement.reference.map(|id| id.to_string()),
            variant_to_db(measurement.variant),
            annotations,
            measurement.pass_number,
            trace.noise.map(|id| id.to_string()),
            trace.composition_kind().map(kind_to_db),
        ],
    )?;

    Ok(())
}

/// Inserts a bare source pulse row unless one with that uuid already exists.
///
/// Returns whether a row was inserted. An existing pulse is left untouched,
/// which is what makes source upserts idempotent when a source is shared by
/// several final pulses.
pub fn insert_source_if_absent(
    conn: &Connection,
    pulse: &Pulse,
    kind: Option<CompositionKind>,
) -> RepoResult<bool> {
    pulse.validate()?;

    if pulse_exists(conn, pulse.uuid)? {
        return Ok(false);
    }

    let (time_blob, signal_blob) = codec::encode(&pulse.time, &pulse.signal)?;
    conn.execute(
        "INSERT INTO pulses (uuid, time, signal, timestamp, noise, composition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            pulse.uuid.to_string(),
            time_blob,
            signal_blob,
            pulse.timestamp,
            pulse.noise.map(|id| id.to_string()),
            kind.map(kind_to_db),
        ],
    )?;

    Ok(true)
}

/// Reads one pulse row by uuid.
pub fn get_pulse_row(conn: &Connection, uuid: PulseId) -> RepoResult<Option<PulseRow>> {
    let mut stmt = conn.prepare(&format!("{PULSE_SELECT_SQL} WHERE uuid = ?1;"))?;
    let raw = stmt
        .query_row([uuid.to_string()], RawPulseRow::read)
        .optional()?;
    raw.map(parse_pulse_row).transpose()
}

pub fn pulse_exists(conn: &Connection, uuid: PulseId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pulses WHERE uuid = ?1);",
        [uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn variant_to_db(variant: TraceVariant) -> &'static str {
    match variant {
        TraceVariant::Reference => "reference",
        TraceVariant::Sample => "sample",
        TraceVariant::Noise => "noise",
        TraceVariant::Other => "other",
    }
}

fn parse_variant(value: &str) -> Option<TraceVariant> {
    match value {
        "reference" => Some(TraceVariant::Reference),
        "sample" => Some(TraceVariant::Sample),
        "noise" => Some(TraceVariant::Noise),
        "other" => Some(TraceVariant::Other),
        _ => None,
    }
}

fn kind_to_db(kind: CompositionKind) -> &'static str {
    match kind {
        CompositionKind::Stitch => "stitch",
        CompositionKind::Average => "average",
    }
}

fn parse_kind(value: &str) -> Option<CompositionKind> {
    match value {
        "stitch" => Some(CompositionKind::Stitch),
        "average" => Some(CompositionKind::Average),
        _ => None,
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

/// Raw column values captured inside the rusqlite row callback, converted to
/// domain types afterwards so conversion failures surface as [`RepoError`]
/// rather than driver errors.
pub(crate) struct RawPulseRow {
    uuid: String,
    time_blob: Vec<u8>,
    signal_blob: Vec<u8>,
    timestamp: i64,
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    reference: Option<String>,
    variant: Option<String>,
    annotations: Option<String>,
    pass_number: Option<i64>,
    noise: Option<String>,
    composition: Option<String>,
}

impl RawPulseRow {
    pub(crate) fn read(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            uuid: row.get("uuid")?,
            time_blob: row.get("time")?,
            signal_blob: row.get("signal")?,
            timestamp: row.get("timestamp")?,
            x: row.get("x")?,
            y: row.get("y")?,
            z: row.get("z")?,
            reference: row.get("reference")?,
            variant: row.get("variant")?,
            annotations: row.get("annotations")?,
            pass_number: row.get("pass_number")?,
            noise: row.get("noise")?,
            composition: row.get("composition")?,
        })
    }
}

pub(crate) fn parse_pulse_row(raw: RawPulseRow) -> RepoResult<PulseRow> {
    let uuid = parse_uuid(&raw.uuid, "pulses.uuid")?;
    let reference = raw
        .reference
        .as_deref()
        .map(|value| parse_uuid(value, "pulses.reference"))
        .transpose()?;
    let noise = raw
        .noise
        .as_deref()
        .map(|value| parse_uuid(value, "pulses.noise"))
        .transpose()?;

    let variant = raw
        .variant
        .as_deref()
        .map(|value| {
            parse_variant(value).ok_or_else(|| {
                RepoError::InvalidData(format!("invalid variant `{value}` in pulses.variant"))
            })
        })
        .transpose()?;

    let composition = raw
        .composition
        .as_deref()
        .map(|value| {
            parse_kind(value).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid composition kind `{value}` in pulses.composition"
                ))
            })
        })
        .transpose()?;

    let annotations = raw
        .annotations
        .as_deref()
        .map(|json| from_json::<Vec<KVPair>>(json, "pulse annotations"))
        .transpose()?;

    Ok(PulseRow {
        uuid,
        timestamp: raw.timestamp,
        time_blob: raw.time_blob,
        signal_blob: raw.signal_blob,
        x: raw.x,
        y: raw.y,
        z: raw.z,
        reference,
        variant,
        annotations,
        pass_number: raw.pass_number,
        noise,
        composition,
    })
}
