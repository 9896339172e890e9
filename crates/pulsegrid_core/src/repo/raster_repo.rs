//! Single-row raster session metadata persistence.
//!
//! # Responsibility
//! - Write and read the `raster_info` row, JSON-encoding the nested
//!   configuration documents.
//! - Replace annotation fields in place; the row has no history.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::raster::{
    CoordinateTransform, DeviceMetadata, KVPair, Point3D, RasterConfig, RasterMetadata,
    RasterPattern, RepetitionsConfig,
};
use crate::repo::pulse_repo::{parse_uuid, RepoResult};
use crate::repo::{from_json, to_json};

/// Writes the single `raster_info` row for a freshly created store.
pub fn insert_raster_info(
    conn: &Connection,
    config: &RasterConfig,
    device: &DeviceMetadata,
    meta: &RasterMetadata,
) -> RepoResult<()> {
    config.validate()?;
    meta.validate()?;

    let id = meta.raster_id.unwrap_or_else(Uuid::new_v4);
    conn.execute(
        "INSERT INTO raster_info (
            id,
            device_serial_number,
            device_firmware_version,
            app_version,
            timestamp,
            annotations,
            device_configuration,
            patterns,
            stepsize,
            reference_point,
            acquire_ref_every,
            repetitions_config,
            user_coordinates
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
        params![
            id.to_string(),
            device.device_serial_number,
            device.device_firmware_version,
            meta.app_version,
            meta.timestamp,
            to_json(&meta.annotations, "raster annotations")?,
            to_json(&meta.device_configuration, "device configuration")?,
            to_json(&config.patterns, "raster patterns")?,
            config.stepsize,
            config
                .reference_point
                .as_ref()
                .map(|point| to_json(point, "reference point"))
                .transpose()?,
            config.acquire_ref_every,
            config
                .repetitions_config
                .as_ref()
                .map(|repetitions| to_json(repetitions, "repetitions config"))
                .transpose()?,
            meta.user_coordinates
                .as_ref()
                .map(|transform| to_json(transform, "user coordinates"))
                .transpose()?,
        ],
    )?;

    Ok(())
}

/// Reads the `raster_info` row back into domain structs.
///
/// Returns `None` when the row has not been written, so the façade can
/// attach the store path to the resulting error.
pub fn load_raster_info(
    conn: &Connection,
) -> RepoResult<Option<(RasterConfig, DeviceMetadata, RasterMetadata)>> {
    let mut stmt = conn.prepare(
        "SELECT
            id,
            device_serial_number,
            device_firmware_version,
            app_version,
            timestamp,
            annotations,
            device_configuration,
            patterns,
            stepsize,
            reference_point,
            acquire_ref_every,
            repetitions_config,
            user_coordinates
         FROM raster_info
         LIMIT 1;",
    )?;

    let raw = stmt.query_row([], RawRasterRow::read).optional()?;
    raw.map(parse_raster_row).transpose()
}

/// Replaces the session annotation list; pulses are untouched.
pub fn update_annotations(conn: &Connection, annotations: &[KVPair]) -> RepoResult<bool> {
    let changed = conn.execute(
        "UPDATE raster_info SET annotations = ?1;",
        [to_json(&annotations, "raster annotations")?],
    )?;
    Ok(changed > 0)
}

struct RawRasterRow {
    id: String,
    device_serial_number: String,
    device_firmware_version: String,
    app_version: String,
    timestamp: i64,
    annotations: String,
    device_configuration: String,
    patterns: String,
    stepsize: f64,
    reference_point: Option<String>,
    acquire_ref_every: Option<i64>,
    repetitions_config: Option<String>,
    user_coordinates: Option<String>,
}

impl RawRasterRow {
    fn read(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            device_serial_number: row.get("device_serial_number")?,
            device_firmware_version: row.get("device_firmware_version")?,
            app_version: row.get("app_version")?,
            timestamp: row.get("timestamp")?,
            annotations: row.get("annotations")?,
            device_configuration: row.get("device_configuration")?,
            patterns: row.get("patterns")?,
            stepsize: row.get("stepsize")?,
            reference_point: row.get("reference_point")?,
            acquire_ref_every: row.get("acquire_ref_every")?,
            repetitions_config: row.get("repetitions_config")?,
            user_coordinates: row.get("user_coordinates")?,
        })
    }
}

fn parse_raster_row(
    raw: RawRasterRow,
) -> RepoResult<(RasterConfig, DeviceMetadata, RasterMetadata)> {
    let config = RasterConfig {
        patterns: from_json::<Vec<RasterPattern>>(&raw.patterns, "raster patterns")?,
        stepsize: raw.stepsize,
        reference_point: raw
            .reference_point
            .as_deref()
            .map(|json| from_json::<Point3D>(json, "reference point"))
            .transpose()?,
        acquire_ref_every: raw.acquire_ref_every,
        repetitions_config: raw
            .repetitions_config
            .as_deref()
            .map(|json| from_json::<RepetitionsConfig>(json, "repetitions config"))
            .transpose()?,
    };

    let device = DeviceMetadata {
        device_serial_number: raw.device_serial_number,
        device_firmware_version: raw.device_firmware_version,
    };

    let meta = RasterMetadata {
        app_version: raw.app_version,
        raster_id: Some(parse_uuid(&raw.id, "raster_info.id")?),
        timestamp: raw.timestamp,
        annotations: from_json::<Vec<KVPair>>(&raw.annotations, "raster annotations")?,
        device_configuration: from_json(&raw.device_configuration, "device configuration")?,
        user_coordinates: raw
            .user_coordinates
            .as_deref()
            .map(|json| from_json::<CoordinateTransform>(json, "user coordinates"))
            .transpose()?,
    };

    Ok((config, device, meta))
}
