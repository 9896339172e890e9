//! Pulse store façade.
//!
//! # Responsibility
//! - Orchestrate codec, lineage store and reconstruction against one store
//!   file per operation.
//! - Own the mapping between final-pulse insert requests and the rows each
//!   request produces (the final row, its source rows, its edges).
//!
//! # Invariants
//! - Every operation opens a fresh connection and runs the migration check
//!   before touching domain tables.
//! - One operation is one transaction: a failure partway through an
//!   `add_pulses` batch rolls the whole batch back, so composition edges
//!   and their referenced rows always appear together.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use log::info;
use rusqlite::{Connection, TransactionBehavior};

use crate::compose;
use crate::db::{self, DbError};
use crate::model::pulse::{Measurement, Pulse, Trace, TraceVariant};
use crate::model::raster::{DeviceMetadata, KVPair, RasterConfig, RasterMetadata};
use crate::repo::lineage_repo::{self, FinalPulseFilter, SourceEdge};
use crate::repo::pulse_repo::{self, RepoError, RepoResult};
use crate::repo::raster_repo;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// `create_store` refuses to overwrite an existing file.
    AlreadyExists(PathBuf),
    /// Every other operation requires an existing store file.
    Missing(PathBuf),
    Repo(RepoError),
    Db(DbError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists(path) => {
                write!(f, "store file `{}` already exists", path.display())
            }
            Self::Missing(path) => write!(f, "store file `{}` does not exist", path.display()),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::from(value))
    }
}

/// Everything `load_metadata` returns about one store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMetadata {
    pub config: RasterConfig,
    pub device: DeviceMetadata,
    pub meta: RasterMetadata,
    pub n_reference_pulses: u64,
    pub n_sample_pulses: u64,
}

/// Creates a new store file with metadata and an initial pulse batch.
///
/// The migration chain runs first so the file carries the current schema
/// version; the metadata row and initial pulses are committed together.
pub fn create_store(
    path: impl AsRef<Path>,
    config: &RasterConfig,
    device: &DeviceMetadata,
    meta: &RasterMetadata,
    initial_pulses: &[Measurement],
) -> StoreResult<()> {
    let path = path.as_ref();
    if path.exists() {
        return Err(StoreError::AlreadyExists(path.to_path_buf()));
    }

    let mut conn = db::open_store(path)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    raster_repo::insert_raster_info(&tx, config, device, meta)?;
    for measurement in initial_pulses {
        insert_measurement(&tx, measurement)?;
    }
    tx.commit()?;

    info!(
        "event=store_create module=service status=ok n_pulses={}",
        initial_pulses.len()
    );
    Ok(())
}

/// Appends a batch of final pulses to an existing store.
///
/// All rows produced by the batch (final rows, source rows, composition
/// edges) become visible atomically or not at all.
pub fn add_pulses(path: impl AsRef<Path>, measurements: &[Measurement]) -> StoreResult<()> {
    let mut conn = open_existing(path.as_ref())?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for measurement in measurements {
        insert_measurement(&tx, measurement)?;
    }
    tx.commit()?;

    info!(
        "event=pulses_add module=service status=ok n_pulses={}",
        measurements.len()
    );
    Ok(())
}

/// Loads one page of final pulses with reconstructed lineage.
///
/// Source pulses never appear in the result; ordering is by insertion
/// timestamp then uuid, so the same offset always yields the same page.
pub fn load_pulses(
    path: impl AsRef<Path>,
    offset: u32,
    limit: u32,
    variant: Option<TraceVariant>,
) -> StoreResult<Vec<Measurement>> {
    let conn = open_existing(path.as_ref())?;
    let filter = FinalPulseFilter {
        variant,
        pass_number: None,
    };

    let rows = lineage_repo::load_final_rows(&conn, &filter, offset, limit)?;
    let mut measurements = Vec::with_capacity(rows.len());
    for row in &rows {
        measurements.push(compose::resolve_measurement(&conn, row)?);
    }

    info!(
        "event=pulses_load module=service status=ok offset={offset} limit={limit} n_pulses={}",
        measurements.len()
    );
    Ok(measurements)
}

/// Reads the session metadata row and final-pulse counts.
///
/// Counts exclude source pulses at every nesting depth, since they are
/// components of other pulses rather than measurements in their own right.
pub fn load_metadata(path: impl AsRef<Path>) -> StoreResult<StoreMetadata> {
    let path = path.as_ref();
    let conn = open_existing(path)?;

    let (config, device, meta) =
        raster_repo::load_raster_info(&conn)?.ok_or_else(|| RepoError::MetadataMissing {
            path: path.to_path_buf(),
        })?;

    let n_reference_pulses = lineage_repo::count_final_pulses(&conn, TraceVariant::Reference)?;
    let n_sample_pulses = lineage_repo::count_final_pulses(&conn, TraceVariant::Sample)?;

    Ok(StoreMetadata {
        config,
        device,
        meta,
        n_reference_pulses,
        n_sample_pulses,
    })
}

/// Replaces the session annotation list. Pulses are untouched.
pub fn update_annotations(path: impl AsRef<Path>, annotations: &[KVPair]) -> StoreResult<()> {
    let path = path.as_ref();
    let conn = open_existing(path)?;

    if !raster_repo::update_annotations(&conn, annotations)? {
        return Err(StoreError::Repo(RepoError::MetadataMissing {
            path: path.to_path_buf(),
        }));
    }

    info!("event=annotations_update module=service status=ok");
    Ok(())
}

fn open_existing(path: &Path) -> StoreResult<Connection> {
    if !path.exists() {
        return Err(StoreError::Missing(path.to_path_buf()));
    }
    Ok(db::open_store(path)?)
}

/// Inserts one final pulse: its row, then whatever lineage rows the request
/// implies.
fn insert_measurement(conn: &Connection, measurement: &Measurement) -> RepoResult<()> {
    measurement.validate()?;
    pulse_repo::insert_measurement(conn, measurement)?;
    record_trace_lineage(conn, &measurement.pulse)
}

/// Records the composition edges of a (possibly nested) trace.
///
/// Stitch segments are plain source pulses; averaging inputs may themselves
/// be composites, so each is inserted with its own discriminant and edges
/// before the final-level edge referencing it.
fn record_trace_lineage(conn: &Connection, trace: &Trace) -> RepoResult<()> {
    if let Some(segments) = &trace.derived_from {
        let edges: Vec<SourceEdge<'_>> = segments
            .iter()
            .map(|segment| SourceEdge {
                pulse: &segment.pulse,
                position: segment.position,
                shift: Some(segment.shift),
            })
            .collect();
        return lineage_repo::record_composition(conn, trace.uuid, &edges);
    }

    if let Some(sources) = &trace.averaged_from {
        for source in sources {
            insert_composite_source(conn, source)?;
        }

        let pulses: Vec<Pulse> = sources.iter().map(Trace::as_pulse).collect();
        let edges: Vec<SourceEdge<'_>> = pulses
            .iter()
            .enumerate()
            .map(|(index, pulse)| SourceEdge {
                pulse,
                position: index as u32,
                shift: None,
            })
            .collect();
        return lineage_repo::record_composition(conn, trace.uuid, &edges);
    }

    Ok(())
}

/// Inserts an averaging input as a source row, carrying its own composition
/// discriminant and edges when it is itself a composite.
///
/// A source that already exists (reused across final pulses) is left
/// untouched, edges included.
fn insert_composite_source(conn: &Connection, trace: &Trace) -> RepoResult<()> {
    let inserted =
        pulse_repo::insert_source_if_absent(conn, &trace.as_pulse(), trace.composition_kind())?;
    if inserted {
        record_trace_lineage(conn, trace)?;
    }
    Ok(())
}
