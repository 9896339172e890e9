//! Derivation lineage reconstruction.
//!
//! # Responsibility
//! - Rebuild the `derived_from` / `averaged_from` structure of a stored
//!   pulse from its composition edges, depth-first.
//!
//! # Invariants
//! - Stitch segments are returned in position order; that order is what
//!   makes a stitched concatenation reproducible.
//! - Averaging inputs are resolved recursively, so an averaged-of-stitched
//!   pulse carries the full two-level tree.
//! - Partial or ambiguous lineage is a hard failure; a missing source or a
//!   dangling discriminant is never silently skipped.
//! - A visited set bounds the recursion; a cycle in the edge graph fails
//!   with [`RepoError::CompositionCycle`] instead of recursing unboundedly.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::model::pulse::{CompositionKind, Measurement, Pulse, PulseComposition, Trace};
use crate::model::raster::Point3D;
use crate::repo::lineage_repo::{edges_for, CompositionEdge};
use crate::repo::pulse_repo::{get_pulse_row, PulseRow, RepoError, RepoResult};

/// Rebuilds the full [`Measurement`] for a final pulse row, lineage included.
pub fn resolve_measurement(conn: &Connection, row: &PulseRow) -> RepoResult<Measurement> {
    let variant = row.variant.ok_or_else(|| {
        RepoError::InvalidData(format!("final pulse {} has no variant", row.uuid))
    })?;

    Ok(Measurement {
        pulse: resolve_trace(conn, row)?,
        point: Point3D {
            x: row.x,
            y: row.y,
            z: row.z,
        },
        variant,
        reference: row.reference,
        annotations: row.annotations.clone(),
        pass_number: row.pass_number,
    })
}

/// Rebuilds a [`Trace`] from a stored row, resolving composition edges
/// depth-first.
pub fn resolve_trace(conn: &Connection, row: &PulseRow) -> RepoResult<Trace> {
    let mut visited = HashSet::new();
    resolve_with_visited(conn, row, &mut visited)
}

fn resolve_with_visited(
    conn: &Connection,
    row: &PulseRow,
    visited: &mut HashSet<uuid::Uuid>,
) -> RepoResult<Trace> {
    if !visited.insert(row.uuid) {
        return Err(RepoError::CompositionCycle { uuid: row.uuid });
    }

    let (time, signal) = row.waveform()?;
    let mut trace = Trace {
        uuid: row.uuid,
        timestamp: row.timestamp,
        time,
        signal,
        noise: row.noise,
        derived_from: None,
        averaged_from: None,
    };

    match row.composition {
        None => {
            // No discriminant means no edges may exist either; edges without
            // one would make reconstruction ambiguous.
            let edges = edges_for(conn, row.uuid)?;
            if !edges.is_empty() {
                return Err(RepoError::InvalidData(format!(
                    "pulse {} has {} composition edges but no composition kind",
                    row.uuid,
                    edges.len()
                )));
            }
        }
        Some(CompositionKind::Stitch) => {
            let edges = non_empty_edges(conn, row, "stitched")?;
            let mut segments = Vec::with_capacity(edges.len());
            for edge in &edges {
                let shift = edge.shift.ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "stitch edge {} -> {} at position {} has no shift",
                        edge.final_uuid, edge.source_uuid, edge.position
                    ))
                })?;
                let source = source_row(conn, edge)?;
                segments.push(PulseComposition {
                    pulse: source_pulse(&source)?,
                    position: edge.position,
                    shift,
                });
            }
            trace.derived_from = Some(segments);
        }
        Some(CompositionKind::Average) => {
            let edges = non_empty_edges(conn, row, "averaged")?;
            let mut sources = Vec::with_capacity(edges.len());
            for edge in &edges {
                let source = source_row(conn, edge)?;
                sources.push(resolve_with_visited(conn, &source, visited)?);
            }
            trace.averaged_from = Some(sources);
        }
    }

    visited.remove(&row.uuid);
    Ok(trace)
}

fn non_empty_edges(
    conn: &Connection,
    row: &PulseRow,
    kind: &str,
) -> RepoResult<Vec<CompositionEdge>> {
    let edges = edges_for(conn, row.uuid)?;
    if edges.is_empty() {
        return Err(RepoError::InvalidData(format!(
            "pulse {} is marked {kind} but has no composition edges",
            row.uuid
        )));
    }
    Ok(edges)
}

fn source_row(conn: &Connection, edge: &CompositionEdge) -> RepoResult<PulseRow> {
    get_pulse_row(conn, edge.source_uuid)?.ok_or_else(|| {
        RepoError::InvalidData(format!(
            "composition edge of {} references missing source pulse {}",
            edge.final_uuid, edge.source_uuid
        ))
    })
}

fn source_pulse(row: &PulseRow) -> RepoResult<Pulse> {
    let (time, signal) = row.waveform()?;
    Ok(Pulse {
        uuid: row.uuid,
        timestamp: row.timestamp,
        time,
        signal,
        noise: row.noise,
    })
}
