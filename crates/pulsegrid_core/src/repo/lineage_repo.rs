//! Composition edge persistence and the final/source distinction.
//!
//! # Responsibility
//! - Record edges linking a derived pulse to its ordered source pulses.
//! - Answer the membership queries that make a pulse "final": a pulse is
//!   final iff its uuid never appears as a `source_uuid`.
//!
//! # Invariants
//! - Edges are append-only; nothing here updates or deletes them.
//! - (final_uuid, position) and (final_uuid, source_uuid) are unique;
//!   violations surface as structured [`RepoError::DuplicateEdge`] failures
//!   checked before the insert, not as storage constraint errors.
//! - Finality is never materialized as a stored flag; it is derived from
//!   edge membership at query time.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::model::pulse::{Pulse, PulseId, TraceVariant};
use crate::repo::pulse_repo::{
    insert_source_if_absent, parse_pulse_row, parse_uuid, variant_to_db, PulseRow, RawPulseRow,
    RepoError, RepoResult,
};

/// One source pulse to attach to a final pulse at an explicit position.
///
/// `shift` is set for stitch edges and absent for average edges, where it
/// has no meaning.
#[derive(Debug)]
pub struct SourceEdge<'a> {
    pub pulse: &'a Pulse,
    pub position: u32,
    pub shift: Option<f32>,
}

/// Stored composition edge.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionEdge {
    pub final_uuid: PulseId,
    pub source_uuid: PulseId,
    pub position: u32,
    pub shift: Option<f32>,
}

/// Filter for the final-pulse queries used by every load path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalPulseFilter {
    pub variant: Option<TraceVariant>,
    pub pass_number: Option<i64>,
}

/// Records the composition edges of one final pulse.
///
/// Each source pulse is upserted as a bare pulse row if no pulse with that
/// uuid exists yet; a source already present (for example reused by another
/// final pulse) is left untouched. The uniqueness pre-check sees rows written
/// earlier in the same transaction, so duplicates within one batch are
/// caught as well.
pub fn record_composition(
    conn: &Connection,
    final_uuid: PulseId,
    edges: &[SourceEdge<'_>],
) -> RepoResult<()> {
    for edge in edges {
        insert_source_if_absent(conn, edge.pulse, None)?;

        if edge_exists(conn, final_uuid, edge.pulse.uuid, edge.position)? {
            return Err(RepoError::DuplicateEdge {
                final_uuid,
                source_uuid: edge.pulse.uuid,
                position: edge.position,
            });
        }

        conn.execute(
            "INSERT INTO pulse_composition (final_uuid, source_uuid, position, shift)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                final_uuid.to_string(),
                edge.pulse.uuid.to_string(),
                edge.position,
                edge.shift.map(f64::from),
            ],
        )?;
    }

    Ok(())
}

/// Returns the composition edges of one final pulse, position ascending.
/// Empty for a pulse that is not a composite.
pub fn edges_for(conn: &Connection, final_uuid: PulseId) -> RepoResult<Vec<CompositionEdge>> {
    let mut stmt = conn.prepare(
        "SELECT final_uuid, source_uuid, position, shift
         FROM pulse_composition
         WHERE final_uuid = ?1
         ORDER BY position ASC;",
    )?;

    let mut rows = stmt.query([final_uuid.to_string()])?;
    let mut edges = Vec::new();
    while let Some(row) = rows.next()? {
        let final_text: String = row.get("final_uuid")?;
        let source_text: String = row.get("source_uuid")?;
        let position: i64 = row.get("position")?;
        let shift: Option<f64> = row.get("shift")?;

        let position = u32::try_from(position).map_err(|_| {
            RepoError::InvalidData(format!(
                "negative position {position} in pulse_composition for final {final_text}"
            ))
        })?;

        edges.push(CompositionEdge {
            final_uuid: parse_uuid(&final_text, "pulse_composition.final_uuid")?,
            source_uuid: parse_uuid(&source_text, "pulse_composition.source_uuid")?,
            position,
            shift: shift.map(|value| value as f32),
        });
    }

    Ok(edges)
}

/// Whether the pulse is used as a source of any other pulse.
pub fn is_source(conn: &Connection, uuid: PulseId) -> RepoResult<bool> {
    let used: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pulse_composition WHERE source_uuid = ?1);",
        [uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(used == 1)
}

/// All final pulse uuids matching the filter, ordered by (timestamp, uuid).
///
/// The exclusion is membership-based, so a source pulse never appears here
/// regardless of how deep it sits in a derivation tree.
pub fn final_uuids(conn: &Connection, filter: &FinalPulseFilter) -> RepoResult<Vec<PulseId>> {
    let (sql, bind_values) = final_pulse_query("uuid", filter, None);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;

    let mut uuids = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        uuids.push(parse_uuid(&text, "pulses.uuid")?);
    }
    Ok(uuids)
}

/// Loads a page of final pulse rows, ordered by (timestamp, uuid) so that
/// offset/limit paging is deterministic across calls.
pub fn load_final_rows(
    conn: &Connection,
    filter: &FinalPulseFilter,
    offset: u32,
    limit: u32,
) -> RepoResult<Vec<PulseRow>> {
    let (sql, bind_values) = final_pulse_query("*", filter, Some((offset, limit)));
    let mut stmt = conn.prepare(&sql)?;
    let raw_rows = stmt
        .query_map(params_from_iter(bind_values), RawPulseRow::read)?
        .collect::<Result<Vec<_>, _>>()?;

    raw_rows.into_iter().map(parse_pulse_row).collect()
}

/// Counts final pulses of one variant, excluding sources at every depth.
pub fn count_final_pulses(conn: &Connection, variant: TraceVariant) -> RepoResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM pulses
         WHERE variant = ?1
           AND uuid NOT IN (SELECT source_uuid FROM pulse_composition);",
        [variant_to_db(variant)],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn final_pulse_query(
    columns: &str,
    filter: &FinalPulseFilter,
    page: Option<(u32, u32)>,
) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT {columns}
         FROM pulses
         WHERE uuid NOT IN (SELECT source_uuid FROM pulse_composition)"
    );
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(variant) = filter.variant {
        sql.push_str(" AND variant = ?");
        bind_values.push(Value::Text(variant_to_db(variant).to_string()));
    }
    if let Some(pass_number) = filter.pass_number {
        sql.push_str(" AND pass_number = ?");
        bind_values.push(Value::Integer(pass_number));
    }

    sql.push_str(" ORDER BY timestamp ASC, uuid ASC");

    if let Some((offset, limit)) = page {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
        if offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(offset)));
        }
    }

    sql.push(';');
    (sql, bind_values)
}

fn edge_exists(
    conn: &Connection,
    final_uuid: PulseId,
    source_uuid: PulseId,
    position: u32,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM pulse_composition
            WHERE final_uuid = ?1
              AND (position = ?2 OR source_uuid = ?3)
        );",
        params![final_uuid.to_string(), position, source_uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
