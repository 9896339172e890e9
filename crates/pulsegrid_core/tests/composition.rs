use std::path::PathBuf;

use pulsegrid_core::db::open_store_in_memory;
use pulsegrid_core::devtools::{
    averaged_trace, dummy_metadata, dummy_pulse, plain_trace, stitched_trace,
};
use pulsegrid_core::model::pulse::{CompositionKind, PulseComposition};
use pulsegrid_core::model::raster::Point3D;
use pulsegrid_core::repo::lineage_repo::{
    edges_for, final_uuids, is_source, record_composition, FinalPulseFilter, SourceEdge,
};
use pulsegrid_core::repo::pulse_repo::{get_pulse_row, insert_source_if_absent};
use pulsegrid_core::service::store_service::{
    add_pulses, create_store, load_metadata, load_pulses, StoreError,
};
use pulsegrid_core::{compose, Measurement, RepoError, TraceVariant};

fn store_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("raster.grf")
}

fn new_store(dir: &tempfile::TempDir) -> PathBuf {
    let path = store_path(dir);
    let (config, device, meta) = dummy_metadata();
    create_store(&path, &config, &device, &meta, &[]).unwrap();
    path
}

fn sample(pulse: pulsegrid_core::Trace) -> Measurement {
    Measurement {
        pulse,
        point: Point3D::new(0.0, 0.0, 0.0),
        variant: TraceVariant::Sample,
        reference: None,
        annotations: None,
        pass_number: None,
    }
}

#[test]
fn reference_and_stitched_sample_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();

    let mut reference = plain_trace(2);
    reference.time = vec![0.0, 1.0];
    reference.signal = vec![0.1, 0.2];
    let reference = Measurement {
        pulse: reference,
        point: Point3D::new(5.0, 5.0, 0.0),
        variant: TraceVariant::Reference,
        reference: None,
        annotations: None,
        pass_number: None,
    };
    create_store(&path, &config, &device, &meta, &[reference]).unwrap();

    let before = load_metadata(&path).unwrap();
    assert_eq!(before.n_reference_pulses, 1);
    assert_eq!(before.n_sample_pulses, 0);

    let source_b = dummy_pulse(2);
    let source_c = dummy_pulse(2);
    let mut stitched = plain_trace(4);
    stitched.derived_from = Some(vec![
        PulseComposition {
            pulse: source_b.clone(),
            position: 0,
            shift: 0.0,
        },
        PulseComposition {
            pulse: source_c.clone(),
            position: 1,
            shift: 0.5,
        },
    ]);
    add_pulses(&path, &[sample(stitched)]).unwrap();

    let after = load_metadata(&path).unwrap();
    assert_eq!(after.n_reference_pulses, 1);
    assert_eq!(after.n_sample_pulses, 1);

    let samples = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    assert_eq!(samples.len(), 1);
    let derived = samples[0].pulse.derived_from.as_ref().unwrap();
    assert_eq!(derived.len(), 2);
    assert_eq!(derived[0].pulse.uuid, source_b.uuid);
    assert_eq!(derived[0].shift, 0.0);
    assert_eq!(derived[1].pulse.uuid, source_c.uuid);
    assert_eq!(derived[1].shift, 0.5);

    // The sources never surface as final pulses, filtered or not.
    for measurement in load_pulses(&path, 0, 100, None).unwrap() {
        assert_ne!(measurement.pulse.uuid, source_b.uuid);
        assert_ne!(measurement.pulse.uuid, source_c.uuid);
    }
}

#[test]
fn out_of_order_positions_load_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let mut stitched = plain_trace(6);
    stitched.derived_from = Some(vec![
        PulseComposition {
            pulse: dummy_pulse(2),
            position: 2,
            shift: 2.0,
        },
        PulseComposition {
            pulse: dummy_pulse(2),
            position: 0,
            shift: 0.0,
        },
        PulseComposition {
            pulse: dummy_pulse(2),
            position: 1,
            shift: 1.0,
        },
    ]);
    add_pulses(&path, &[sample(stitched)]).unwrap();

    let loaded = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    let derived = loaded[0].pulse.derived_from.as_ref().unwrap();
    let positions: Vec<u32> = derived.iter().map(|segment| segment.position).collect();
    let shifts: Vec<f32> = derived.iter().map(|segment| segment.shift).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(shifts, vec![0.0, 1.0, 2.0]);
}

#[test]
fn duplicate_position_fails_and_rolls_back_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let mut stitched = plain_trace(4);
    stitched.derived_from = Some(vec![
        PulseComposition {
            pulse: dummy_pulse(2),
            position: 0,
            shift: 0.0,
        },
        PulseComposition {
            pulse: dummy_pulse(2),
            position: 0,
            shift: 0.5,
        },
    ]);

    let err = add_pulses(&path, &[sample(stitched)]).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Repo(RepoError::DuplicateEdge { position: 0, .. })
    ));

    // The whole batch rolled back; nothing became visible.
    assert!(load_pulses(&path, 0, 100, None).unwrap().is_empty());
    let metadata = load_metadata(&path).unwrap();
    assert_eq!(metadata.n_sample_pulses, 0);
}

#[test]
fn duplicate_source_in_one_composition_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let shared = dummy_pulse(2);
    let mut stitched = plain_trace(4);
    stitched.derived_from = Some(vec![
        PulseComposition {
            pulse: shared.clone(),
            position: 0,
            shift: 0.0,
        },
        PulseComposition {
            pulse: shared,
            position: 1,
            shift: 0.5,
        },
    ]);

    let err = add_pulses(&path, &[sample(stitched)]).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Repo(RepoError::DuplicateEdge { .. })
    ));
}

#[test]
fn averaged_of_stitched_round_trips_with_nested_lineage() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let measurement = sample(averaged_trace(2, 2, 3));
    add_pulses(&path, &[measurement.clone()]).unwrap();

    let loaded = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    assert_eq!(loaded, vec![measurement.clone()]);

    let averaged = loaded[0].pulse.averaged_from.as_ref().unwrap();
    assert_eq!(averaged.len(), 2);
    for source in averaged {
        let derived = source.derived_from.as_ref().unwrap();
        assert_eq!(derived.len(), 2);
    }
}

#[test]
fn sources_are_excluded_at_every_nesting_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let measurement = sample(averaged_trace(2, 2, 3));
    let final_uuid = measurement.pulse.uuid;
    let mut source_ids = Vec::new();
    for source in measurement.pulse.averaged_from.as_ref().unwrap() {
        source_ids.push(source.uuid);
        for segment in source.derived_from.as_ref().unwrap() {
            source_ids.push(segment.pulse.uuid);
        }
    }
    assert_eq!(source_ids.len(), 6);

    add_pulses(&path, &[measurement]).unwrap();

    let finals = load_pulses(&path, 0, 100, None).unwrap();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].pulse.uuid, final_uuid);
    for source_id in &source_ids {
        assert!(finals
            .iter()
            .all(|measurement| measurement.pulse.uuid != *source_id));
    }

    // Counts exclude sources too: only the top-level sample is counted.
    let metadata = load_metadata(&path).unwrap();
    assert_eq!(metadata.n_sample_pulses, 1);
    assert_eq!(metadata.n_reference_pulses, 0);
}

#[test]
fn shared_source_is_stored_once_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let shared = dummy_pulse(2);
    let other_a = dummy_pulse(2);
    let other_b = dummy_pulse(2);

    let mut first = plain_trace(4);
    first.derived_from = Some(vec![
        PulseComposition {
            pulse: shared.clone(),
            position: 0,
            shift: 0.0,
        },
        PulseComposition {
            pulse: other_a,
            position: 1,
            shift: 0.5,
        },
    ]);
    let mut second = plain_trace(4);
    second.derived_from = Some(vec![
        PulseComposition {
            pulse: shared.clone(),
            position: 0,
            shift: 0.0,
        },
        PulseComposition {
            pulse: other_b,
            position: 1,
            shift: 0.25,
        },
    ]);
    add_pulses(&path, &[sample(first), sample(second)]).unwrap();

    let loaded = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    assert_eq!(loaded.len(), 2);
    for measurement in &loaded {
        let derived = measurement.pulse.derived_from.as_ref().unwrap();
        assert_eq!(derived[0].pulse.uuid, shared.uuid);
    }

    let conn = rusqlite::Connection::open(&path).unwrap();
    let shared_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pulses WHERE uuid = ?1;",
            [shared.uuid.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(shared_rows, 1);
}

#[test]
fn lineage_queries_answer_membership_directly() {
    let conn = open_store_in_memory().unwrap();

    let final_pulse = dummy_pulse(4);
    let source_a = dummy_pulse(2);
    let source_b = dummy_pulse(2);
    insert_source_if_absent(&conn, &final_pulse, Some(CompositionKind::Stitch)).unwrap();
    record_composition(
        &conn,
        final_pulse.uuid,
        &[
            SourceEdge {
                pulse: &source_b,
                position: 1,
                shift: Some(0.5),
            },
            SourceEdge {
                pulse: &source_a,
                position: 0,
                shift: Some(0.0),
            },
        ],
    )
    .unwrap();

    assert!(is_source(&conn, source_a.uuid).unwrap());
    assert!(is_source(&conn, source_b.uuid).unwrap());
    assert!(!is_source(&conn, final_pulse.uuid).unwrap());

    let edges = edges_for(&conn, final_pulse.uuid).unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].position, 0);
    assert_eq!(edges[0].source_uuid, source_a.uuid);
    assert_eq!(edges[1].position, 1);
    assert_eq!(edges[1].source_uuid, source_b.uuid);

    let finals = final_uuids(&conn, &FinalPulseFilter::default()).unwrap();
    assert_eq!(finals, vec![final_pulse.uuid]);

    // Non-composite pulses report no edges.
    assert!(edges_for(&conn, source_a.uuid).unwrap().is_empty());
}

#[test]
fn composition_cycle_is_detected_instead_of_recursing() {
    let conn = open_store_in_memory().unwrap();

    let pulse_a = dummy_pulse(2);
    let pulse_b = dummy_pulse(2);
    insert_source_if_absent(&conn, &pulse_a, Some(CompositionKind::Average)).unwrap();
    insert_source_if_absent(&conn, &pulse_b, Some(CompositionKind::Average)).unwrap();
    record_composition(
        &conn,
        pulse_a.uuid,
        &[SourceEdge {
            pulse: &pulse_b,
            position: 0,
            shift: None,
        }],
    )
    .unwrap();
    record_composition(
        &conn,
        pulse_b.uuid,
        &[SourceEdge {
            pulse: &pulse_a,
            position: 0,
            shift: None,
        }],
    )
    .unwrap();

    let row = get_pulse_row(&conn, pulse_a.uuid).unwrap().unwrap();
    let err = compose::resolve_trace(&conn, &row).unwrap_err();
    assert!(matches!(err, RepoError::CompositionCycle { .. }));
}

#[test]
fn edges_without_discriminant_are_corrupt_lineage() {
    let conn = open_store_in_memory().unwrap();

    let final_pulse = dummy_pulse(4);
    let source = dummy_pulse(2);
    // Discriminant deliberately missing.
    insert_source_if_absent(&conn, &final_pulse, None).unwrap();
    record_composition(
        &conn,
        final_pulse.uuid,
        &[SourceEdge {
            pulse: &source,
            position: 0,
            shift: Some(0.0),
        }],
    )
    .unwrap();

    let row = get_pulse_row(&conn, final_pulse.uuid).unwrap().unwrap();
    let err = compose::resolve_trace(&conn, &row).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn measurement_variants_fixture_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    pulsegrid_core::devtools::make_dummy_store(&path).unwrap();

    let finals = load_pulses(&path, 0, 100, None).unwrap();
    // Every fixture measurement is final; none of their sources leak out.
    assert_eq!(finals.len(), 12);
    assert!(finals
        .iter()
        .any(|measurement| measurement.pulse.derived_from.is_some()));
    assert!(finals
        .iter()
        .any(|measurement| measurement.pulse.averaged_from.is_some()));

    let metadata = load_metadata(&path).unwrap();
    assert_eq!(metadata.n_reference_pulses, 1);
}

#[test]
fn stitched_fixture_keeps_segment_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_store(&dir);

    let trace = stitched_trace(3, 2);
    let expected: Vec<_> = trace
        .derived_from
        .as_ref()
        .unwrap()
        .iter()
        .map(|segment| segment.pulse.uuid)
        .collect();
    add_pulses(&path, &[sample(trace)]).unwrap();

    let loaded = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    let order: Vec<_> = loaded[0]
        .pulse
        .derived_from
        .as_ref()
        .unwrap()
        .iter()
        .map(|segment| segment.pulse.uuid)
        .collect();
    assert_eq!(order, expected);
}
