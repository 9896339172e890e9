use std::path::PathBuf;

use pulsegrid_core::devtools::{dummy_measurements, dummy_metadata, now_millis, plain_trace};
use pulsegrid_core::model::raster::{KVPair, KVValue, Point3D};
use pulsegrid_core::service::store_service::{
    add_pulses, create_store, load_metadata, load_pulses, update_annotations, StoreError,
};
use pulsegrid_core::{Measurement, TraceVariant};

fn store_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("raster.grf")
}

fn sample_at(timestamp: i64, index: usize) -> Measurement {
    let mut trace = plain_trace(3);
    trace.timestamp = timestamp;
    Measurement {
        pulse: trace,
        point: Point3D::new(index as f64, 0.0, 0.0),
        variant: TraceVariant::Sample,
        reference: None,
        annotations: None,
        pass_number: None,
    }
}

#[test]
fn create_and_load_metadata_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();
    let references = dummy_measurements(TraceVariant::Reference, 2, 3);

    create_store(&path, &config, &device, &meta, &references).unwrap();

    let loaded = load_metadata(&path).unwrap();
    assert_eq!(loaded.config, config);
    assert_eq!(loaded.device, device);
    assert_eq!(loaded.meta.app_version, meta.app_version);
    assert_eq!(loaded.meta.timestamp, meta.timestamp);
    assert_eq!(loaded.meta.annotations, meta.annotations);
    assert_eq!(loaded.meta.device_configuration, meta.device_configuration);
    assert_eq!(loaded.meta.user_coordinates, meta.user_coordinates);
    // The store assigns an id when the caller does not provide one.
    assert!(loaded.meta.raster_id.is_some());

    assert_eq!(loaded.n_reference_pulses, 2);
    assert_eq!(loaded.n_sample_pulses, 0);
}

#[test]
fn create_refuses_to_overwrite_existing_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();

    create_store(&path, &config, &device, &meta, &[]).unwrap();
    let err = create_store(&path, &config, &device, &meta, &[]).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(p) if p == path));
}

#[test]
fn operations_on_missing_store_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);

    assert!(matches!(
        load_metadata(&path).unwrap_err(),
        StoreError::Missing(_)
    ));
    assert!(matches!(
        add_pulses(&path, &[]).unwrap_err(),
        StoreError::Missing(_)
    ));
    assert!(matches!(
        load_pulses(&path, 0, 10, None).unwrap_err(),
        StoreError::Missing(_)
    ));
}

#[test]
fn append_and_paginate_deterministically() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();
    create_store(&path, &config, &device, &meta, &[]).unwrap();

    let base = now_millis();
    let samples: Vec<Measurement> = (0..5)
        .map(|index| sample_at(base + index as i64, index))
        .collect();
    add_pulses(&path, &samples).unwrap();

    let page_one = load_pulses(&path, 0, 2, Some(TraceVariant::Sample)).unwrap();
    let page_two = load_pulses(&path, 2, 2, Some(TraceVariant::Sample)).unwrap();
    let page_three = load_pulses(&path, 4, 2, Some(TraceVariant::Sample)).unwrap();

    assert_eq!(page_one.len(), 2);
    assert_eq!(page_two.len(), 2);
    assert_eq!(page_three.len(), 1);

    let loaded: Vec<_> = page_one
        .iter()
        .chain(&page_two)
        .chain(&page_three)
        .map(|measurement| measurement.pulse.uuid)
        .collect();
    let expected: Vec<_> = samples.iter().map(|sample| sample.pulse.uuid).collect();
    assert_eq!(loaded, expected);

    // Re-reading the same page yields the same rows.
    let page_one_again = load_pulses(&path, 0, 2, Some(TraceVariant::Sample)).unwrap();
    assert_eq!(page_one_again, page_one);
}

#[test]
fn variant_filter_limits_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();
    let references = dummy_measurements(TraceVariant::Reference, 2, 3);
    create_store(&path, &config, &device, &meta, &references).unwrap();
    add_pulses(&path, &dummy_measurements(TraceVariant::Sample, 3, 3)).unwrap();

    let refs = load_pulses(&path, 0, 10, Some(TraceVariant::Reference)).unwrap();
    let samples = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    let all = load_pulses(&path, 0, 10, None).unwrap();

    assert_eq!(refs.len(), 2);
    assert_eq!(samples.len(), 3);
    assert_eq!(all.len(), 5);
    assert!(refs
        .iter()
        .all(|measurement| measurement.variant == TraceVariant::Reference));
}

#[test]
fn full_measurement_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();
    create_store(&path, &config, &device, &meta, &[]).unwrap();

    let reference = dummy_measurements(TraceVariant::Reference, 1, 4).remove(0);
    let mut pulse = plain_trace(4);
    pulse.noise = Some(uuid::Uuid::new_v4());
    let sample = Measurement {
        pulse,
        point: Point3D {
            x: Some(1.5),
            y: None,
            z: Some(-2.0),
        },
        variant: TraceVariant::Sample,
        reference: Some(reference.pulse.uuid),
        annotations: Some(vec![
            KVPair {
                key: "operator".to_string(),
                value: KVValue::Text("jb".to_string()),
            },
            KVPair {
                key: "attempt".to_string(),
                value: KVValue::Int(2),
            },
        ]),
        pass_number: Some(1),
    };
    add_pulses(&path, &[reference.clone(), sample.clone()]).unwrap();

    let loaded = load_pulses(&path, 0, 10, Some(TraceVariant::Sample)).unwrap();
    assert_eq!(loaded, vec![sample]);
}

#[test]
fn update_annotations_replaces_session_annotations_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    let (config, device, meta) = dummy_metadata();
    let references = dummy_measurements(TraceVariant::Reference, 1, 3);
    create_store(&path, &config, &device, &meta, &references).unwrap();

    let new_annotations = vec![
        KVPair {
            key: "x".to_string(),
            value: KVValue::Int(1),
        },
        KVPair {
            key: "y".to_string(),
            value: KVValue::Int(2),
        },
    ];
    update_annotations(&path, &new_annotations).unwrap();

    let reloaded = load_metadata(&path).unwrap();
    assert_eq!(reloaded.meta.annotations, new_annotations);
    // Everything else stays intact.
    assert_eq!(reloaded.config, config);
    assert_eq!(reloaded.n_reference_pulses, 1);
}

#[test]
fn update_annotations_without_metadata_row_fails() {
    let conn = pulsegrid_core::db::open_store_in_memory().unwrap();
    let changed = pulsegrid_core::repo::raster_repo::update_annotations(&conn, &[]).unwrap();
    assert!(!changed);
}
