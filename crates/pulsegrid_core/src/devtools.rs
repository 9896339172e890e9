//! Deterministic dummy-data builders.
//!
//! # Responsibility
//! - Build representative metadata and measurement fixtures for tests and
//!   for downstream packages that need a populated store.
//!
//! # Invariants
//! - No randomness: waveform values and identities derive from indices and
//!   fresh uuids only, so fixture shapes are reproducible.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::model::pulse::{Measurement, Pulse, PulseComposition, Trace, TraceVariant};
use crate::model::raster::{
    Axis, AxisMap, AxesMapping, CoordinateTransform, DeviceMetadata, KVPair, KVValue, Offset3D,
    Point3D, RasterConfig, RasterMetadata, RasterPattern, RepetitionsConfig,
};
use crate::service::store_service::{add_pulses, create_store, StoreResult};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Representative raster configuration, device and session metadata.
pub fn dummy_metadata() -> (RasterConfig, DeviceMetadata, RasterMetadata) {
    let config = RasterConfig {
        patterns: vec![RasterPattern {
            start_point: Point3D::new(0.0, 0.0, 0.0),
            end_point: Point3D::new(1.0, 1.0, 1.0),
        }],
        stepsize: 0.5,
        reference_point: Some(Point3D::new(0.0, 0.0, 0.0)),
        acquire_ref_every: Some(2),
        repetitions_config: Some(RepetitionsConfig {
            passes: 3,
            interval_millisecs: 30_000.0,
        }),
    };
    let device = DeviceMetadata {
        device_serial_number: "123-ABC".to_string(),
        device_firmware_version: "v1.0.0".to_string(),
    };
    let meta = RasterMetadata {
        app_version: "app1".to_string(),
        raster_id: None,
        timestamp: 161_803_398,
        annotations: vec![
            KVPair {
                key: "foo".to_string(),
                value: KVValue::Text("bar".to_string()),
            },
            KVPair {
                key: "baz".to_string(),
                value: KVValue::Float(1.0),
            },
        ],
        device_configuration: serde_json::json!({ "mode": "test" }),
        user_coordinates: Some(dummy_coordinate_transform()),
    };
    (config, device, meta)
}

pub fn dummy_coordinate_transform() -> CoordinateTransform {
    CoordinateTransform {
        id: Uuid::new_v4(),
        name: "Test Coordinate System".to_string(),
        offset: Offset3D {
            x: 10.0,
            y: 20.0,
            z: 30.0,
        },
        mapping: AxesMapping {
            x: AxisMap {
                axis: Axis::Z,
                sign: 1,
            },
            y: AxisMap {
                axis: Axis::Y,
                sign: -1,
            },
            z: AxisMap {
                axis: Axis::X,
                sign: 1,
            },
        },
        last_used: now_millis(),
        notes: Some("Dummy coordinate transform for testing".to_string()),
    }
}

/// A source-level pulse with an index-derived waveform.
pub fn dummy_pulse(pulse_length: usize) -> Pulse {
    let (time, signal) = dummy_waveform(pulse_length);
    Pulse::new(now_millis(), time, signal)
}

/// A plain (leaf) trace.
pub fn plain_trace(pulse_length: usize) -> Trace {
    let (time, signal) = dummy_waveform(pulse_length);
    Trace::new(now_millis(), time, signal)
}

/// Ordered stitch segments with per-segment shifts.
pub fn dummy_composition(composed_of_n: usize, pulse_length: usize) -> Vec<PulseComposition> {
    (0..composed_of_n)
        .map(|index| PulseComposition {
            pulse: dummy_pulse(pulse_length),
            position: index as u32,
            shift: index as f32 * 10e-12,
        })
        .collect()
}

/// A trace stitched from `composed_of_n` sources.
pub fn stitched_trace(composed_of_n: usize, pulse_length: usize) -> Trace {
    let mut trace = plain_trace(pulse_length);
    trace.derived_from = Some(dummy_composition(composed_of_n, pulse_length));
    trace
}

/// A trace averaged from `averaged_of_n` inputs; when `composed_of_n` is
/// nonzero each input is itself stitched from that many sources.
pub fn averaged_trace(
    averaged_of_n: usize,
    composed_of_n: usize,
    pulse_length: usize,
) -> Trace {
    let sources = (0..averaged_of_n)
        .map(|_| {
            if composed_of_n > 0 {
                stitched_trace(composed_of_n, pulse_length)
            } else {
                plain_trace(pulse_length)
            }
        })
        .collect();
    let mut trace = plain_trace(pulse_length);
    trace.averaged_from = Some(sources);
    trace
}

/// `n` plain measurements of one variant on a diagonal of points.
pub fn dummy_measurements(
    variant: TraceVariant,
    n_results: usize,
    pulse_length: usize,
) -> Vec<Measurement> {
    (0..n_results)
        .map(|index| Measurement {
            pulse: plain_trace(pulse_length),
            point: Point3D::new(index as f64, index as f64, index as f64),
            variant,
            reference: None,
            annotations: Some(Vec::new()),
            pass_number: None,
        })
        .collect()
}

/// Measurements covering the main shape branches: point variations,
/// annotation kinds, all variants, reference links, stitching, averaging,
/// averaged-of-stitched, and pass numbers.
pub fn measurement_variants() -> Vec<Measurement> {
    let reference = Measurement {
        pulse: plain_trace(3),
        point: Point3D::new(0.0, 0.0, 0.0),
        variant: TraceVariant::Reference,
        reference: None,
        annotations: None,
        pass_number: None,
    };
    let reference_uuid = reference.pulse.uuid;

    let build = |pulse: Trace| Measurement {
        pulse,
        point: Point3D::default(),
        variant: TraceVariant::Sample,
        reference: Some(reference_uuid),
        annotations: None,
        pass_number: None,
    };

    let mut variants = vec![
        reference,
        build(stitched_trace(2, 3)),
        Measurement {
            point: Point3D::new(1.0, 2.0, 3.0),
            ..build(plain_trace(3))
        },
        Measurement {
            point: Point3D {
                x: Some(4.0),
                y: None,
                z: Some(6.0),
            },
            ..build(plain_trace(3))
        },
        Measurement {
            variant: TraceVariant::Noise,
            ..build(plain_trace(3))
        },
        Measurement {
            variant: TraceVariant::Other,
            ..build(plain_trace(3))
        },
        Measurement {
            annotations: Some(vec![KVPair {
                key: "s".to_string(),
                value: KVValue::Text("v".to_string()),
            }]),
            ..build(plain_trace(3))
        },
        Measurement {
            annotations: Some(vec![
                KVPair {
                    key: "int".to_string(),
                    value: KVValue::Int(42),
                },
                KVPair {
                    key: "f".to_string(),
                    value: KVValue::Float(3.14),
                },
            ]),
            ..build(plain_trace(3))
        },
        Measurement {
            pass_number: Some(1),
            ..build(plain_trace(3))
        },
        Measurement {
            pass_number: Some(2),
            ..build(plain_trace(3))
        },
        build(averaged_trace(3, 0, 3)),
        build(averaged_trace(2, 2, 3)),
    ];

    // Spread timestamps so load ordering is stable across the batch.
    let base = now_millis();
    for (index, measurement) in variants.iter_mut().enumerate() {
        measurement.pulse.timestamp = base + index as i64;
    }
    variants
}

/// Creates a populated store at `path` for testing.
pub fn make_dummy_store(
    path: impl AsRef<Path>,
) -> StoreResult<(RasterConfig, DeviceMetadata, RasterMetadata)> {
    let (config, device, meta) = dummy_metadata();
    create_store(&path, &config, &device, &meta, &[])?;
    add_pulses(&path, &measurement_variants())?;
    Ok((config, device, meta))
}

fn dummy_waveform(pulse_length: usize) -> (Vec<f32>, Vec<f32>) {
    let time = (0..pulse_length).map(|index| index as f32).collect();
    let signal = (0..pulse_length)
        .map(|index| ((index * 7 + 3) % 13) as f32 * 0.25)
        .collect();
    (time, signal)
}
