//! Embedded single-file store for pulse waveforms and their derivation
//! lineage. This crate is the single source of truth for store invariants.

pub mod codec;
pub mod compose;
pub mod db;
pub mod devtools;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::pulse::{
    CompositionKind, Measurement, Pulse, PulseComposition, PulseId, PulseValidationError, Trace,
    TraceVariant,
};
pub use model::raster::{
    CoordinateTransform, DeviceMetadata, KVPair, KVValue, Point3D, RasterConfig, RasterMetadata,
    RasterPattern, RepetitionsConfig,
};
pub use repo::lineage_repo::{CompositionEdge, FinalPulseFilter, SourceEdge};
pub use repo::{RepoError, RepoResult};
pub use service::store_service::{
    add_pulses, create_store, load_metadata, load_pulses, update_annotations, StoreError,
    StoreMetadata, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
