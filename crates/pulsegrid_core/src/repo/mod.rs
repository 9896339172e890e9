//! Persistence repositories over the migrated store schema.
//!
//! # Responsibility
//! - Keep all SQL for the `pulses`, `pulse_composition` and `raster_info`
//!   tables inside the core persistence boundary.
//! - Reject invalid persisted state instead of masking it.

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod lineage_repo;
pub mod pulse_repo;
pub mod raster_repo;

pub use pulse_repo::{RepoError, RepoResult};

pub(crate) fn to_json<T: Serialize>(value: &T, context: &str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {context}: {err}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(json: &str, context: &str) -> RepoResult<T> {
    serde_json::from_str(json)
        .map_err(|err| RepoError::InvalidData(format!("invalid {context} payload: {err}")))
}
