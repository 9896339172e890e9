//! Store-level use-case services.
//!
//! # Responsibility
//! - Provide the stable operation surface callers use: create, append,
//!   load, metadata and annotation updates.
//! - Own transaction boundaries; one façade call is one transaction.

pub mod store_service;
