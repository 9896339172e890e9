//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `pulsegrid_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("pulsegrid_core version={}", pulsegrid_core::core_version());
    println!(
        "pulsegrid_core schema_version={}",
        pulsegrid_core::db::migrations::latest_version()
    );
}
