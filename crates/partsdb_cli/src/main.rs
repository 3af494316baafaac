//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `partsdb_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use std::process;

fn main() {
    println!("partsdb_core version={}", partsdb_core::core_version());

    // An in-memory open runs the full migration chain.
    match partsdb_core::open_db_in_memory() {
        Ok(_conn) => println!(
            "partsdb_core schema_version={}",
            partsdb_core::db::migrations::latest_version()
        ),
        Err(err) => {
            eprintln!("partsdb_core open failed: {err}");
            process::exit(1);
        }
    }
}
