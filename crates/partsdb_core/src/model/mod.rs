//! Catalog domain model.
//!
//! # Responsibility
//! - Define the canonical entities of the part catalog.
//! - Keep validation rules next to the data they guard.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID generated at creation.
//! - Catalog rows are immutable once written, except for part reparenting.

pub mod attr;
pub mod part;
pub mod system;
pub mod unit;
