//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep callers decoupled from storage details.

pub mod attribute_service;
pub mod import_service;
pub mod system_service;
pub mod taxonomy_service;
