//! locitag-common — Shared types, errors, and configuration used across all Locitag crates.

pub mod error;
pub mod config;
pub mod document;

// Re-export commonly used types
pub use config::{CollectionsConfig, CoordinateFields, CoordinatesConfig, CriteriaConfig, SectionConfig};
pub use document::{CollectionRef, Document, RecordFilter};
pub use error::{LoadError, LocitagError, Result};
