//! locitag-criteria — Gene → disease criteria jobs.
//! - Evidence merging into a per-job aggregate
//! - Coordinate overlap resolution against the search store
//! - Record normalizers (studies, regions, fixed membership, gene → region)
//! - Bulk scan driver and loaders

pub mod evidence;
pub mod overlap;
pub mod normalise;
pub mod registry;
pub mod scan;
pub mod loader;

pub use evidence::{merge, GeneAssociationEvidence, GeneDiseaseAggregate, NormalizedRecord};
pub use loader::{to_criteria_documents, CriteriaDocument, JsonFileLoader, Loader};
pub use normalise::{JobContext, NormalizeOutcome, Normalizer};
pub use overlap::{CandidateSource, FeatureRef, GenomicSpan, OverlapResolver};
pub use registry::{ConfigProvider, NormalizerName, NormalizerRegistry};
pub use scan::{run_section, ScanDriver, ScanOutcome, ScanProgress, ScanReport, ScanState};
