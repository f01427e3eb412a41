//! Criteria job configuration.
//!
//! Reads `locitag.toml` (or a `.yaml`/`.yml` file) from the path given on the
//! command line or in the `LOCITAG_CONFIG` env var. Each `[sections.<name>]`
//! entry describes one criteria job: the collection to scan and the
//! normalizer that turns its records into gene → disease evidence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::document::{CollectionRef, RecordFilter};
use crate::error::{LocitagError, Result};

pub const CONFIG_ENV_VAR: &str = "LOCITAG_CONFIG";

/// Complete criteria configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaConfig {
    /// Genome assembly the coordinates refer to (e.g. "38").
    #[serde(default = "default_genome_build")]
    pub genome_build: String,

    /// Records requested per page when scanning a collection.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Bases added to both ends of a region span before the gene overlap lookup.
    #[serde(default)]
    pub region_padding: u64,

    #[serde(default)]
    pub collections: CollectionsConfig,

    #[serde(default)]
    pub coordinates: CoordinatesConfig,

    #[serde(default)]
    pub sections: BTreeMap<String, SectionConfig>,
}

fn default_genome_build() -> String { "38".to_string() }
fn default_page_size() -> usize { 500 }

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            genome_build: default_genome_build(),
            page_size: default_page_size(),
            region_padding: 0,
            collections: CollectionsConfig::default(),
            coordinates: CoordinatesConfig::default(),
            sections: BTreeMap::new(),
        }
    }
}

// ── Collections ───────────────────────────────────────────────────────────────

/// Lookup collections shared by every section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_gene_collection")]
    pub gene: CollectionRef,
    #[serde(default = "default_region_collection")]
    pub region: CollectionRef,
    #[serde(default = "default_disease_locus_collection")]
    pub disease_locus: CollectionRef,
    #[serde(default = "default_disease_collection")]
    pub disease: CollectionRef,
}

fn default_gene_collection() -> CollectionRef { CollectionRef::new("genes", Some("gene")) }
fn default_region_collection() -> CollectionRef { CollectionRef::new("regions", Some("region")) }
fn default_disease_locus_collection() -> CollectionRef { CollectionRef::new("regions", Some("disease_locus")) }
fn default_disease_collection() -> CollectionRef { CollectionRef::new("diseases", Some("disease")) }

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            gene: default_gene_collection(),
            region: default_region_collection(),
            disease_locus: default_disease_locus_collection(),
            disease: default_disease_collection(),
        }
    }
}

// ── Coordinates ───────────────────────────────────────────────────────────────

/// Where a collection stores its chromosome, start and end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFields {
    pub seqid_field: String,
    pub start_field: String,
    pub end_field: String,
}

impl CoordinateFields {
    pub fn new(seqid: &str, start: &str, end: &str) -> Self {
        Self {
            seqid_field: seqid.to_string(),
            start_field: start.to_string(),
            end_field: end.to_string(),
        }
    }

    /// Source fields needed to read a span back out of a document.
    pub fn source_fields(&self) -> Vec<String> {
        vec![self.seqid_field.clone(), self.start_field.clone(), self.end_field.clone()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatesConfig {
    #[serde(default = "default_gene_coordinates")]
    pub gene: CoordinateFields,
}

fn default_gene_coordinates() -> CoordinateFields {
    CoordinateFields::new("chromosome", "start", "stop")
}

impl Default for CoordinatesConfig {
    fn default() -> Self {
        Self { gene: default_gene_coordinates() }
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

/// One criteria job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Feature type being tagged (only "gene" today).
    #[serde(default = "default_feature")]
    pub feature: String,

    /// Collection whose records are scanned.
    pub source: CollectionRef,

    /// Registered normalizer name; defaults to the section name.
    #[serde(default)]
    pub normalizer: Option<String>,

    #[serde(default)]
    pub filter: RecordFilter,

    /// Evidence id/name used by membership sections; defaults to the section name.
    #[serde(default)]
    pub membership_label: Option<String>,

    /// Where the JSON loader writes this section's documents.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_feature() -> String { "gene".to_string() }

impl SectionConfig {
    pub fn new(source: CollectionRef) -> Self {
        Self {
            feature: default_feature(),
            source,
            normalizer: None,
            filter: RecordFilter::default(),
            membership_label: None,
            output: None,
        }
    }
}

// ── Helper Methods ─────────────────────────────────────────────────────────────

impl CriteriaConfig {
    /// Path from `LOCITAG_CONFIG`, falling back to `locitag.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("locitag.toml"))
    }

    /// Load from a TOML or YAML file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LocitagError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        debug!(path = %path.display(), sections = config.sections.len(), "Config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LocitagError::Config(e.to_string()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| LocitagError::Config(e.to_string()))
    }

    pub fn section(&self, name: &str) -> Result<&SectionConfig> {
        self.sections
            .get(name)
            .ok_or_else(|| LocitagError::UnknownSection(name.to_string()))
    }

    /// Normalizer configured for a section (the section name unless overridden).
    pub fn normalizer_name(&self, section: &str) -> Result<String> {
        let cfg = self.section(section)?;
        Ok(cfg.normalizer.clone().unwrap_or_else(|| section.to_string()))
    }

    /// Sections tagging the given feature type.
    pub fn sections_for_feature<'a>(&'a self, feature: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.sections
            .iter()
            .filter(move |(_, s)| s.feature == feature)
            .map(|(name, _)| name.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
genome_build = "38"
page_size = 100
region_padding = 5000

[collections.gene]
index = "genes_hg38_v0.0.2"
doc_type = "gene"

[sections.cand_gene_in_study]
source = { index = "studies_latest", doc_type = "studies" }

[sections.gene_in_region]
source = { index = "regions_v0.0.5", doc_type = "region" }
filter = { tier = 1 }

[sections.in_mhc]
normalizer = "is_gene_in_mhc"
source = { index = "genes_hg38_v0.0.2", doc_type = "gene" }
filter = { chromosome = "6" }
"#;

    #[test]
    fn test_default_config() {
        let config = CriteriaConfig::default();
        assert_eq!(config.genome_build, "38");
        assert_eq!(config.page_size, 500);
        assert_eq!(config.coordinates.gene.end_field, "stop");
        assert!(config.sections.is_empty());
    }

    #[test]
    fn test_toml_sections() {
        let config = CriteriaConfig::from_toml_str(SAMPLE_TOML).unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.region_padding, 5000);
        assert_eq!(config.collections.gene.index, "genes_hg38_v0.0.2");
        // Unset collections fall back to defaults
        assert_eq!(config.collections.region.doc_type.as_deref(), Some("region"));
        assert_eq!(config.normalizer_name("cand_gene_in_study").unwrap(), "cand_gene_in_study");
        assert_eq!(config.normalizer_name("in_mhc").unwrap(), "is_gene_in_mhc");
        assert!(!config.section("gene_in_region").unwrap().filter.is_empty());
        assert_eq!(config.sections_for_feature("gene").count(), 3);
    }

    #[test]
    fn test_unknown_section() {
        let config = CriteriaConfig::from_toml_str(SAMPLE_TOML).unwrap();
        assert!(matches!(config.section("marker_in_study"), Err(LocitagError::UnknownSection(_))));
    }

    #[test]
    fn test_yaml_config() {
        let yaml = "genome_build: '37'\nsections:\n  cand_gene_in_region:\n    source:\n      index: studies_latest\n";
        let config = CriteriaConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.genome_build, "37");
        assert_eq!(config.section("cand_gene_in_region").unwrap().feature, "gene");
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("locitag.toml");
        std::fs::write(&toml_path, SAMPLE_TOML).unwrap();
        assert_eq!(CriteriaConfig::load(&toml_path).unwrap().sections.len(), 3);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(CriteriaConfig::load(&missing), Err(LocitagError::Config(_))));
    }

    #[test]
    fn test_example_config_parses() {
        let config = CriteriaConfig::from_toml_str(include_str!("../../../locitag.example.toml")).unwrap();
        assert_eq!(config.sections.len(), 4);
        let mhc = config.section("is_gene_in_mhc").unwrap();
        assert_eq!(mhc.membership_label.as_deref(), Some("MHC"));
        assert_eq!(mhc.output, Some(PathBuf::from("criteria/gene_mhc.json")));
        // Region build selection happens per record, not through a filter
        assert!(config.section("gene_in_region").unwrap().filter.is_empty());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(CriteriaConfig::from_toml_str("page_size = 'many'"), Err(LocitagError::Config(_))));
    }
}
