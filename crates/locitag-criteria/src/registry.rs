//! Normalizer registry.
//!
//! Maps normalizer names to implementations. Sections are resolved and
//! validated against it before any scan starts, so a typo in the config
//! fails the run up front instead of after pages of work.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use locitag_common::{CriteriaConfig, LocitagError, Result};

use crate::normalise::{CandGeneInRegion, CandGeneInStudy, GeneInRegion, IsGeneInMhc, Normalizer};

pub type NormalizerName = String;

/// Anything that can say which normalizer handles a section.
pub trait ConfigProvider {
    fn get_normalizer_for(&self, section: &str) -> Result<NormalizerName>;
}

impl ConfigProvider for CriteriaConfig {
    fn get_normalizer_for(&self, section: &str) -> Result<NormalizerName> {
        self.normalizer_name(section)
    }
}

#[derive(Clone)]
pub struct NormalizerRegistry {
    normalizers: BTreeMap<&'static str, Arc<dyn Normalizer>>,
}

impl NormalizerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { normalizers: BTreeMap::new() }
    }

    /// Registry holding every built-in normalizer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CandGeneInStudy));
        registry.register(Arc::new(GeneInRegion));
        registry.register(Arc::new(IsGeneInMhc));
        registry.register(Arc::new(CandGeneInRegion));
        registry
    }

    /// Add a normalizer under its own name, replacing any previous one.
    pub fn register(&mut self, normalizer: Arc<dyn Normalizer>) {
        debug!(name = normalizer.name(), "Registering normalizer");
        self.normalizers.insert(normalizer.name(), normalizer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Normalizer>> {
        self.normalizers.get(name).cloned()
    }

    /// Normalizer configured for `section`.
    pub fn resolve(&self, config: &dyn ConfigProvider, section: &str) -> Result<Arc<dyn Normalizer>> {
        let name = config.get_normalizer_for(section)?;
        self.get(&name).ok_or_else(|| LocitagError::UnknownNormalizer {
            section: section.to_string(),
            name,
        })
    }

    /// Check every configured section resolves to a normalizer for its feature.
    pub fn validate(&self, config: &CriteriaConfig) -> Result<()> {
        for (section, cfg) in &config.sections {
            let normalizer = self.resolve(config, section)?;
            if normalizer.feature() != cfg.feature {
                return Err(LocitagError::Config(format!(
                    "section '{}' tags feature '{}' but normalizer '{}' produces '{}'",
                    section,
                    cfg.feature,
                    normalizer.name(),
                    normalizer.feature()
                )));
            }
        }
        Ok(())
    }

    /// Registered names grouped by feature type.
    pub fn available(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut by_feature: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for normalizer in self.normalizers.values() {
            by_feature.entry(normalizer.feature()).or_default().push(normalizer.name());
        }
        by_feature
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for NormalizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizerRegistry")
            .field("normalizers", &self.normalizers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use locitag_common::{CollectionRef, Document, SectionConfig};

    use crate::evidence::GeneDiseaseAggregate;
    use crate::normalise::{JobContext, NormalizeOutcome};

    fn config_with(sections: &[(&str, Option<&str>)]) -> CriteriaConfig {
        let mut config = CriteriaConfig::default();
        for (name, normalizer) in sections {
            let mut section = SectionConfig::new(CollectionRef::new("src", None));
            section.normalizer = normalizer.map(String::from);
            config.sections.insert(name.to_string(), section);
        }
        config
    }

    #[test]
    fn test_defaults_cover_gene_normalizers() {
        let registry = NormalizerRegistry::with_defaults();
        let available = registry.available();
        assert_eq!(
            available["gene"],
            vec!["cand_gene_in_region", "cand_gene_in_study", "gene_in_region", "is_gene_in_mhc"]
        );
    }

    #[test]
    fn test_resolve_by_section_name_or_override() {
        let registry = NormalizerRegistry::with_defaults();
        let config = config_with(&[("gene_in_region", None), ("in_mhc", Some("is_gene_in_mhc"))]);
        assert_eq!(registry.resolve(&config, "gene_in_region").unwrap().name(), "gene_in_region");
        assert_eq!(registry.resolve(&config, "in_mhc").unwrap().name(), "is_gene_in_mhc");
        assert!(matches!(registry.resolve(&config, "nope"), Err(LocitagError::UnknownSection(_))));
    }

    #[test]
    fn test_unknown_normalizer_fails_validation() {
        let registry = NormalizerRegistry::with_defaults();
        let config = config_with(&[("gene_in_region", None), ("marker_in_study", None)]);
        let err = registry.validate(&config).unwrap_err();
        assert!(matches!(
            err,
            LocitagError::UnknownNormalizer { ref section, ref name }
                if section == "marker_in_study" && name == "marker_in_study"
        ));
    }

    struct MarkerNormalizer;

    #[async_trait]
    impl Normalizer for MarkerNormalizer {
        fn name(&self) -> &'static str {
            "marker_in_study"
        }
        fn feature(&self) -> &'static str {
            "marker"
        }
        async fn normalize(
            &self,
            _doc: &Document,
            _ctx: &mut JobContext<'_>,
            _aggregate: &mut GeneDiseaseAggregate,
        ) -> Result<NormalizeOutcome> {
            Ok(NormalizeOutcome::default())
        }
    }

    #[test]
    fn test_feature_mismatch_fails_validation() {
        let mut registry = NormalizerRegistry::with_defaults();
        registry.register(Arc::new(MarkerNormalizer));
        let mut config = config_with(&[("marker_in_study", None)]);
        assert!(matches!(registry.validate(&config), Err(LocitagError::Config(_))));

        config.sections.get_mut("marker_in_study").unwrap().feature = "marker".to_string();
        registry.validate(&config).unwrap();
        assert_eq!(registry.available()["marker"], vec!["marker_in_study"]);
    }
}
