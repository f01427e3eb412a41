//! Record normalizers.
//!
//! Each normalizer turns one raw record of its source collection into
//! (source id, source name, genes, diseases) and folds it into the job's
//! aggregate. Normalizers are looked up by name in the
//! [`NormalizerRegistry`](crate::registry::NormalizerRegistry).

pub mod study;
pub mod region;
pub mod membership;
pub mod candidate_region;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use locitag_common::{CriteriaConfig, Document, RecordFilter, Result};
use locitag_store::{PageCursor, SearchStore};

use crate::evidence::GeneDiseaseAggregate;
use crate::overlap::OverlapResolver;

pub use candidate_region::CandGeneInRegion;
pub use membership::IsGeneInMhc;
pub use region::{GeneInRegion, LocatedRegion, RegionIndex};
pub use study::CandGeneInStudy;

/// What a single record contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub evidence_added: usize,
    /// Cross-references that could not be resolved and were skipped.
    pub references_missing: usize,
}

impl NormalizeOutcome {
    pub fn added(evidence_added: usize) -> Self {
        Self { evidence_added, references_missing: 0 }
    }
}

/// Everything a normalizer may consult while processing one section.
pub struct JobContext<'a> {
    pub section: &'a str,
    pub config: &'a CriteriaConfig,
    pub store: &'a dyn SearchStore,
    disease_codes: Option<Arc<BTreeSet<String>>>,
    region_index: Option<Arc<RegionIndex>>,
}

impl<'a> JobContext<'a> {
    pub fn new(section: &'a str, config: &'a CriteriaConfig, store: &'a dyn SearchStore) -> Self {
        Self { section, config, store, disease_codes: None, region_index: None }
    }

    pub fn resolver(&self) -> OverlapResolver<'a> {
        OverlapResolver::new(self.store, self.config.page_size)
    }

    /// Every disease code in the disease collection. Fetched once per job.
    pub async fn disease_codes(&mut self) -> Result<Arc<BTreeSet<String>>> {
        if let Some(codes) = &self.disease_codes {
            return Ok(Arc::clone(codes));
        }
        let codes = Arc::new(self.fetch_disease_codes().await?);
        debug!(n = codes.len(), "Disease codes loaded");
        self.disease_codes = Some(Arc::clone(&codes));
        Ok(codes)
    }

    pub fn region_index_loaded(&self) -> bool {
        self.region_index.is_some()
    }

    /// Regions located on the configured build. Built once per job.
    pub async fn region_index(&mut self) -> Result<Arc<RegionIndex>> {
        if let Some(index) = &self.region_index {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(region::build_region_index(self).await?);
        self.region_index = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn fetch_disease_codes(&self) -> Result<BTreeSet<String>> {
        let collection = &self.config.collections.disease;
        let filter = RecordFilter::default();
        let mut codes = BTreeSet::new();
        let mut cursor: Option<PageCursor> = None;
        loop {
            let page = self.store.query(collection, &filter, self.config.page_size, cursor.as_ref()).await?;
            if page.records.is_empty() {
                break;
            }
            codes.extend(
                page.records
                    .iter()
                    .map(|d| d.field_str("code").unwrap_or_else(|| d.id.clone())),
            );
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(codes)
    }
}

/// Strategy converting one record shape into aggregate evidence.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Registry name, also the default section name.
    fn name(&self) -> &'static str;

    /// Feature type the normalizer tags.
    fn feature(&self) -> &'static str {
        "gene"
    }

    /// Normalize `doc` and merge it into `aggregate`.
    ///
    /// A malformed record must fail before anything is merged.
    async fn normalize(
        &self,
        doc: &Document,
        ctx: &mut JobContext<'_>,
        aggregate: &mut GeneDiseaseAggregate,
    ) -> Result<NormalizeOutcome>;
}

// ── Serde helpers ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Num(serde_json::Number),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::Str(s) => s,
            StringOrNumber::Num(n) => n.to_string(),
        }
    }
}

/// Chromosome names and build numbers arrive as either strings or numbers.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    StringOrNumber::deserialize(d).map(StringOrNumber::into_string)
}

pub(crate) fn opt_string_or_number<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(d)?.map(StringOrNumber::into_string))
}
