//! Gene → disease → evidence aggregate and the merge that builds it.
//!
//! One aggregate is created per criteria job and every normalizer folds its
//! record's contribution into it. Evidence is appended, never deduplicated
//! across calls: merging the same record twice yields two entries.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One record attesting a gene–disease link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneAssociationEvidence {
    #[serde(rename = "fid", alias = "source_id")]
    pub source_id: String,
    #[serde(rename = "fname", alias = "source_name")]
    pub source_name: String,
}

impl GeneAssociationEvidence {
    pub fn new(source_id: &str, source_name: &str) -> Self {
        Self { source_id: source_id.to_string(), source_name: source_name.to_string() }
    }
}

/// Evidence for one (gene, disease) pair, in processing order.
pub type DiseaseEvidenceList = Vec<GeneAssociationEvidence>;

/// Disease code → evidence for a single gene.
pub type DiseaseEvidence = BTreeMap<String, DiseaseEvidenceList>;

/// A record reduced to what the merge needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub source_id: String,
    pub source_name: String,
    pub genes: BTreeSet<String>,
    pub diseases: BTreeSet<String>,
}

impl NormalizedRecord {
    pub fn new(source_id: &str, source_name: &str, genes: BTreeSet<String>, diseases: BTreeSet<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            genes,
            diseases,
        }
    }

    /// Fold this record into `aggregate`; returns the evidence entries appended.
    pub fn merge_into(&self, aggregate: &mut GeneDiseaseAggregate) -> usize {
        aggregate.merge(&self.source_id, &self.source_name, &self.genes, &self.diseases)
    }
}

/// Collect identifiers from a raw list, dropping nulls and blanks.
pub fn collect_ids<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    raw.into_iter()
        .flatten()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// gene → disease → evidence. Keys are created on first evidence and never
/// removed, so every stored list is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GeneDiseaseAggregate {
    genes: BTreeMap<String, DiseaseEvidence>,
}

impl GeneDiseaseAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `{source_id, source_name}` for every pair in `genes × diseases`.
    ///
    /// Blank gene or disease identifiers are skipped. Empty inputs leave the
    /// aggregate untouched. Returns the number of entries appended.
    pub fn merge(
        &mut self,
        source_id: &str,
        source_name: &str,
        genes: &BTreeSet<String>,
        diseases: &BTreeSet<String>,
    ) -> usize {
        let diseases: Vec<&String> = diseases.iter().filter(|d| !d.is_empty()).collect();
        if diseases.is_empty() {
            return 0;
        }
        let evidence = GeneAssociationEvidence::new(source_id, source_name);
        let mut appended = 0;
        for gene in genes.iter().filter(|g| !g.is_empty()) {
            let by_disease = self.genes.entry(gene.clone()).or_default();
            for disease in &diseases {
                by_disease
                    .entry((*disease).clone())
                    .or_default()
                    .push(evidence.clone());
                appended += 1;
            }
        }
        appended
    }

    pub fn evidence(&self, gene: &str, disease: &str) -> Option<&[GeneAssociationEvidence]> {
        self.genes.get(gene)?.get(disease).map(Vec::as_slice)
    }

    pub fn diseases_for(&self, gene: &str) -> Option<&DiseaseEvidence> {
        self.genes.get(gene)
    }

    pub fn contains_gene(&self, gene: &str) -> bool {
        self.genes.contains_key(gene)
    }

    pub fn gene_count(&self) -> usize {
        self.genes.len()
    }

    /// Total evidence entries across all (gene, disease) pairs.
    pub fn evidence_count(&self) -> usize {
        self.genes.values().flat_map(|d| d.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DiseaseEvidence)> {
        self.genes.iter()
    }
}

/// By-value form of [`GeneDiseaseAggregate::merge`]: callers rebind to the
/// returned aggregate.
pub fn merge(
    mut aggregate: GeneDiseaseAggregate,
    source_id: &str,
    source_name: &str,
    genes: &BTreeSet<String>,
    diseases: &BTreeSet<String>,
) -> GeneDiseaseAggregate {
    aggregate.merge(source_id, source_name, genes, diseases);
    aggregate
}
