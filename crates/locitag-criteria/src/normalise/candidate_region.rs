//! Candidate genes tagged through the regions they fall in.
//!
//! For each gene listed on the record: fetch its coordinates, find the
//! disease regions overlapping it, and credit every such region. Region
//! spans are resolved exactly as `gene_in_region` resolves them, so both
//! directions agree on which gene sits in which region.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, warn};

use locitag_common::{Document, Result};

use super::{JobContext, NormalizeOutcome, Normalizer};
use crate::evidence::GeneDiseaseAggregate;
use crate::overlap::GenomicSpan;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateGeneRecord {
    #[serde(default)]
    pub genes: Vec<Option<String>>,
}

impl CandidateGeneRecord {
    /// Non-blank genes in record order, first occurrence only.
    fn ordered_genes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.genes
            .iter()
            .flatten()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty() && seen.insert(g.clone()))
            .collect()
    }
}

/// `cand_gene_in_region`: each gene inherits the diseases of overlapping regions.
#[derive(Debug, Default)]
pub struct CandGeneInRegion;

#[async_trait]
impl Normalizer for CandGeneInRegion {
    fn name(&self) -> &'static str {
        "cand_gene_in_region"
    }

    async fn normalize(
        &self,
        doc: &Document,
        ctx: &mut JobContext<'_>,
        aggregate: &mut GeneDiseaseAggregate,
    ) -> Result<NormalizeOutcome> {
        let record: CandidateGeneRecord = doc.parse()?;
        let genes = record.ordered_genes();
        if genes.is_empty() {
            return Ok(NormalizeOutcome::default());
        }

        let gene_fields = ctx.config.coordinates.gene.clone();
        let ids: BTreeSet<String> = genes.iter().cloned().collect();
        let gene_docs = ctx
            .store
            .get_by_ids(&ctx.config.collections.gene, &ids, &gene_fields.source_fields())
            .await?;

        let fresh_index = !ctx.region_index_loaded();
        let index = ctx.region_index().await?;
        let mut outcome = NormalizeOutcome::default();
        if fresh_index {
            outcome.references_missing += index.references_missing;
        }

        for gene in &genes {
            let Some(gene_doc) = gene_docs.get(gene) else {
                error!(record_id = %doc.id, gene = %gene, "gene doc not found");
                outcome.references_missing += 1;
                continue;
            };
            let Some(span) = GenomicSpan::from_document(gene_doc, &gene_fields) else {
                warn!(record_id = %doc.id, gene = %gene, "gene doc has no usable coordinates, skipping");
                outcome.references_missing += 1;
                continue;
            };

            let gene_set = BTreeSet::from([gene.clone()]);
            let mut hits = 0;
            for region in index.overlapping(&span) {
                hits += 1;
                let record = &region.record;
                outcome.evidence_added +=
                    aggregate.merge(&record.region_id, &record.region_name, &gene_set, &record.diseases());
            }
            debug!(gene = %gene, span = %span, regions = hits, "Regions overlapping gene");
        }

        Ok(outcome)
    }
}
