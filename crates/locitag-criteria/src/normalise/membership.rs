//! Fixed-membership features, e.g. genes known to sit in the MHC.
//!
//! Membership in such a region implicates a gene in every disease, so each
//! member is tagged with the full disease set of the disease collection.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use locitag_common::{Document, Result};

use super::{JobContext, NormalizeOutcome, Normalizer};
use crate::evidence::{collect_ids, GeneDiseaseAggregate};

/// A membership record. Without an explicit gene list the record itself is
/// the single member.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembershipRecord {
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub genes: Vec<Option<String>>,
}

/// `is_gene_in_mhc`: member genes are tagged with every known disease.
#[derive(Debug, Default)]
pub struct IsGeneInMhc;

#[async_trait]
impl Normalizer for IsGeneInMhc {
    fn name(&self) -> &'static str {
        "is_gene_in_mhc"
    }

    async fn normalize(
        &self,
        doc: &Document,
        ctx: &mut JobContext<'_>,
        aggregate: &mut GeneDiseaseAggregate,
    ) -> Result<NormalizeOutcome> {
        let record: MembershipRecord = doc.parse()?;
        let feature_id = record.feature_id.clone().unwrap_or_else(|| doc.id.clone());
        let mut genes = collect_ids(record.genes.iter().cloned());
        if genes.is_empty() {
            genes.insert(feature_id.clone());
        }

        let label = ctx
            .config
            .section(ctx.section)
            .ok()
            .and_then(|s| s.membership_label.clone())
            .unwrap_or_else(|| ctx.section.to_string());
        let diseases = ctx.disease_codes().await?;
        debug!(feature_id = %feature_id, genes = genes.len(), diseases = diseases.len(), "Membership normalised");

        Ok(NormalizeOutcome::added(aggregate.merge(&label, &label, &genes, &diseases)))
    }
}
