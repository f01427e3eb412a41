//! Candidate genes reported by a study.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use locitag_common::{Document, LocitagError, Result};

use super::{JobContext, NormalizeOutcome, Normalizer};
use crate::evidence::{collect_ids, GeneDiseaseAggregate, NormalizedRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub initials: String,
}

/// A study document from the studies collection.
#[derive(Debug, Clone, Deserialize)]
pub struct StudyRecord {
    pub study_id: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub genes: Vec<Option<String>>,
    pub diseases: Vec<Option<String>>,
}

impl StudyRecord {
    /// "Name Initials" of the first listed author.
    pub fn first_author(&self) -> Option<String> {
        self.authors
            .first()
            .map(|a| format!("{} {}", a.name, a.initials))
    }

    pub fn normalize(&self, record_id: &str) -> Result<NormalizedRecord> {
        let first_author = self
            .first_author()
            .ok_or_else(|| LocitagError::record_format(record_id, "study has no authors"))?;
        Ok(NormalizedRecord::new(
            &self.study_id,
            &first_author,
            collect_ids(self.genes.iter().cloned()),
            collect_ids(self.diseases.iter().cloned()),
        ))
    }
}

/// `cand_gene_in_study`: every study gene is tagged with every study disease.
#[derive(Debug, Default)]
pub struct CandGeneInStudy;

#[async_trait]
impl Normalizer for CandGeneInStudy {
    fn name(&self) -> &'static str {
        "cand_gene_in_study"
    }

    async fn normalize(
        &self,
        doc: &Document,
        _ctx: &mut JobContext<'_>,
        aggregate: &mut GeneDiseaseAggregate,
    ) -> Result<NormalizeOutcome> {
        let study: StudyRecord = doc.parse()?;
        let record = study.normalize(&doc.id)?;
        debug!(
            study_id = %record.source_id,
            genes = record.genes.len(),
            diseases = record.diseases.len(),
            first_author = %record.source_name,
            "Study normalised"
        );
        Ok(NormalizeOutcome::added(record.merge_into(aggregate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locitag_common::CriteriaConfig;
    use locitag_store::MemoryStore;
    use serde_json::json;

    fn barrett() -> Document {
        Document::new("GDXHsS00004", json!({
            "diseases": ["T1D", "MS"],
            "genes": ["ENSG00000110848", "ENSG00000160791", "ENSG00000163599"],
            "study_id": "GDXHsS00004",
            "authors": [
                {"name": "Barrett", "initials": "JC"},
                {"name": "Type 1 Diabetes Genetics Consortium", "initials": ""}
            ]
        }))
    }

    async fn run(doc: &Document, aggregate: &mut GeneDiseaseAggregate) -> Result<NormalizeOutcome> {
        let store = MemoryStore::new();
        let config = CriteriaConfig::default();
        let mut ctx = JobContext::new("cand_gene_in_study", &config, &store);
        CandGeneInStudy.normalize(doc, &mut ctx, aggregate).await
    }

    #[tokio::test]
    async fn test_first_author_is_source_name() {
        let mut agg = GeneDiseaseAggregate::new();
        let outcome = run(&barrett(), &mut agg).await.unwrap();
        assert_eq!(outcome.evidence_added, 6);
        assert_eq!(
            serde_json::to_value(&agg).unwrap()["ENSG00000110848"],
            json!({
                "T1D": [{"fid": "GDXHsS00004", "fname": "Barrett JC"}],
                "MS": [{"fid": "GDXHsS00004", "fname": "Barrett JC"}]
            })
        );
    }

    #[tokio::test]
    async fn test_second_study_extends_shared_gene() {
        let mut agg = GeneDiseaseAggregate::new();
        run(&barrett(), &mut agg).await.unwrap();
        let clatfield = Document::new("GDXHsS00005", json!({
            "diseases": ["RA", "T1D"],
            "genes": ["ENSG00000110800", "ENSG00000160801", "ENSG00000163599"],
            "study_id": "GDXHsS00005",
            "authors": [{"name": "Clatfield", "initials": "XY"}]
        }));
        run(&clatfield, &mut agg).await.unwrap();

        assert_eq!(agg.gene_count(), 5);
        let t1d: Vec<_> = agg
            .evidence("ENSG00000163599", "T1D")
            .unwrap()
            .iter()
            .map(|e| e.source_name.as_str())
            .collect();
        assert_eq!(t1d, vec!["Barrett JC", "Clatfield XY"]);
        assert!(agg.evidence("ENSG00000160791", "RA").is_none());
    }

    #[tokio::test]
    async fn test_null_genes_are_skipped() {
        let doc = Document::new("S2", json!({
            "study_id": "S2", "genes": [null, "G1", ""], "diseases": ["AA"],
            "authors": [{"name": "AaTestAuthor", "initials": "TT"}]
        }));
        let mut agg = GeneDiseaseAggregate::new();
        assert_eq!(run(&doc, &mut agg).await.unwrap().evidence_added, 1);
        assert_eq!(agg.evidence("G1", "AA").unwrap()[0].source_name, "AaTestAuthor TT");
    }

    #[tokio::test]
    async fn test_missing_fields_are_format_errors() {
        let mut agg = GeneDiseaseAggregate::new();
        let no_authors = Document::new("S3", json!({"study_id": "S3", "genes": ["G1"], "diseases": ["D1"]}));
        assert!(matches!(run(&no_authors, &mut agg).await, Err(LocitagError::RecordFormat { .. })));
        let no_genes = Document::new("S4", json!({"study_id": "S4", "diseases": ["D1"], "authors": [{"name": "X"}]}));
        assert!(matches!(run(&no_genes, &mut agg).await, Err(LocitagError::RecordFormat { .. })));
        assert!(agg.is_empty());
    }
}
