//! End-to-end criteria jobs against an in-memory store.
//!
//! Run with: cargo test --package locitag-criteria --test test_criteria_e2e

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::sync::broadcast;

use locitag_common::{CollectionRef, CriteriaConfig, Document, LoadError, LocitagError, SectionConfig};
use locitag_criteria::{
    run_section, GeneDiseaseAggregate, JsonFileLoader, Loader, NormalizerRegistry, ScanDriver, ScanState,
};
use locitag_store::memory::{doc, MemoryStore};

#[derive(Default)]
struct RecordingLoader {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Loader for RecordingLoader {
    async fn write(&self, _feature: &str, section: &str, _aggregate: &GeneDiseaseAggregate) -> Result<(), LoadError> {
        self.calls.lock().unwrap().push(section.to_string());
        Ok(())
    }
}

struct RejectingLoader;

#[async_trait]
impl Loader for RejectingLoader {
    async fn write(&self, _feature: &str, _section: &str, _aggregate: &GeneDiseaseAggregate) -> Result<(), LoadError> {
        Err(LoadError::Rejected("criteria index is read-only".to_string()))
    }
}

fn studies() -> CollectionRef {
    CollectionRef::new("studies_latest", Some("studies"))
}

fn region_source() -> CollectionRef {
    CollectionRef::new("regions_v0.0.5", Some("region"))
}

fn config() -> CriteriaConfig {
    let mut config = CriteriaConfig { page_size: 3, ..Default::default() };
    config.sections.insert("cand_gene_in_study".to_string(), SectionConfig::new(studies()));
    config.sections.insert("gene_in_region".to_string(), SectionConfig::new(region_source()));
    config
}

fn study(id: &str, author: Option<&str>, genes: &[&str], diseases: &[&str]) -> Document {
    let authors: Vec<Value> = author
        .map(|a| vec![json!({"name": a, "initials": "J"})])
        .unwrap_or_default();
    doc(id, json!({"study_id": id, "authors": authors, "genes": genes, "diseases": diseases}))
}

async fn seeded_store(config: &CriteriaConfig) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_all(&studies(), vec![
        study("S1", Some("Doe"), &["G1", "G2"], &["D1"]),
        study("S2", None, &["G9"], &["D9"]),
        study("S3", Some("Roe"), &["G2"], &["D1", "D2"]),
    ]).await;
    store.insert_all(&config.collections.gene, vec![
        doc("G3", json!({"chromosome": "1", "start": 150, "stop": 160})),
        doc("G4", json!({"chromosome": "2", "start": 150, "stop": 160})),
    ]).await;
    store.insert_all(&region_source(), vec![
        doc("R1", json!({
            "region_id": "R1", "region_name": "1p36.12",
            "build_info": {"build": 38, "seqid": "1", "start": 100, "end": 200},
            "tags": {"disease": ["IBD", "UC"]}
        })),
        doc("R2", json!({
            "region_id": "R2", "region_name": "6p21",
            "disease_loci": ["T1D_6001"], "tags": {"disease": ["T1D"]}
        })),
    ]).await;
    store
}

#[tokio::test]
async fn test_malformed_record_mid_page_is_skipped() {
    let config = config();
    let store = seeded_store(&config).await;
    let loader = RecordingLoader::default();

    let outcome = run_section(&store, &config, "cand_gene_in_study", &loader).await.unwrap();

    assert_eq!(outcome.report.state, ScanState::Done);
    assert_eq!(outcome.report.records_seen, 3);
    assert_eq!(outcome.report.records_skipped, 1);
    assert_eq!(outcome.report.warnings.len(), 1);
    assert!(!outcome.aggregate.contains_gene("G9"));

    let g2_d1: Vec<_> = outcome.aggregate.evidence("G2", "D1").unwrap().iter().map(|e| e.source_id.clone()).collect();
    assert_eq!(g2_d1, vec!["S1", "S3"]);
    assert_eq!(*loader.calls.lock().unwrap(), vec!["cand_gene_in_study"]);
}

#[tokio::test]
async fn test_region_job_writes_criteria_file() {
    let config = config();
    let store = seeded_store(&config).await;
    let dir = tempfile::tempdir().unwrap();
    let loader = JsonFileLoader::in_dir(dir.path());

    let outcome = run_section(&store, &config, "gene_in_region", &loader).await.unwrap();
    assert!(outcome.is_loaded());
    // R2 has no span and its locus is missing: skipped, counted, scan continues
    assert_eq!(outcome.report.references_missing, 1);
    assert_eq!(outcome.report.state, ScanState::Done);

    let written: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("gene_gene_in_region.json")).unwrap()).unwrap();
    assert_eq!(
        written,
        json!([{
            "_id": "G3",
            "qid": "G3",
            "gene_in_region": {
                "IBD": [{"fid": "R1", "fname": "1p36.12"}],
                "UC": [{"fid": "R1", "fname": "1p36.12"}]
            },
            "disease_tags": ["IBD", "UC"]
        }])
    );
}

#[tokio::test]
async fn test_store_outage_fails_scan_without_loading() {
    let config = config();
    let store = seeded_store(&config).await;
    store.mark_unavailable(&config.collections.gene).await;
    let registry = NormalizerRegistry::with_defaults();
    let loader = RecordingLoader::default();
    let (tx, mut rx) = broadcast::channel(16);

    let err = ScanDriver::new(&store, &registry, &config)
        .with_progress(tx)
        .run("gene_in_region", &loader)
        .await
        .unwrap_err();

    assert!(matches!(err, LocitagError::ResolverUnavailable(_)));
    assert!(loader.calls.lock().unwrap().is_empty());

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    let last = last.unwrap();
    assert_eq!(last.state, ScanState::Failed);
    assert!(last.error.is_some());
}

#[tokio::test]
async fn test_unknown_normalizer_fails_before_scanning() {
    let mut config = config();
    config.sections.get_mut("gene_in_region").unwrap().normalizer = Some("marker_in_region".to_string());
    let store = seeded_store(&config).await;
    let loader = RecordingLoader::default();

    let err = run_section(&store, &config, "gene_in_region", &loader).await.unwrap_err();
    assert!(matches!(err, LocitagError::UnknownNormalizer { .. }));
    assert_eq!(store.range_calls(), 0);
    assert!(loader.calls.lock().unwrap().is_empty());

    let err = run_section(&store, &config, "gene_in_study", &loader).await.unwrap_err();
    assert!(matches!(err, LocitagError::UnknownSection(_)));
}

#[tokio::test]
async fn test_load_failure_keeps_aggregate() {
    let config = config();
    let store = seeded_store(&config).await;

    let outcome = run_section(&store, &config, "cand_gene_in_study", &RejectingLoader).await.unwrap();
    assert!(matches!(outcome.load, Err(LoadError::Rejected(_))));
    assert_eq!(outcome.report.state, ScanState::Done);
    assert_eq!(outcome.aggregate.gene_count(), 2);
}

#[tokio::test]
async fn test_feature_runs_every_section() {
    let config = config();
    let store = seeded_store(&config).await;
    let registry = NormalizerRegistry::with_defaults();
    registry.validate(&config).unwrap();
    let loader = RecordingLoader::default();

    let outcomes = ScanDriver::new(&store, &registry, &config)
        .run_feature("gene", &loader)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(*loader.calls.lock().unwrap(), vec!["cand_gene_in_study", "gene_in_region"]);
}
