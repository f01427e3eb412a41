//! Persisting a finished aggregate.
//!
//! The scan driver calls [`Loader::write`] once, after the last page. The
//! criteria index holds one document per gene; [`to_criteria_documents`]
//! builds those documents and [`JsonFileLoader`] writes them to disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

use locitag_common::LoadError;

use crate::evidence::{DiseaseEvidence, GeneDiseaseAggregate};

/// Destination for a completed section aggregate.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn write(&self, feature: &str, section: &str, aggregate: &GeneDiseaseAggregate) -> Result<(), LoadError>;
}

/// One criteria-index document: a gene and its evidence for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub qid: String,
    /// Section name → disease → evidence. Holds a single section per document.
    #[serde(flatten)]
    pub sections: BTreeMap<String, DiseaseEvidence>,
    pub disease_tags: Vec<String>,
}

/// Criteria documents for every gene in `aggregate`, in gene order.
pub fn to_criteria_documents(section: &str, aggregate: &GeneDiseaseAggregate) -> Vec<CriteriaDocument> {
    aggregate
        .iter()
        .map(|(gene, diseases)| {
            let disease_tags: BTreeSet<&String> = diseases.keys().collect();
            CriteriaDocument {
                id: gene.clone(),
                qid: gene.clone(),
                sections: BTreeMap::from([(section.to_string(), diseases.clone())]),
                disease_tags: disease_tags.into_iter().cloned().collect(),
            }
        })
        .collect()
}

/// Writes criteria documents as a JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileLoader {
    target: Target,
}

#[derive(Debug, Clone)]
enum Target {
    /// One `<feature>_<section>.json` file per section inside the directory.
    Dir(PathBuf),
    File(PathBuf),
}

impl JsonFileLoader {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { target: Target::Dir(dir.into()) }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self { target: Target::File(path.into()) }
    }

    /// Path written for the given feature and section.
    pub fn output_path(&self, feature: &str, section: &str) -> PathBuf {
        match &self.target {
            Target::Dir(dir) => dir.join(format!("{}_{}.json", feature, section)),
            Target::File(path) => path.clone(),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io { path: path.to_path_buf(), source }
}

#[async_trait]
impl Loader for JsonFileLoader {
    async fn write(&self, feature: &str, section: &str, aggregate: &GeneDiseaseAggregate) -> Result<(), LoadError> {
        let path = self.output_path(feature, section);
        let docs = to_criteria_documents(section, aggregate);
        let body = serde_json::to_vec_pretty(&docs)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(path = %path.display(), documents = docs.len(), "Criteria documents written");
        Ok(())
    }
}
