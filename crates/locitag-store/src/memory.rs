//! In-memory search store.
//!
//! Holds documents per collection in insertion order. Paging uses an offset
//! cursor, so a scan sees records in the order they were added.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use locitag_common::{CollectionRef, Document, LocitagError, RecordFilter, Result};

use crate::search::{Page, PageCursor, RangeQuery, SearchStore};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionRef, Vec<Document>>>,
    unavailable: RwLock<HashSet<CollectionRef>>,
    range_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &CollectionRef, doc: Document) {
        self.collections
            .write()
            .await
            .entry(collection.clone())
            .or_default()
            .push(doc);
    }

    pub async fn insert_all(&self, collection: &CollectionRef, docs: impl IntoIterator<Item = Document>) {
        let mut guard = self.collections.write().await;
        guard.entry(collection.clone()).or_default().extend(docs);
    }

    pub async fn len(&self, collection: &CollectionRef) -> usize {
        self.collections.read().await.get(collection).map_or(0, Vec::len)
    }

    /// Make every call touching `collection` fail as a transport fault.
    pub async fn mark_unavailable(&self, collection: &CollectionRef) {
        self.unavailable.write().await.insert(collection.clone());
    }

    /// Number of range query pages served so far.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::Relaxed)
    }

    /// Load a fixture file: a JSON object keyed by `index/doc_type`, each
    /// holding an array of `{"_id": .., "_source": {..}}` documents.
    pub async fn from_fixture(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let parsed: HashMap<String, Vec<Document>> = serde_json::from_str(&content)?;
        let store = Self::new();
        for (key, docs) in parsed {
            let collection = match key.split_once('/') {
                Some((index, doc_type)) => CollectionRef::new(index, Some(doc_type)),
                None => CollectionRef::new(&key, None),
            };
            debug!(collection = %collection, n = docs.len(), "Fixture collection loaded");
            store.insert_all(&collection, docs).await;
        }
        Ok(store)
    }

    async fn check_available(&self, collection: &CollectionRef) -> Result<()> {
        if self.unavailable.read().await.contains(collection) {
            return Err(LocitagError::ResolverUnavailable(format!(
                "collection {} is unavailable", collection
            )));
        }
        Ok(())
    }
}

fn decode_cursor(cursor: Option<&PageCursor>) -> Result<usize> {
    match cursor {
        None => Ok(0),
        Some(PageCursor(raw)) => raw
            .parse()
            .map_err(|_| LocitagError::ResolverUnavailable(format!("invalid cursor '{}'", raw))),
    }
}

fn paginate(matches: Vec<Document>, offset: usize, page_size: usize) -> Page {
    let page_size = page_size.max(1);
    let total = matches.len();
    let records: Vec<Document> = matches.into_iter().skip(offset).take(page_size).collect();
    let consumed = offset + records.len();
    let next = (consumed < total).then(|| PageCursor(consumed.to_string()));
    Page { records, next }
}

fn overlaps_query(doc: &Document, query: &RangeQuery) -> bool {
    let fields = &query.coordinates;
    if doc.field_str(&fields.seqid_field).as_deref() != Some(query.seqid.as_str()) {
        return false;
    }
    match (doc.field_u64(&fields.start_field), doc.field_u64(&fields.end_field)) {
        (Some(start), Some(end)) => start <= query.end && end >= query.start,
        _ => false,
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn query(
        &self,
        collection: &CollectionRef,
        filter: &RecordFilter,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<Page> {
        self.check_available(collection).await?;
        let offset = decode_cursor(cursor)?;
        let guard = self.collections.read().await;
        let matches: Vec<Document> = guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        Ok(paginate(matches, offset, page_size))
    }

    async fn get_by_ids(
        &self,
        collection: &CollectionRef,
        ids: &BTreeSet<String>,
        fields: &[String],
    ) -> Result<HashMap<String, Document>> {
        self.check_available(collection).await?;
        let guard = self.collections.read().await;
        let found = guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| ids.contains(&d.id))
                    .map(|d| (d.id.clone(), d.project(fields)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    async fn range_query(&self, query: &RangeQuery, cursor: Option<&PageCursor>) -> Result<Page> {
        self.check_available(&query.collection).await?;
        self.range_calls.fetch_add(1, Ordering::Relaxed);
        let offset = decode_cursor(cursor)?;
        let guard = self.collections.read().await;
        let matches: Vec<Document> = guard
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| query.filter.matches(d) && overlaps_query(d, query))
                    .map(|d| d.project(&query.source_fields))
                    .collect()
            })
            .unwrap_or_default();
        Ok(paginate(matches, offset, query.page_size))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("range_calls", &self.range_calls())
            .finish_non_exhaustive()
    }
}

/// Convenience for building fixture documents in tests and demos.
pub fn doc(id: &str, source: Value) -> Document {
    Document::new(id, source)
}
