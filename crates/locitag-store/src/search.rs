//! Search store interface.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

use locitag_common::{CollectionRef, CoordinateFields, Document, RecordFilter, Result};

/// Opaque position in a paginated result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(pub String);

/// One page of records plus the cursor for the next page (`None` once exhausted).
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Document>,
    pub next: Option<PageCursor>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Coordinate range lookup against one collection.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub collection: CollectionRef,
    pub coordinates: CoordinateFields,
    pub seqid: String,
    pub start: u64,
    pub end: u64,
    pub filter: RecordFilter,
    /// Source fields to return; coordinate fields are always included.
    pub source_fields: Vec<String>,
    pub page_size: usize,
}

impl RangeQuery {
    pub fn new(collection: CollectionRef, coordinates: CoordinateFields, seqid: &str, start: u64, end: u64) -> Self {
        let source_fields = coordinates.source_fields();
        Self {
            collection,
            coordinates,
            seqid: seqid.to_string(),
            start,
            end,
            filter: RecordFilter::default(),
            source_fields,
            page_size: 1000,
        }
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        for f in fields {
            if !self.source_fields.iter().any(|s| s == f) {
                self.source_fields.push(f.to_string());
            }
        }
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Search store trait. Every call is awaited in sequence by the scan driver;
/// transport failures surface as `LocitagError::ResolverUnavailable`.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Fetch one page of records matching `filter`.
    async fn query(
        &self,
        collection: &CollectionRef,
        filter: &RecordFilter,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<Page>;

    /// Batch point lookup. Missing ids are simply absent from the map.
    async fn get_by_ids(
        &self,
        collection: &CollectionRef,
        ids: &BTreeSet<String>,
        fields: &[String],
    ) -> Result<HashMap<String, Document>>;

    /// One page of records whose stored interval intersects the query interval.
    async fn range_query(&self, query: &RangeQuery, cursor: Option<&PageCursor>) -> Result<Page>;
}
