//! Coordinate overlap resolution.
//!
//! Finds the features of a collection (genes) whose stored interval
//! intersects a query span. The store does the coarse range lookup; every
//! candidate is re-checked here so a loose store can never leak a
//! cross-chromosome or non-intersecting hit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, instrument};

use locitag_common::{CollectionRef, CoordinateFields, CriteriaConfig, Document, RecordFilter, Result};
use locitag_store::{PageCursor, RangeQuery, SearchStore};

/// Closed, chromosome-scoped interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicSpan {
    pub seqid: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicSpan {
    pub fn new(seqid: &str, start: u64, end: u64) -> Self {
        Self { seqid: seqid.to_string(), start, end }
    }

    /// Same seqid and `self.start <= other.end && self.end >= other.start`.
    pub fn overlaps(&self, other: &GenomicSpan) -> bool {
        self.seqid == other.seqid && self.start <= other.end && self.end >= other.start
    }

    /// Widen by `padding` bases on both sides. Coordinates are 1-based, so a
    /// padded start never drops below 1; a zero padding leaves the span as is.
    pub fn padded(&self, padding: u64) -> Self {
        if padding == 0 {
            return self.clone();
        }
        Self {
            seqid: self.seqid.clone(),
            start: self.start.saturating_sub(padding).max(1),
            end: self.end.saturating_add(padding),
        }
    }

    /// Smallest span covering both, or `None` across chromosomes.
    pub fn union(&self, other: &GenomicSpan) -> Option<Self> {
        (self.seqid == other.seqid).then(|| Self {
            seqid: self.seqid.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }

    /// Read a span from a document using the collection's coordinate fields.
    pub fn from_document(doc: &Document, fields: &CoordinateFields) -> Option<Self> {
        Some(Self {
            seqid: doc.field_str(&fields.seqid_field)?,
            start: doc.field_u64(&fields.start_field)?,
            end: doc.field_u64(&fields.end_field)?,
        })
    }
}

impl fmt::Display for GenomicSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.seqid, self.start, self.end)
    }
}

/// A feature returned by the resolver, with the document it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRef {
    pub id: String,
    pub span: GenomicSpan,
    pub document: Document,
}

/// The collection to search and how to read coordinates out of it.
#[derive(Debug, Clone)]
pub struct CandidateSource {
    pub collection: CollectionRef,
    pub coordinates: CoordinateFields,
    pub filter: RecordFilter,
    pub fields: Vec<String>,
}

impl CandidateSource {
    /// Genes, read from the configured gene collection.
    pub fn genes(config: &CriteriaConfig) -> Self {
        Self {
            collection: config.collections.gene.clone(),
            coordinates: config.coordinates.gene.clone(),
            filter: RecordFilter::default(),
            fields: Vec::new(),
        }
    }
}

/// Overlap lookups against a [`SearchStore`].
pub struct OverlapResolver<'a> {
    store: &'a dyn SearchStore,
    page_size: usize,
}

impl<'a> OverlapResolver<'a> {
    pub fn new(store: &'a dyn SearchStore, page_size: usize) -> Self {
        Self { store, page_size: page_size.max(1) }
    }

    /// All features of `source` intersecting `span`, in store order.
    ///
    /// Pages through the store until it reports the end, so no result cap
    /// applies. Zero overlaps is an empty vec, not an error.
    #[instrument(skip_all, fields(collection = %source.collection, span = %span))]
    pub async fn find_overlaps(&self, span: &GenomicSpan, source: &CandidateSource) -> Result<Vec<FeatureRef>> {
        let query = RangeQuery::new(
            source.collection.clone(),
            source.coordinates.clone(),
            &span.seqid,
            span.start,
            span.end,
        )
        .with_filter(source.filter.clone())
        .with_fields(&source.fields.iter().map(String::as_str).collect::<Vec<_>>())
        .with_page_size(self.page_size);

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self.store.range_query(&query, cursor.as_ref()).await?;
            let exhausted = page.records.is_empty() || page.is_last();

            for doc in page.records {
                let Some(candidate) = GenomicSpan::from_document(&doc, &source.coordinates) else {
                    debug!(id = %doc.id, "Candidate without usable coordinates, skipping");
                    continue;
                };
                if !candidate.overlaps(span) {
                    debug!(id = %doc.id, candidate = %candidate, "Store returned non-overlapping candidate");
                    continue;
                }
                if seen.insert(doc.id.clone()) {
                    found.push(FeatureRef { id: doc.id.clone(), span: candidate, document: doc });
                }
            }

            if exhausted {
                break;
            }
            cursor = page.next;
        }

        debug!(n = found.len(), "Overlap lookup complete");
        Ok(found)
    }

    /// Identifiers of the overlapping features.
    pub async fn overlapping_ids(&self, span: &GenomicSpan, source: &CandidateSource) -> Result<BTreeSet<String>> {
        Ok(self
            .find_overlaps(span, source)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect())
    }
}
