//! Genes lying inside a disease-associated region.
//!
//! The region's span comes from its `build_info` for the configured genome
//! build. Regions indexed without one are located through their disease
//! loci: the loci are fetched by id and their spans unioned.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

use locitag_common::{Document, LocitagError, RecordFilter, Result};
use locitag_store::PageCursor;

use super::{opt_string_or_number, string_or_number, JobContext, NormalizeOutcome, Normalizer};
use crate::evidence::{collect_ids, GeneDiseaseAggregate, NormalizedRecord};
use crate::overlap::{CandidateSource, GenomicSpan};

/// Coordinates of a feature on one genome build.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSpan {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub build: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub seqid: String,
    pub start: u64,
    pub end: u64,
}

impl BuildSpan {
    pub fn span(&self) -> GenomicSpan {
        GenomicSpan::new(&self.seqid, self.start, self.end)
    }
}

/// `build_info` is stored either as one object or as one object per build.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BuildInfo {
    Single(BuildSpan),
    PerBuild(Vec<BuildSpan>),
}

impl BuildInfo {
    /// Span for `build`; an entry without a build number matches any build.
    pub fn span_for_build(&self, build: &str) -> Option<GenomicSpan> {
        let spans: &[BuildSpan] = match self {
            BuildInfo::Single(s) => std::slice::from_ref(s),
            BuildInfo::PerBuild(v) => v,
        };
        spans
            .iter()
            .find(|s| s.build.as_deref() == Some(build))
            .or_else(|| spans.iter().find(|s| s.build.is_none()))
            .map(BuildSpan::span)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionTags {
    #[serde(default)]
    pub disease: Vec<Option<String>>,
}

/// A region document from the regions collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionRecord {
    pub region_id: String,
    pub region_name: String,
    #[serde(default)]
    pub tags: RegionTags,
    #[serde(default)]
    pub build_info: Option<BuildInfo>,
    #[serde(default)]
    pub disease_loci: Vec<String>,
}

impl RegionRecord {
    pub fn diseases(&self) -> BTreeSet<String> {
        collect_ids(self.tags.disease.iter().cloned())
    }

    pub fn span_for_build(&self, build: &str) -> Option<GenomicSpan> {
        self.build_info.as_ref()?.span_for_build(build)
    }
}

/// A disease locus; older loci carry flat `seqid`/`start`/`end` fields.
#[derive(Debug, Clone, Deserialize)]
struct LocusRecord {
    #[serde(default)]
    build_info: Option<BuildInfo>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    seqid: Option<String>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    end: Option<u64>,
}

impl LocusRecord {
    fn span_for_build(&self, build: &str) -> Option<GenomicSpan> {
        if let Some(span) = self.build_info.as_ref().and_then(|b| b.span_for_build(build)) {
            return Some(span);
        }
        Some(GenomicSpan::new(self.seqid.as_deref()?, self.start?, self.end?))
    }
}

/// Resolve the region's span, returning it with the number of missing loci.
pub async fn resolve_region_span(
    region: &RegionRecord,
    record_id: &str,
    ctx: &JobContext<'_>,
) -> Result<(GenomicSpan, usize)> {
    let build = ctx.config.genome_build.as_str();
    if let Some(span) = region.span_for_build(build) {
        return Ok((span, 0));
    }
    if region.disease_loci.is_empty() {
        return Err(LocitagError::record_format(
            record_id,
            format!("no build_info for build {} and no disease loci", build),
        ));
    }

    let ids: BTreeSet<String> = region.disease_loci.iter().cloned().collect();
    let loci = ctx
        .store
        .get_by_ids(&ctx.config.collections.disease_locus, &ids, &[])
        .await?;

    let mut span: Option<GenomicSpan> = None;
    let mut missing = 0;
    for locus_id in &ids {
        let Some(locus_doc) = loci.get(locus_id) else {
            error!(region_id = %region.region_id, locus_id = %locus_id, "disease_locus doc not found");
            missing += 1;
            continue;
        };
        let locus: LocusRecord = locus_doc.parse().map_err(|e| {
            LocitagError::record_format(record_id, format!("disease locus {}: {}", locus_id, e))
        })?;
        let locus_span = locus.span_for_build(build).ok_or_else(|| {
            LocitagError::record_format(record_id, format!("disease locus {} has no span for build {}", locus_id, build))
        })?;
        span = Some(match span {
            None => locus_span,
            Some(acc) => acc.union(&locus_span).ok_or_else(|| {
                LocitagError::record_format(record_id, "disease loci lie on different chromosomes")
            })?,
        });
    }

    match span {
        Some(span) => Ok((span, missing)),
        None => Err(LocitagError::not_found(
            "disease_locus",
            ids.into_iter().collect::<Vec<_>>().join(", "),
        )),
    }
}

/// A region with its span resolved for the configured build, padding applied.
#[derive(Debug, Clone)]
pub struct LocatedRegion {
    pub record: RegionRecord,
    pub span: GenomicSpan,
}

/// Every region of the region collection that has a span on the configured
/// build. Built once per job for gene → region lookups.
#[derive(Debug, Clone, Default)]
pub struct RegionIndex {
    pub regions: Vec<LocatedRegion>,
    /// Disease loci that could not be found while resolving spans.
    pub references_missing: usize,
}

impl RegionIndex {
    /// Regions intersecting `span`, in store order.
    pub fn overlapping<'s>(&'s self, span: &'s GenomicSpan) -> impl Iterator<Item = &'s LocatedRegion> + 's {
        self.regions.iter().filter(move |r| r.span.overlaps(span))
    }
}

/// Page through the region collection and resolve each region's span the
/// same way `gene_in_region` does: the entry for the configured build, else
/// the union of its disease loci.
pub async fn build_region_index(ctx: &JobContext<'_>) -> Result<RegionIndex> {
    let collection = &ctx.config.collections.region;
    let filter = RecordFilter::default();
    let mut index = RegionIndex::default();
    let mut cursor: Option<PageCursor> = None;

    loop {
        let page = ctx.store.query(collection, &filter, ctx.config.page_size, cursor.as_ref()).await?;
        if page.records.is_empty() {
            break;
        }
        for doc in &page.records {
            let record: RegionRecord = match doc.parse() {
                Ok(r) => r,
                Err(e) => {
                    warn!(region = %doc.id, error = %e, "Skipping unparseable region");
                    continue;
                }
            };
            match resolve_region_span(&record, &doc.id, ctx).await {
                Ok((span, missing)) => {
                    index.references_missing += missing;
                    let span = span.padded(ctx.config.region_padding);
                    index.regions.push(LocatedRegion { record, span });
                }
                Err(e @ LocitagError::RecordFormat { .. }) => {
                    debug!(region = %doc.id, error = %e, "Region has no usable span, skipping");
                }
                Err(e @ LocitagError::NotFound { .. }) => {
                    error!(region = %doc.id, error = %e, "Region loci missing, skipping");
                    index.references_missing += 1;
                }
                Err(e) => return Err(e),
            }
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(collection = %collection, regions = index.regions.len(), "Region index built");
    Ok(index)
}

/// `gene_in_region`: genes overlapping the (padded) region get the region's diseases.
#[derive(Debug, Default)]
pub struct GeneInRegion;

#[async_trait]
impl Normalizer for GeneInRegion {
    fn name(&self) -> &'static str {
        "gene_in_region"
    }

    async fn normalize(
        &self,
        doc: &Document,
        ctx: &mut JobContext<'_>,
        aggregate: &mut GeneDiseaseAggregate,
    ) -> Result<NormalizeOutcome> {
        let region: RegionRecord = doc.parse()?;
        let (span, references_missing) = resolve_region_span(&region, &doc.id, ctx).await?;
        let span = span.padded(ctx.config.region_padding);

        let genes = ctx
            .resolver()
            .overlapping_ids(&span, &CandidateSource::genes(ctx.config))
            .await?;
        debug!(region_id = %region.region_id, span = %span, genes = genes.len(), "Region genes resolved");

        let record = NormalizedRecord::new(&region.region_id, &region.region_name, genes, region.diseases());
        Ok(NormalizeOutcome {
            evidence_added: record.merge_into(aggregate),
            references_missing,
        })
    }
}
