//! Gallery storage and top-M retrieval.
//!
//! Enrolled templates are kept unit-normalized in one contiguous row buffer,
//! so the similarity to a normalized probe is a plain dot product. Two index
//! variants share that storage: a single-threaded linear scan and a sharded
//! scan that splits rows across scoped worker threads for large galleries.
//! Both return identical ranked output for the same gallery and probe.

use crate::error::FusionError;
use crate::template_fusion::{dot, TemplateFusion};
use crate::types::{is_failed_template, Candidate, CandidateList, Template};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZeroUsize;
use std::ops::Range;
use tracing::{debug, warn};

/// Built gallery supporting top-M similarity retrieval.
pub trait GalleryIndex: Send + Sync {
    /// Number of searchable entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `limit` best entries for a unit-normalized probe, ordered by
    /// score descending, then identity ascending, then enrollment order.
    fn top_matches(&self, probe: &[f64], limit: usize) -> Result<CandidateList, FusionError>;
}

/// Normalized enrollment rows and their identities.
#[derive(Debug, Clone)]
pub struct GalleryRows {
    dim: usize,
    ids: Vec<u32>,
    rows: Vec<f64>,
}

impl GalleryRows {
    /// Validates and normalizes `templates`, pairing `templates[i]` with `ids[i]`.
    ///
    /// Failed enrollments (empty or all-zero templates) are skipped. Any other
    /// malformed template fails the whole build.
    pub fn build(
        fusion: &TemplateFusion,
        templates: &[Template],
        ids: &[u32],
    ) -> Result<Self, FusionError> {
        if templates.len() != ids.len() {
            return Err(FusionError::NonCongruentVectors(format!(
                "{} templates but {} identities",
                templates.len(),
                ids.len()
            )));
        }

        let dim = fusion.fused_dim();
        let mut rows = Vec::new();
        rows.try_reserve_exact(templates.len().saturating_mul(dim)).map_err(|e| {
            FusionError::Memory(format!("cannot allocate gallery of {} rows: {e}", templates.len()))
        })?;
        let mut kept_ids = Vec::with_capacity(ids.len());
        let mut skipped = 0usize;

        for (position, (template, id)) in templates.iter().zip(ids).enumerate() {
            if is_failed_template(template) {
                skipped += 1;
                continue;
            }
            let normalized = fusion
                .normalized_fused(template, "gallery")
                .map_err(|e| match e {
                    FusionError::TemplateFormat(info) => {
                        FusionError::TemplateFormat(format!("entry {position}: {info}"))
                    }
                    other => other,
                })?;
            rows.extend_from_slice(&normalized);
            kept_ids.push(*id);
        }

        if skipped > 0 {
            warn!(
                "{} gallery templates came from failed extractions and were not enrolled",
                skipped
            );
        }

        Ok(Self { dim, ids: kept_ids, rows })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn scan(&self, probe: &[f64], range: Range<usize>, limit: usize) -> TopMatches {
        let mut top = TopMatches::new(limit);
        for entry in range {
            let row = &self.rows[entry * self.dim..(entry + 1) * self.dim];
            top.offer(Ranked { score: dot(row, probe), identity: self.ids[entry], entry });
        }
        top
    }
}

/// Exact single-threaded scan.
#[derive(Debug, Clone)]
pub struct LinearGallery {
    rows: GalleryRows,
}

impl LinearGallery {
    pub fn new(rows: GalleryRows) -> Self {
        Self { rows }
    }
}

impl GalleryIndex for LinearGallery {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn top_matches(&self, probe: &[f64], limit: usize) -> Result<CandidateList, FusionError> {
        Ok(self.rows.scan(probe, 0..self.rows.len(), limit).into_candidates())
    }
}

/// Exact scan split into contiguous shards, each scanned on a scoped thread.
///
/// Galleries smaller than `parallel_threshold` are scanned inline.
#[derive(Debug, Clone)]
pub struct ShardedGallery {
    rows: GalleryRows,
    shards: NonZeroUsize,
    parallel_threshold: usize,
}

impl ShardedGallery {
    pub fn new(rows: GalleryRows, shards: NonZeroUsize, parallel_threshold: usize) -> Self {
        debug!(
            "sharded gallery: {} entries, {} shards, parallel from {} entries",
            rows.len(),
            shards,
            parallel_threshold
        );
        Self { rows, shards, parallel_threshold }
    }

    fn shard_ranges(&self) -> Vec<Range<usize>> {
        let total = self.rows.len();
        let per_shard = total.div_ceil(self.shards.get()).max(1);
        (0..total)
            .step_by(per_shard)
            .map(|start| start..(start + per_shard).min(total))
            .collect()
    }
}

impl GalleryIndex for ShardedGallery {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn top_matches(&self, probe: &[f64], limit: usize) -> Result<CandidateList, FusionError> {
        let total = self.rows.len();
        if total < self.parallel_threshold || self.shards.get() == 1 {
            return Ok(self.rows.scan(probe, 0..total, limit).into_candidates());
        }

        let rows = &self.rows;
        let ranges = self.shard_ranges();
        let partials = crossbeam::scope(|scope| {
            let handles: Vec<_> = ranges
                .into_iter()
                .map(|range| scope.spawn(move |_| rows.scan(probe, range, limit)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|_| FusionError::Vendor("gallery scan worker panicked".to_string()))?
        .map_err(|_| FusionError::Vendor("gallery scan worker panicked".to_string()))?;

        let mut merged = TopMatches::new(limit);
        for partial in partials {
            for ranked in partial.heap {
                merged.offer(ranked);
            }
        }
        Ok(merged.into_candidates())
    }
}

/// A scored gallery entry. Orders "better first": a `Ranked` that compares
/// `Less` ranks ahead of one that compares `Greater`.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f64,
    identity: u32,
    entry: usize,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.identity.cmp(&other.identity))
            .then(self.entry.cmp(&other.entry))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Bounded selection of the best `limit` entries. The heap top is the worst
/// entry currently retained.
struct TopMatches {
    limit: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopMatches {
    fn new(limit: usize) -> Self {
        Self { limit, heap: BinaryHeap::with_capacity(limit.saturating_add(1).min(1 << 16)) }
    }

    fn offer(&mut self, ranked: Ranked) {
        if self.limit == 0 {
            return;
        }
        if self.heap.len() < self.limit {
            self.heap.push(ranked);
        } else if let Some(worst) = self.heap.peek() {
            if ranked < *worst {
                self.heap.pop();
                self.heap.push(ranked);
            }
        }
    }

    fn into_candidates(self) -> CandidateList {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|ranked| Candidate::new(ranked.identity, ranked.score))
            .collect()
    }
}
