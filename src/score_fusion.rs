//! Verification score fusion and candidate-list fusion.
//!
//! Both operations share one discipline: a raw score from slot `i` is first
//! calibrated with the `i`-th algorithm profile of the loaded scheme, and the
//! calibrated values available for one comparison are combined with the
//! scheme rule. Missing values (non-finite sentinels, or an identity absent
//! from a list) are left out of the combination instead of counting as zero.

use crate::error::FusionError;
use crate::scheme::{CombineRule, FusionScheme};
use crate::types::{Candidate, CandidateList};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Floor applied before taking logarithms in the geometric rule.
const GEOMETRIC_EPSILON: f64 = 1e-9;

/// Score and candidate-list fuser bound to one loaded scheme.
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    scheme: FusionScheme,
}

impl ScoreFusion {
    /// Binds a scheme, rejecting combination rules it cannot rank with.
    pub fn new(scheme: FusionScheme) -> Result<Self, FusionError> {
        scheme.validate_for_scores()?;
        Ok(Self { scheme })
    }

    pub fn scheme(&self) -> &FusionScheme {
        &self.scheme
    }

    /// Fuses K >= 2 verification scores for the same comparison, in slot order.
    pub fn fuse_scores(&self, input_scores: &[f64]) -> Result<f64, FusionError> {
        self.check_input_count(input_scores.len(), "scores")?;

        let present: Vec<(usize, f64)> = input_scores
            .iter()
            .enumerate()
            .filter(|(_, score)| score.is_finite())
            .map(|(slot, score)| (slot, self.scheme.calibration(slot).apply(*score)))
            .collect();

        if present.is_empty() {
            return Err(FusionError::VerifTemplate(format!(
                "all {} scores come from failed extractions",
                input_scores.len()
            )));
        }

        let fused = self.combine(&present);
        trace!("fused {:?} -> {}", input_scores, fused);
        Ok(fused)
    }

    /// Merges K >= 2 ranked lists of equal length L into one list of length
    /// between L and 2L.
    ///
    /// Ordering is fused score descending, then best original rank, then
    /// identity. An identity that appears in every input list is never
    /// dropped by the 2L cap. When all of its scores failed it is kept with
    /// a score of negative infinity and ranks last.
    pub fn fuse_lists(&self, input_lists: &[CandidateList]) -> Result<CandidateList, FusionError> {
        self.check_input_count(input_lists.len(), "candidate lists")?;

        let list_len = input_lists[0].len();
        if let Some((index, list)) = input_lists
            .iter()
            .enumerate()
            .find(|(_, list)| list.len() != list_len)
        {
            return Err(FusionError::NonCongruentVectors(format!(
                "candidate list {index} has {} entries, list 0 has {list_len}",
                list.len()
            )));
        }

        if list_len == 0 {
            return Ok(vec![]);
        }

        let merged = merge_union(input_lists, &self.scheme);
        let total = merged.len();
        let usable = merged.iter().filter(|entry| !entry.scores.is_empty()).count();
        if usable == 0 {
            return Err(FusionError::VerifTemplate(
                "every candidate score comes from a failed search".to_string(),
            ));
        }

        let mut fused: Vec<FusedEntry> = merged
            .into_iter()
            .filter_map(|entry| {
                let consensus = entry.lists_seen == input_lists.len();
                let score = if entry.scores.is_empty() {
                    if !consensus {
                        return None;
                    }
                    f64::NEG_INFINITY
                } else {
                    self.combine(&entry.scores)
                };
                Some(FusedEntry {
                    identity: entry.identity,
                    score,
                    best_rank: entry.best_rank,
                    consensus,
                })
            })
            .collect();

        if fused.len() < list_len {
            return Err(FusionError::Parse(format!(
                "only {} usable identities across lists of length {list_len} ({total} seen)",
                fused.len()
            )));
        }

        let cap = list_len * 2;
        if fused.len() > cap {
            fused = cap_keeping_consensus(fused, cap);
        }
        fused.sort_by(FusedEntry::rank_order);

        debug!(
            "fused {} lists of length {} into {} candidates",
            input_lists.len(),
            list_len,
            fused.len()
        );

        Ok(fused
            .into_iter()
            .map(|entry| Candidate::new(entry.identity, entry.score))
            .collect())
    }

    fn check_input_count(&self, count: usize, what: &str) -> Result<(), FusionError> {
        if count < 2 {
            return Err(FusionError::NumData(format!(
                "fusion needs at least 2 {what}, got {count}"
            )));
        }
        match self.scheme.slot_count() {
            Some(slots) if slots != count => Err(FusionError::NumData(format!(
                "scheme `{}` fuses {slots} algorithms, got {count} {what}",
                self.scheme.name
            ))),
            _ => Ok(()),
        }
    }

    /// Combines calibrated `(slot, value)` pairs. `present` is never empty.
    fn combine(&self, present: &[(usize, f64)]) -> f64 {
        match self.scheme.rule {
            CombineRule::Mean => {
                let (weighted, total) = present.iter().fold((0.0, 0.0), |(sum, total), (slot, v)| {
                    let w = self.scheme.weight(*slot);
                    (sum + w * v, total + w)
                });
                weighted / total
            }
            CombineRule::Max => present
                .iter()
                .map(|(_, v)| *v)
                .fold(f64::NEG_INFINITY, f64::max),
            CombineRule::Geometric => {
                let (weighted, total) = present.iter().fold((0.0, 0.0), |(sum, total), (slot, v)| {
                    let w = self.scheme.weight(*slot);
                    (sum + w * v.max(GEOMETRIC_EPSILON).ln(), total + w)
                });
                (weighted / total).exp()
            }
        }
    }
}

struct MergedIdentity {
    identity: u32,
    best_rank: usize,
    lists_seen: usize,
    last_slot: Option<usize>,
    scores: Vec<(usize, f64)>,
}

struct FusedEntry {
    identity: u32,
    score: f64,
    best_rank: usize,
    consensus: bool,
}

impl FusedEntry {
    fn rank_order(a: &FusedEntry, b: &FusedEntry) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then(a.best_rank.cmp(&b.best_rank))
            .then(a.identity.cmp(&b.identity))
    }
}

/// Builds the identity union in first-seen order. A repeated identity within
/// one list keeps only its best-ranked occurrence.
fn merge_union(input_lists: &[CandidateList], scheme: &FusionScheme) -> Vec<MergedIdentity> {
    let capacity = input_lists.iter().map(Vec::len).sum();
    let mut index: HashMap<u32, usize> = HashMap::with_capacity(capacity);
    let mut merged: Vec<MergedIdentity> = Vec::with_capacity(capacity);

    for (slot, list) in input_lists.iter().enumerate() {
        let calibration = scheme.calibration(slot);

        for (rank, candidate) in list.iter().enumerate() {
            let position = *index.entry(candidate.identity).or_insert_with(|| {
                merged.push(MergedIdentity {
                    identity: candidate.identity,
                    best_rank: rank,
                    lists_seen: 0,
                    last_slot: None,
                    scores: Vec::with_capacity(input_lists.len()),
                });
                merged.len() - 1
            });
            let entry = &mut merged[position];

            if entry.last_slot == Some(slot) {
                continue;
            }
            entry.last_slot = Some(slot);
            entry.lists_seen += 1;
            entry.best_rank = entry.best_rank.min(rank);

            if candidate.score.is_finite() {
                entry.scores.push((slot, calibration.apply(candidate.score)));
            }
        }
    }

    merged
}

/// Keeps every consensus identity, then fills up to `cap` with the best of the rest.
fn cap_keeping_consensus(fused: Vec<FusedEntry>, cap: usize) -> Vec<FusedEntry> {
    let (mut kept, mut rest): (Vec<FusedEntry>, Vec<FusedEntry>) =
        fused.into_iter().partition(|entry| entry.consensus);

    rest.sort_by(FusedEntry::rank_order);
    let room = cap.saturating_sub(kept.len());
    kept.extend(rest.into_iter().take(room));
    kept
}
