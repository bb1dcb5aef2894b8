//! Canonical mask region list and the interval merge that maintains it.
//!
//! Detection results arrive out of order, from any number of concurrent
//! batches, and may overlap or duplicate each other. The client applies the
//! same coalescing rule to the events it receives, so the protocol stays
//! correct under any arrival order. The invariant held after every mutation:
//! regions sorted ascending by start, no two regions overlapping or touching,
//! `original_length == end_offset - start_offset`.

use serde::{Deserialize, Serialize};

use super::finding::ResolvedDetection;
use super::kind::PiiKind;

/// One masked character range, as emitted to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskRegion {
    /// Absolute character offset where the mask starts (0-indexed).
    pub start_offset: usize,
    /// Absolute character offset one past the mask end (exclusive).
    pub end_offset: usize,
    #[serde(rename = "piiType")]
    pub kind: PiiKind,
    /// Span length of the masked range.
    pub original_length: usize,
}

impl MaskRegion {
    pub fn new(start_offset: usize, end_offset: usize, kind: PiiKind) -> Self {
        Self {
            start_offset,
            end_offset,
            kind,
            original_length: end_offset.saturating_sub(start_offset),
        }
    }

    pub fn from_detection(detection: &ResolvedDetection) -> Self {
        Self::new(detection.start_offset, detection.end_offset, detection.kind)
    }
}

/// Result of inserting one region into the canonical set.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The insert was already covered; the canonical list did not change.
    Unchanged,
    /// The canonical region now covering the inserted range, new or widened.
    Updated(MaskRegion),
}

/// The live, authoritative set of mask regions for one message.
///
/// Mutated only through [`insert`](MaskRegionSet::insert); every mutation
/// re-establishes the sorted non-overlapping invariant. Inserting a region
/// that is already fully covered is a no-op, which makes the operation
/// idempotent and safe to replay.
#[derive(Debug, Clone, Default)]
pub struct MaskRegionSet {
    regions: Vec<MaskRegion>,
}

impl MaskRegionSet {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn as_slice(&self) -> &[MaskRegion] {
        &self.regions
    }

    pub fn into_vec(self) -> Vec<MaskRegion> {
        self.regions
    }

    /// Insert one region and re-canonicalize.
    ///
    /// Returns the canonical region covering the inserted range when the
    /// list changed, [`MergeOutcome::Unchanged`] otherwise. Emission policy
    /// upstream is to send an event only on change.
    pub fn insert(&mut self, region: MaskRegion) -> MergeOutcome {
        let before = self.regions.clone();
        self.regions.push(region.clone());
        self.regions = merge_regions(std::mem::take(&mut self.regions));

        let covering = self
            .regions
            .iter()
            .find(|r| r.start_offset <= region.start_offset && r.end_offset >= region.end_offset)
            .cloned();

        match covering {
            Some(c) if before.contains(&c) => MergeOutcome::Unchanged,
            Some(c) => MergeOutcome::Updated(c),
            // Unreachable: the merged list always covers every input range.
            None => MergeOutcome::Unchanged,
        }
    }

    pub fn insert_detection(&mut self, detection: &ResolvedDetection) -> MergeOutcome {
        self.insert(MaskRegion::from_detection(detection))
    }
}

/// Pure form of the coalescing rule, shared with the client-side contract.
///
/// Sort ascending by start, then sweep left to right merging the accumulator
/// into the next region whenever the next start is at or before the
/// accumulator's end (touching counts). The merged span keeps the
/// earliest-starting contributor's kind and recomputes `original_length`.
pub fn merge_regions(mut regions: Vec<MaskRegion>) -> Vec<MaskRegion> {
    if regions.len() <= 1 {
        if let Some(r) = regions.first_mut() {
            r.original_length = r.end_offset.saturating_sub(r.start_offset);
        }
        return regions;
    }

    // Tie-break on (end, kind) so the final list is identical for every
    // insertion order, not just sorted by start.
    regions.sort_by_key(|r| (r.start_offset, r.end_offset, r.kind.as_str()));

    let mut result: Vec<MaskRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        match result.last_mut() {
            Some(last) if region.start_offset <= last.end_offset => {
                last.end_offset = last.end_offset.max(region.end_offset);
                last.original_length = last.end_offset.saturating_sub(last.start_offset);
            }
            _ => {
                let mut region = region;
                region.original_length = region.end_offset.saturating_sub(region.start_offset);
                result.push(region);
            }
        }
    }
    result
}
