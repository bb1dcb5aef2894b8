//! PII detection domain: classification, findings, offset resolution, and
//! the canonical mask region set.
//!
//! The flow through this module mirrors the pipeline: a detector returns
//! semantic [`PiiFinding`]s for a batch of text, [`resolve_offsets`] locates
//! each finding at absolute character offsets, and [`MaskRegionSet`] folds
//! the located ranges into the sorted, non-overlapping list the client and
//! the audit trail both consume.

pub mod detector;
pub mod finding;
pub mod kind;
pub mod mask;
pub mod prompts;
pub mod regions;
pub mod resolve;

pub use detector::{detect_with_timeout, DetectorError, LlmPiiDetector, PiiDetector};
pub use finding::{PiiFinding, ResolvedDetection, DEFAULT_CONFIDENCE};
pub use kind::PiiKind;
pub use mask::mask_text;
pub use regions::{merge_regions, MaskRegion, MaskRegionSet, MergeOutcome};
pub use resolve::resolve_offsets;
