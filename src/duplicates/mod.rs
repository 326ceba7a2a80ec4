//! Duplicate detection and resolution.
//!
//! - [`groups`]: first-seen-wins fingerprint table and duplicate groups
//! - [`resolver`]: automatic and interactive keep/discard decisions
//! - [`finder`]: run orchestration on a single worker

pub mod finder;
pub mod groups;
pub mod resolver;

pub use finder::{DuplicateFinder, FinderConfig, FinderError, RunHandle, RunSummary};
pub use groups::{DuplicateGroup, Observation, SeenState, SeenTable};
pub use resolver::{
    validate_selection, Decision, DuplicateCriterion, Resolution, ResolutionMode,
    ResolutionRequest, Resolver, SelectionError, MAX_PROMPT_ATTEMPTS,
};
