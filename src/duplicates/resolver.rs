//! Keep/discard decisions for duplicate groups.
//!
//! Resolution runs once per [`DuplicateGroup`] after the walk is complete.
//! In automatic mode the original survives and confirmed duplicates are
//! discarded. In interactive mode the worker sends a
//! [`ResolutionRequest`] to the front end and blocks on the request's reply
//! channel until a [`Decision`] arrives.
//!
//! Ambiguity always resolves toward keeping files: a cancelled prompt, a
//! front end that went away, or too many invalid answers leave the whole
//! group in place.

use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};

use serde::{Deserialize, Serialize};

use crate::events::{EngineEvent, EventSender};
use crate::scanner::Fingerprint;

use super::DuplicateGroup;

/// Maximum prompts per group before it is treated as cancelled.
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

/// How groups are resolved.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Keep the original, discard confirmed duplicates.
    #[default]
    Auto,
    /// Ask the front end which members to keep.
    Interactive,
}

/// What besides equal content makes a later file a confirmed duplicate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateCriterion {
    /// Equal fingerprint and equal size.
    #[default]
    ContentAndSize,
    /// Additionally require the file name to match the original byte-for-byte.
    ContentSizeAndName,
}

/// Front end answer to a [`ResolutionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Keep the members at these zero-based indices, discard the rest.
    Keep(Vec<usize>),
    /// Discard every member.
    KeepNone,
    /// Leave the group untouched.
    Cancel,
}

/// A group waiting for a decision.
#[derive(Debug)]
pub struct ResolutionRequest {
    /// Group being decided
    pub group_id: usize,
    /// Shared fingerprint
    pub fingerprint: Fingerprint,
    /// Shared size
    pub size: u64,
    /// Members, original first
    pub paths: Vec<PathBuf>,
    /// 1-based prompt attempt
    pub attempt: usize,
    /// Why the previous answer was rejected
    pub previous_error: Option<String>,
    pub(crate) reply: Sender<Decision>,
}

impl ResolutionRequest {
    /// Answer the request. Returns `false` if the worker is gone.
    pub fn respond(self, decision: Decision) -> bool {
        self.reply.send(decision).is_ok()
    }
}

/// Outcome for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Group this resolves
    pub group_id: usize,
    /// Paths that stay where they are
    pub kept: Vec<PathBuf>,
    /// Paths to move into the holding area
    pub discarded: Vec<PathBuf>,
    /// Nothing will be touched
    pub cancelled: bool,
}

impl Resolution {
    pub(crate) fn untouched(group: &DuplicateGroup) -> Self {
        Self {
            group_id: group.id,
            kept: group.paths(),
            discarded: Vec::new(),
            cancelled: true,
        }
    }

    fn partition(group: &DuplicateGroup, keep: &[usize]) -> Self {
        let (kept, discarded) = group
            .files
            .iter()
            .enumerate()
            .fold((Vec::new(), Vec::new()), |(mut k, mut d), (i, f)| {
                if keep.contains(&i) {
                    k.push(f.path.clone());
                } else {
                    d.push(f.path.clone());
                }
                (k, d)
            });
        Self {
            group_id: group.id,
            kept,
            discarded,
            cancelled: false,
        }
    }

    /// Every member is discarded.
    #[must_use]
    pub fn is_keep_none(&self) -> bool {
        !self.cancelled && self.kept.is_empty()
    }
}

/// Why a selection was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// No indices were given.
    #[error("no files selected")]
    Empty,
    /// An index points past the end of the group.
    #[error("index {index} is out of range for a group of {len}")]
    OutOfRange {
        /// Offending index
        index: usize,
        /// Group size
        len: usize,
    },
}

/// Check and normalize a keep selection: sorted, without repeats.
///
/// # Errors
///
/// Returns [`SelectionError`] for an empty selection or an index `>= len`.
pub fn validate_selection(indices: &[usize], len: usize) -> Result<Vec<usize>, SelectionError> {
    if indices.is_empty() {
        return Err(SelectionError::Empty);
    }
    if let Some(&index) = indices.iter().find(|&&i| i >= len) {
        return Err(SelectionError::OutOfRange { index, len });
    }
    let mut selection = indices.to_vec();
    selection.sort_unstable();
    selection.dedup();
    Ok(selection)
}

/// Decides each group's survivors.
#[derive(Debug, Clone)]
pub struct Resolver {
    mode: ResolutionMode,
    criterion: DuplicateCriterion,
    events: EventSender,
}

impl Resolver {
    /// Create a resolver; interactive requests go out on `events`.
    #[must_use]
    pub fn new(mode: ResolutionMode, criterion: DuplicateCriterion, events: EventSender) -> Self {
        Self {
            mode,
            criterion,
            events,
        }
    }

    /// Resolve one group.
    #[must_use]
    pub fn resolve(&self, group: &DuplicateGroup) -> Resolution {
        match self.mode {
            ResolutionMode::Auto => self.resolve_automatic(group),
            ResolutionMode::Interactive => self.resolve_interactive(group),
        }
    }

    fn resolve_automatic(&self, group: &DuplicateGroup) -> Resolution {
        let original_name = group.original().path.file_name();
        let keep: Vec<usize> = std::iter::once(0)
            .chain((1..group.len()).filter(|&i| match self.criterion {
                DuplicateCriterion::ContentAndSize => false,
                DuplicateCriterion::ContentSizeAndName => {
                    group.files[i].path.file_name() != original_name
                }
            }))
            .collect();
        Resolution::partition(group, &keep)
    }

    fn resolve_interactive(&self, group: &DuplicateGroup) -> Resolution {
        let mut previous_error = None;

        for attempt in 1..=MAX_PROMPT_ATTEMPTS {
            let (reply, answers) = mpsc::channel();
            let request = ResolutionRequest {
                group_id: group.id,
                fingerprint: group.fingerprint.clone(),
                size: group.size,
                paths: group.paths(),
                attempt,
                previous_error: previous_error.take(),
                reply,
            };
            if !self.events.send(EngineEvent::DuplicateGroupFound(request)) {
                log::warn!("No front end to resolve group {}; leaving it untouched", group.id);
                return Resolution::untouched(group);
            }

            match answers.recv() {
                Ok(Decision::Keep(indices)) => match validate_selection(&indices, group.len()) {
                    Ok(selection) => return Resolution::partition(group, &selection),
                    Err(e) => {
                        log::debug!("Group {} attempt {}: {}", group.id, attempt, e);
                        previous_error = Some(e.to_string());
                    }
                },
                Ok(Decision::KeepNone) => return Resolution::partition(group, &[]),
                Ok(Decision::Cancel) => {
                    log::info!("Group {} skipped by user", group.id);
                    return Resolution::untouched(group);
                }
                Err(_) => {
                    log::info!("Group {} prompt dismissed", group.id);
                    return Resolution::untouched(group);
                }
            }
        }

        log::warn!(
            "Group {} left untouched after {} invalid answers",
            group.id,
            MAX_PROMPT_ATTEMPTS
        );
        Resolution::untouched(group)
    }
}
