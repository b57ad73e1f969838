//! Per-upload session state tracking
//!
//! A [`SyncSession`] is created for each `apply` call and records, per
//! selected parameter, where it is in the upload lifecycle:
//!
//! ```text
//! Flagged -> Writing -> Confirmed
//!                    -> Failed
//! Flagged -> Skipped            (cancellation)
//! Flagged -> Failed             (batch aborted by connection loss)
//! ```
//!
//! `Confirmed`, `Failed`, and `Skipped` are terminal for the session; a new
//! session always starts from a fresh diff.

use crate::param::{requires_reboot, ParamValue};

use super::{FailedParam, SyncResult};

/// Upload lifecycle state for one parameter within a session.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    /// Selected for upload, not yet attempted
    Flagged,
    /// Write in flight
    Writing,
    /// Verified on the flight controller; carries the value read back
    Confirmed(ParamValue),
    /// Gave up on this parameter
    Failed {
        reason: String,
        /// Last value the flight controller reported, if any was observed
        last_observed: Option<ParamValue>,
    },
    /// Never attempted (run was cancelled)
    Skipped,
}

impl UploadState {
    fn is_terminal(&self) -> bool {
        !matches!(self, UploadState::Flagged | UploadState::Writing)
    }
}

/// One selected parameter within a session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub name: String,
    /// Value to upload
    pub target: ParamValue,
    /// Whether confirming this parameter obligates a reboot
    pub needs_reboot: bool,
    pub state: UploadState,
}

/// Transient record of one upload action.
#[derive(Debug, Default)]
pub struct SyncSession {
    entries: Vec<SessionEntry>,
}

impl SyncSession {
    /// Build a session from the flagged `(name, target)` pairs, in upload
    /// order. Reboot classification happens here, once per session.
    pub fn new(flagged: impl IntoIterator<Item = (String, ParamValue)>) -> Self {
        let entries = flagged
            .into_iter()
            .map(|(name, target)| SessionEntry {
                needs_reboot: requires_reboot(&name),
                name,
                target,
                state: UploadState::Flagged,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> &SessionEntry {
        &self.entries[idx]
    }

    /// Mark the write attempt for entry `idx` as started.
    pub fn begin_write(&mut self, idx: usize) {
        debug_assert!(!self.entries[idx].state.is_terminal());
        self.entries[idx].state = UploadState::Writing;
    }

    /// Terminal: the flight controller verified this value.
    pub fn confirm(&mut self, idx: usize, observed: ParamValue) {
        debug_assert!(!self.entries[idx].state.is_terminal());
        self.entries[idx].state = UploadState::Confirmed(observed);
    }

    /// Terminal: gave up on this parameter.
    pub fn fail(&mut self, idx: usize, reason: impl Into<String>, last_observed: Option<ParamValue>) {
        debug_assert!(!self.entries[idx].state.is_terminal());
        self.entries[idx].state = UploadState::Failed {
            reason: reason.into(),
            last_observed,
        };
    }

    /// Fail every non-terminal entry (connection loss mid-batch).
    pub fn fail_remaining(&mut self, reason: &str) {
        for entry in &mut self.entries {
            if !entry.state.is_terminal() {
                entry.state = UploadState::Failed {
                    reason: reason.to_string(),
                    last_observed: None,
                };
            }
        }
    }

    /// Skip every not-yet-attempted entry (cancellation).
    pub fn skip_remaining(&mut self) {
        for entry in &mut self.entries {
            if !entry.state.is_terminal() {
                entry.state = UploadState::Skipped;
            }
        }
    }

    /// Whether any confirmed parameter obligates a reboot.
    pub fn reboot_obligated(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.needs_reboot && matches!(e.state, UploadState::Confirmed(_)))
    }

    /// Collapse the session into the caller-facing result.
    pub fn into_result(self, rebooted: bool, reboot_confirmed: bool) -> SyncResult {
        let mut result = SyncResult {
            rebooted,
            reboot_confirmed,
            ..SyncResult::default()
        };
        for entry in self.entries {
            match entry.state {
                UploadState::Confirmed(value) => result.confirmed.push((entry.name, value)),
                UploadState::Failed {
                    reason,
                    last_observed,
                } => result.failed.push(FailedParam {
                    name: entry.name,
                    reason,
                    last_observed,
                }),
                UploadState::Skipped => result.skipped.push(entry.name),
                // A batch never ends with writes still in flight
                UploadState::Flagged | UploadState::Writing => result.skipped.push(entry.name),
            }
        }
        result
    }
}
