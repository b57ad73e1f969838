//! Parameter synchronization engine
//!
//! Orchestrates one upload action: snapshot the flight controller's
//! parameters, confirm flagged parameters that already match, write the rest
//! one at a time with read-back verification and bounded retry, fold
//! connection loss into per-parameter outcomes, and sequence the reboot that
//! some parameters require.
//!
//! The engine is synchronous and expects to run on a caller-owned worker
//! thread; it owns the connection exclusively for the duration of
//! [`SyncEngine::apply`] and reports intermediate state only through the
//! progress callback.

pub mod config;
pub mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::file::ParameterFile;
use crate::param::{ParamFlags, ParamValue, Tolerance};
use crate::transport::FlightController;

pub use config::SyncConfig;
pub use session::{SessionEntry, SyncSession, UploadState};

/// Failure reason used when the link drops mid-batch.
const CONNECTION_LOST: &str = "connection lost";

/// The only error `apply` raises; everything else becomes an outcome in
/// [`SyncResult`].
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(
        "parameter {0} is recorded as present on the flight controller, \
         but the connected flight controller does not report it"
    )]
    IncompatibleFile(String),
}

/// Cooperative cancellation flag, checked between parameters (never
/// mid-write). Clone it into the UI side and call [`CancelToken::cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the running `apply`.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A parameter the engine gave up on.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedParam {
    pub name: String,
    pub reason: String,
    /// Last value the flight controller reported, for manual retry
    pub last_observed: Option<ParamValue>,
}

/// Outcome of one `apply` call.
#[derive(Debug, Default)]
pub struct SyncResult {
    /// Verified on the flight controller, with the value read back
    pub confirmed: Vec<(String, ParamValue)>,
    /// Gave up after retries, or aborted by connection loss
    pub failed: Vec<FailedParam>,
    /// Never attempted (cancelled)
    pub skipped: Vec<String>,
    /// Whether a reboot command was issued
    pub rebooted: bool,
    /// Whether the heartbeat resumed within the reboot timeout. When false
    /// after a reboot, the user must verify the reconnection manually.
    pub reboot_confirmed: bool,
}

impl SyncResult {
    /// Every flagged parameter was confirmed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Progress notification, invoked once per parameter after its outcome is
/// final.
#[derive(Debug)]
pub struct ProgressEvent<'a> {
    pub name: &'a str,
    /// 0-based position within this session
    pub index: usize,
    pub total: usize,
    pub state: &'a UploadState,
}

/// A flagged parameter lifted out of the file before the batch starts.
struct FlaggedParam {
    name: String,
    target: ParamValue,
    exists_on_fc: bool,
    read_only: bool,
}

/// Result of one write-verify-retry cycle.
enum WriteOutcome {
    Confirmed(ParamValue),
    Failed {
        reason: String,
        last_observed: Option<ParamValue>,
    },
    ConnectionLost,
}

/// The parameter synchronization engine.
pub struct SyncEngine {
    config: SyncConfig,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Make the flight controller match `file`'s flagged parameters.
    ///
    /// Parameters not flagged for upload are never written. Confirmed
    /// parameters have their last known value in `file` updated to the value
    /// the flight controller read back; nothing is written to disk.
    ///
    /// Raises only [`ApplyError::IncompatibleFile`]; every transport failure
    /// is folded into the returned [`SyncResult`].
    pub fn apply(
        &self,
        file: &mut ParameterFile,
        fc: &mut dyn FlightController,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(ProgressEvent<'_>),
    ) -> Result<SyncResult, ApplyError> {
        let flagged: Vec<FlaggedParam> = file
            .flagged()
            .iter()
            .map(|p| FlaggedParam {
                name: p.name.clone(),
                target: p.target_value().clone(),
                exists_on_fc: p.exists_on_fc,
                read_only: p.flags.contains(ParamFlags::READ_ONLY),
            })
            .collect();
        if flagged.is_empty() {
            debug!("nothing flagged for upload");
            return Ok(SyncResult::default());
        }

        let tol = self.config.tolerance();
        let total = flagged.len();

        // Full snapshot up front: catches incompatible files before any
        // write, and lets already-matching parameters confirm without
        // traffic.
        let snapshot = match fc.read_all_params() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "parameter download failed before any write");
                let reason = if e.is_connection_loss() {
                    CONNECTION_LOST.to_string()
                } else {
                    e.to_string()
                };
                let mut session =
                    SyncSession::new(flagged.into_iter().map(|p| (p.name, p.target)));
                session.fail_remaining(&reason);
                emit_from(&session, 0, total, &mut on_progress);
                return Ok(session.into_result(false, false));
            }
        };

        for p in &flagged {
            if p.exists_on_fc && !snapshot.contains_key(&p.name) {
                return Err(ApplyError::IncompatibleFile(p.name.clone()));
            }
        }

        let read_only: Vec<bool> = flagged.iter().map(|p| p.read_only).collect();
        let mut session = SyncSession::new(flagged.into_iter().map(|p| (p.name, p.target)));
        info!(count = total, "starting parameter upload");

        let mut cancelled = false;
        for idx in 0..total {
            if cancel.is_cancelled() {
                info!(remaining = total - idx, "upload cancelled");
                session.skip_remaining();
                emit_from(&session, idx, total, &mut on_progress);
                cancelled = true;
                break;
            }

            let name = session.entry(idx).name.clone();
            let target = session.entry(idx).target.clone();

            if read_only[idx] {
                warn!(%name, "flagged parameter is read-only, not writing");
                session.fail(
                    idx,
                    "parameter is read-only on the flight controller",
                    snapshot.get(&name).cloned(),
                );
                emit_from(&session, idx, idx + 1, &mut on_progress);
                continue;
            }

            // Already at the target value: confirm without a write.
            if let Some(current) = snapshot.get(&name) {
                if tol.matches(&target, current) {
                    debug!(%name, "already matches, no write needed");
                    session.confirm(idx, current.clone());
                    file.confirm_value(&name, current.clone());
                    emit_from(&session, idx, idx + 1, &mut on_progress);
                    continue;
                }
            }

            session.begin_write(idx);
            match self.write_and_verify(fc, &name, &target, &tol) {
                WriteOutcome::Confirmed(observed) => {
                    file.confirm_value(&name, observed.clone());
                    session.confirm(idx, observed);
                }
                WriteOutcome::Failed {
                    reason,
                    last_observed,
                } => {
                    session.fail(idx, reason, last_observed);
                }
                WriteOutcome::ConnectionLost => {
                    warn!(%name, "connection lost mid-batch, aborting remaining uploads");
                    session.fail_remaining(CONNECTION_LOST);
                    emit_from(&session, idx, total, &mut on_progress);
                    return Ok(session.into_result(false, false));
                }
            }
            emit_from(&session, idx, idx + 1, &mut on_progress);
        }

        let (rebooted, reboot_confirmed) = if session.reboot_obligated() && !cancelled {
            self.reboot_and_wait(fc)
        } else {
            (false, false)
        };

        Ok(session.into_result(rebooted, reboot_confirmed))
    }

    /// One parameter's write-verify-retry cycle.
    ///
    /// A response timeout (on the write or the read-back) and a read-back
    /// mismatch each consume one attempt; connection loss aborts immediately.
    fn write_and_verify(
        &self,
        fc: &mut dyn FlightController,
        name: &str,
        target: &ParamValue,
        tol: &Tolerance,
    ) -> WriteOutcome {
        let mut last_observed: Option<ParamValue> = None;
        let mut last_reason = String::new();

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                std::thread::sleep(self.config.retry_backoff());
            }

            debug!(%name, %target, attempt, "writing parameter");
            match fc.write_param(name, target) {
                Ok(()) => {}
                Err(e) if e.is_connection_loss() => return WriteOutcome::ConnectionLost,
                Err(e @ crate::transport::TransportError::Timeout(_)) => {
                    warn!(%name, attempt, error = %e, "write not acknowledged");
                    last_reason = e.to_string();
                    continue;
                }
                Err(e) => {
                    // Rejected or unsupported: retrying cannot help
                    return WriteOutcome::Failed {
                        reason: e.to_string(),
                        last_observed,
                    };
                }
            }

            match fc.read_param(name) {
                Ok(Some(observed)) => {
                    if tol.matches(target, &observed) {
                        debug!(%name, %observed, "verified");
                        return WriteOutcome::Confirmed(observed);
                    }
                    warn!(%name, %target, %observed, attempt, "read-back mismatch");
                    last_reason = format!("read-back mismatch: expected {target}, got {observed}");
                    last_observed = Some(observed);
                }
                Ok(None) => {
                    warn!(%name, attempt, "parameter missing on read-back");
                    last_reason = "parameter missing on read-back".to_string();
                }
                Err(e) if e.is_connection_loss() => return WriteOutcome::ConnectionLost,
                Err(e) => {
                    warn!(%name, attempt, error = %e, "read-back failed");
                    last_reason = e.to_string();
                }
            }
        }

        WriteOutcome::Failed {
            reason: format!(
                "verification failed after {} attempts: {last_reason}",
                self.config.max_attempts
            ),
            last_observed,
        }
    }

    /// Issue the reboot and wait for the heartbeat to resume.
    fn reboot_and_wait(&self, fc: &mut dyn FlightController) -> (bool, bool) {
        info!("reboot-required parameters confirmed, rebooting flight controller");
        if let Err(e) = fc.reboot() {
            warn!(error = %e, "reboot command could not be sent");
            return (false, false);
        }
        match fc.wait_heartbeat(self.config.reboot_timeout()) {
            Ok(true) => {
                info!("heartbeat resumed after reboot");
                (true, true)
            }
            Ok(false) => {
                warn!(
                    timeout_ms = self.config.reboot_timeout_ms,
                    "no heartbeat after reboot, manual verification required"
                );
                (true, false)
            }
            Err(e) => {
                warn!(error = %e, "heartbeat wait failed");
                (true, false)
            }
        }
    }
}

/// Emit progress for entries `[from, to)` whose outcomes are now final.
fn emit_from(
    session: &SyncSession,
    from: usize,
    to: usize,
    on_progress: &mut impl FnMut(ProgressEvent<'_>),
) {
    let total = session.len();
    for idx in from..to {
        let entry = session.entry(idx);
        on_progress(ProgressEvent {
            name: &entry.name,
            index: idx,
            total,
            state: &entry.state,
        });
    }
}
