//! Flight controller transport
//!
//! The sync engine talks to the flight controller through the
//! [`FlightController`] trait: strictly request/response, one operation in
//! flight at a time. The production implementation speaks MAVLink
//! ([`MavlinkFlightController`]); tests use the in-memory
//! [`mock::MockFlightController`].

pub mod mavlink;
pub mod mock;

use std::collections::HashMap;
use std::time::Duration;

use crate::param::ParamValue;

pub use self::mavlink::MavlinkFlightController;

/// Errors from flight-controller transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("rejected by flight controller: {0}")]
    Rejected(String),

    #[error("not supported by this transport: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error means the link is gone (as opposed to one lost or
    /// rejected exchange). The sync engine aborts the remaining batch on
    /// connection loss and retries everything else.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionLost(_) | TransportError::Io(_)
        )
    }
}

/// Request/response parameter operations on a connected flight controller.
///
/// Implementations must be `Send` so the engine can run on a worker thread.
/// Each call is a complete exchange with its own connection-level timeout; a
/// timeout surfaces as [`TransportError::Timeout`], not a hang.
pub trait FlightController: Send {
    /// Read a single parameter. `Ok(None)` means the flight controller does
    /// not have a parameter by that name.
    fn read_param(&mut self, name: &str) -> Result<Option<ParamValue>, TransportError>;

    /// Write a single parameter and wait for the acknowledgement.
    fn write_param(&mut self, name: &str, value: &ParamValue) -> Result<(), TransportError>;

    /// Download the complete parameter set.
    fn read_all_params(&mut self) -> Result<HashMap<String, ParamValue>, TransportError>;

    /// Command a flight-controller reboot. Returns once the command has been
    /// sent; the link is expected to drop immediately afterwards.
    fn reboot(&mut self) -> Result<(), TransportError>;

    /// Wait for the heartbeat to resume after a reboot.
    ///
    /// `Ok(false)` means the timeout elapsed without a heartbeat; that is a
    /// condition for the caller to surface, not an error.
    fn wait_heartbeat(&mut self, timeout: Duration) -> Result<bool, TransportError>;
}
