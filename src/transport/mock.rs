//! Mock flight controller for testing
//!
//! Simulates a flight controller's parameter storage in memory. Supports
//! fault injection for the failure paths the sync engine must handle:
//! writes that never persist, connection loss after N operations, and
//! heartbeat suppression after a reboot.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::param::ParamValue;

use super::{FlightController, TransportError};

/// In-memory flight controller.
///
/// # Example
///
/// ```
/// use paramsync::transport::mock::MockFlightController;
/// use paramsync::transport::FlightController;
/// use paramsync::ParamValue;
///
/// let mut fc = MockFlightController::new();
/// fc.set_param("RTL_ALT", ParamValue::Float(400.0));
///
/// fc.write_param("RTL_ALT", &ParamValue::Float(500.0)).unwrap();
/// assert_eq!(
///     fc.read_param("RTL_ALT").unwrap(),
///     Some(ParamValue::Float(500.0))
/// );
/// ```
#[derive(Debug, Default)]
pub struct MockFlightController {
    params: HashMap<String, ParamValue>,
    /// Writes to these names are acknowledged but never persist
    stuck: HashSet<String>,
    /// Connection drops once this many writes have been attempted
    fail_after_writes: Option<usize>,
    /// This many upcoming write attempts time out (no acknowledgement)
    timeout_writes: usize,
    /// Link state; every operation fails once the link is down
    lost: bool,
    /// Whether a heartbeat arrives after reboot
    heartbeat_after_reboot: bool,
    writes: Vec<(String, ParamValue)>,
    reboots: usize,
}

impl MockFlightController {
    /// Create a mock with no parameters and a healthy link.
    pub fn new() -> Self {
        Self {
            heartbeat_after_reboot: true,
            ..Self::default()
        }
    }

    /// Set a parameter value directly (test setup, not counted as a write).
    pub fn set_param(&mut self, name: &str, value: ParamValue) {
        self.params.insert(name.to_string(), value);
    }

    /// Make writes to `name` acknowledge without persisting.
    pub fn make_stuck(&mut self, name: &str) {
        self.stuck.insert(name.to_string());
    }

    /// Drop the connection after `n` write attempts.
    pub fn drop_connection_after_writes(&mut self, n: usize) {
        self.fail_after_writes = Some(n);
    }

    /// Make the next `n` write attempts time out. The write is received
    /// (and logged) but the acknowledgement never arrives, so the value does
    /// not change — the radio-shadow case.
    pub fn timeout_next_writes(&mut self, n: usize) {
        self.timeout_writes = n;
    }

    /// Drop the connection immediately.
    pub fn drop_connection(&mut self) {
        self.lost = true;
    }

    /// Suppress the post-reboot heartbeat.
    pub fn suppress_heartbeat(&mut self) {
        self.heartbeat_after_reboot = false;
    }

    /// All write attempts seen, in order (for test verification).
    pub fn writes(&self) -> &[(String, ParamValue)] {
        &self.writes
    }

    /// Number of reboot commands received.
    pub fn reboot_count(&self) -> usize {
        self.reboots
    }

    /// Current stored value (for test verification).
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    fn check_link(&self) -> Result<(), TransportError> {
        if self.lost {
            Err(TransportError::ConnectionLost("mock link down".into()))
        } else {
            Ok(())
        }
    }
}

impl FlightController for MockFlightController {
    fn read_param(&mut self, name: &str) -> Result<Option<ParamValue>, TransportError> {
        self.check_link()?;
        Ok(self.params.get(name).cloned())
    }

    fn write_param(&mut self, name: &str, value: &ParamValue) -> Result<(), TransportError> {
        self.check_link()?;
        if let Some(limit) = self.fail_after_writes {
            if self.writes.len() >= limit {
                self.lost = true;
                return Err(TransportError::ConnectionLost("mock link down".into()));
            }
        }
        self.writes.push((name.to_string(), value.clone()));
        if self.timeout_writes > 0 {
            self.timeout_writes -= 1;
            return Err(TransportError::Timeout("PARAM_VALUE acknowledgement"));
        }
        if !self.stuck.contains(name) {
            self.params.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    fn read_all_params(&mut self) -> Result<HashMap<String, ParamValue>, TransportError> {
        self.check_link()?;
        Ok(self.params.clone())
    }

    fn reboot(&mut self) -> Result<(), TransportError> {
        self.check_link()?;
        self.reboots += 1;
        Ok(())
    }

    fn wait_heartbeat(&mut self, _timeout: Duration) -> Result<bool, TransportError> {
        self.check_link()?;
        Ok(self.heartbeat_after_reboot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_persists_and_is_logged() {
        let mut fc = MockFlightController::new();
        fc.set_param("RTL_ALT", ParamValue::Float(400.0));

        fc.write_param("RTL_ALT", &ParamValue::Float(500.0)).unwrap();
        assert_eq!(fc.param("RTL_ALT"), Some(&ParamValue::Float(500.0)));
        assert_eq!(fc.writes().len(), 1);
    }

    #[test]
    fn test_stuck_write_acks_without_persisting() {
        let mut fc = MockFlightController::new();
        fc.set_param("RTL_ALT", ParamValue::Float(400.0));
        fc.make_stuck("RTL_ALT");

        fc.write_param("RTL_ALT", &ParamValue::Float(500.0)).unwrap();
        assert_eq!(fc.param("RTL_ALT"), Some(&ParamValue::Float(400.0)));
    }

    #[test]
    fn test_connection_drop_after_writes() {
        let mut fc = MockFlightController::new();
        fc.drop_connection_after_writes(1);

        assert!(fc.write_param("A_B", &ParamValue::Int(1)).is_ok());
        let err = fc.write_param("C_D", &ParamValue::Int(2)).unwrap_err();
        assert!(err.is_connection_loss());
        // Every subsequent operation fails too
        assert!(fc.read_param("A_B").is_err());
    }

    #[test]
    fn test_timeout_injection_is_consumed() {
        let mut fc = MockFlightController::new();
        fc.set_param("RTL_ALT", ParamValue::Float(400.0));
        fc.timeout_next_writes(1);

        let err = fc
            .write_param("RTL_ALT", &ParamValue::Float(500.0))
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(!err.is_connection_loss());
        // Value unchanged, but the attempt was seen
        assert_eq!(fc.param("RTL_ALT"), Some(&ParamValue::Float(400.0)));
        assert_eq!(fc.writes().len(), 1);

        // Next attempt goes through
        fc.write_param("RTL_ALT", &ParamValue::Float(500.0)).unwrap();
        assert_eq!(fc.param("RTL_ALT"), Some(&ParamValue::Float(500.0)));
    }

    #[test]
    fn test_heartbeat_suppression() {
        let mut fc = MockFlightController::new();
        assert!(fc.wait_heartbeat(Duration::from_secs(1)).unwrap());
        fc.suppress_heartbeat();
        assert!(!fc.wait_heartbeat(Duration::from_secs(1)).unwrap());
    }
}
