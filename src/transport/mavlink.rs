//! MAVLink flight controller transport
//!
//! Implements [`FlightController`] over the MAVLink parameter protocol:
//!
//! - **PARAM_REQUEST_READ** / **PARAM_VALUE**: read one parameter
//! - **PARAM_SET** / **PARAM_VALUE**: write one parameter (the FC echoes the
//!   stored value as the acknowledgement)
//! - **PARAM_REQUEST_LIST**: stream the full parameter set
//! - **COMMAND_LONG** (`MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN`): reboot
//! - **HEARTBEAT**: link-alive detection after reboot
//!
//! The protocol is request/response per parameter; there is no bulk write
//! primitive. ArduPilot ignores requests for unknown names, so "not found"
//! is detected by response timeout.

use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use mavlink::common::{
    MavCmd, MavMessage, MavParamType, COMMAND_LONG_DATA, PARAM_REQUEST_LIST_DATA,
    PARAM_REQUEST_READ_DATA, PARAM_SET_DATA,
};
use mavlink::error::{MessageReadError, MessageWriteError};
use mavlink::{MavConnection, MavHeader};

use crate::param::ParamValue;

use super::{FlightController, TransportError};

/// MAVLink identity used for outgoing messages (ground station).
const GCS_SYSTEM_ID: u8 = 255;
const GCS_COMPONENT_ID: u8 = 190;

/// MAVLink-backed flight controller connection.
pub struct MavlinkFlightController {
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
    target_system: u8,
    target_component: u8,
    response_timeout: Duration,
    sequence: u8,
}

impl MavlinkFlightController {
    /// Connect to a flight controller.
    ///
    /// `address` uses the `mavlink` crate's connection string format, e.g.
    /// `serial:/dev/ttyUSB0:57600` or `udpin:0.0.0.0:14550`.
    /// `response_timeout` bounds every request/response exchange.
    pub fn connect(address: &str, response_timeout: Duration) -> Result<Self, TransportError> {
        let conn = mavlink::connect::<MavMessage>(address)?;
        Ok(Self {
            conn,
            target_system: 1,
            target_component: 1,
            response_timeout,
            sequence: 0,
        })
    }

    /// Override the target system/component ids (defaults: 1/1).
    pub fn with_target(mut self, system: u8, component: u8) -> Self {
        self.target_system = system;
        self.target_component = component;
        self
    }

    fn send(&mut self, msg: &MavMessage) -> Result<(), TransportError> {
        let header = MavHeader {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);
        match self.conn.send(&header, msg) {
            Ok(_) => Ok(()),
            Err(MessageWriteError::Io(e)) => {
                Err(TransportError::ConnectionLost(e.to_string()))
            }
        }
    }

    /// Receive until `select` accepts a message or the deadline passes.
    ///
    /// Transient read errors (would-block, parse noise on a radio link) are
    /// skipped; hard IO errors surface as connection loss.
    fn recv_until<T>(
        &mut self,
        deadline: Instant,
        mut select: impl FnMut(&MavMessage) -> Option<T>,
    ) -> Result<Option<T>, TransportError> {
        while Instant::now() < deadline {
            match self.conn.recv() {
                Ok((_header, msg)) => {
                    if let Some(out) = select(&msg) {
                        return Ok(Some(out));
                    }
                }
                Err(MessageReadError::Io(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(MessageReadError::Io(e)) => {
                    return Err(TransportError::ConnectionLost(e.to_string()));
                }
                // Corrupted frame on a lossy link; keep reading
                Err(MessageReadError::Parse(_)) => {}
            }
        }
        Ok(None)
    }

    /// Await a PARAM_VALUE for `name` within the response timeout.
    fn await_param_value(
        &mut self,
        name: &str,
    ) -> Result<Option<ParamValue>, TransportError> {
        let deadline = Instant::now() + self.response_timeout;
        self.recv_until(deadline, |msg| {
            if let MavMessage::PARAM_VALUE(data) = msg {
                if unpack_param_id(&data.param_id) == name {
                    return Some(decode_value(data.param_value, data.param_type));
                }
            }
            None
        })
    }
}

impl FlightController for MavlinkFlightController {
    fn read_param(&mut self, name: &str) -> Result<Option<ParamValue>, TransportError> {
        self.send(&MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            param_id: pack_param_id(name),
            param_index: -1,
        }))?;
        // No response means the FC has no such parameter
        self.await_param_value(name)
    }

    fn write_param(&mut self, name: &str, value: &ParamValue) -> Result<(), TransportError> {
        let (param_value, param_type) = encode_value(value)?;
        self.send(&MavMessage::PARAM_SET(PARAM_SET_DATA {
            param_value,
            target_system: self.target_system,
            target_component: self.target_component,
            param_id: pack_param_id(name),
            param_type,
        }))?;
        match self.await_param_value(name)? {
            Some(_) => Ok(()),
            None => Err(TransportError::Timeout("PARAM_VALUE acknowledgement")),
        }
    }

    fn read_all_params(&mut self) -> Result<HashMap<String, ParamValue>, TransportError> {
        self.send(&MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
        }))?;

        let mut params = HashMap::new();
        let mut expected: Option<usize> = None;
        // The deadline restarts on every received PARAM_VALUE: a full
        // download over a slow radio is long, but gaps must stay short.
        loop {
            let deadline = Instant::now() + self.response_timeout;
            let received = self.recv_until(deadline, |msg| {
                if let MavMessage::PARAM_VALUE(data) = msg {
                    Some((
                        unpack_param_id(&data.param_id).to_string(),
                        decode_value(data.param_value, data.param_type),
                        data.param_count as usize,
                    ))
                } else {
                    None
                }
            })?;
            match received {
                Some((name, value, count)) => {
                    expected = Some(count);
                    params.insert(name, value);
                    if params.len() >= count {
                        return Ok(params);
                    }
                }
                None if params.is_empty() => {
                    return Err(TransportError::Timeout("parameter list"));
                }
                // Stream went quiet before reaching param_count; report what
                // arrived rather than discarding a nearly complete download.
                None => {
                    tracing::warn!(
                        received = params.len(),
                        expected = expected.unwrap_or(0),
                        "parameter list download incomplete"
                    );
                    return Ok(params);
                }
            }
        }
    }

    fn reboot(&mut self) -> Result<(), TransportError> {
        self.send(&MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1: 1.0, // reboot autopilot
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
            command: MavCmd::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN,
            target_system: self.target_system,
            target_component: self.target_component,
            confirmation: 0,
        }))
        // No ack expected: the FC drops the link as it restarts.
    }

    fn wait_heartbeat(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let deadline = Instant::now() + timeout;
        let result = self.recv_until(deadline, |msg| {
            matches!(msg, MavMessage::HEARTBEAT(_)).then_some(())
        });
        match result {
            Ok(found) => Ok(found.is_some()),
            // The link flapping while the FC restarts is expected
            Err(TransportError::ConnectionLost(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Pack a parameter name into the fixed 16-byte MAVLink param_id field.
fn pack_param_id(name: &str) -> [u8; 16] {
    let mut param_id = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(16);
    param_id[..len].copy_from_slice(&bytes[..len]);
    param_id
}

/// Recover a parameter name from a param_id field (NUL padded).
fn unpack_param_id(param_id: &[u8; 16]) -> &str {
    core::str::from_utf8(param_id)
        .unwrap_or("")
        .trim_end_matches('\0')
}

/// Encode a value for the PARAM_SET wire format (f32 plus type tag).
fn encode_value(value: &ParamValue) -> Result<(f32, MavParamType), TransportError> {
    match value {
        ParamValue::Float(f) => Ok((*f, MavParamType::MAV_PARAM_TYPE_REAL32)),
        ParamValue::Int(i) => Ok((*i as f32, MavParamType::MAV_PARAM_TYPE_INT32)),
        ParamValue::Text(_) => Err(TransportError::Unsupported(
            "string values cannot be sent over the MAVLink parameter protocol",
        )),
    }
}

/// Decode a PARAM_VALUE payload into a typed value.
fn decode_value(raw: f32, param_type: MavParamType) -> ParamValue {
    match param_type {
        MavParamType::MAV_PARAM_TYPE_REAL32 | MavParamType::MAV_PARAM_TYPE_REAL64 => {
            ParamValue::Float(raw)
        }
        _ => ParamValue::Int(raw as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_id_round_trip() {
        let id = pack_param_id("RTL_ALT");
        assert_eq!(unpack_param_id(&id), "RTL_ALT");
    }

    #[test]
    fn test_param_id_truncates_long_names() {
        let id = pack_param_id("A_VERY_LONG_PARAMETER_NAME");
        assert_eq!(unpack_param_id(&id).len(), 16);
    }

    #[test]
    fn test_encode_int_as_int32() {
        let (raw, ty) = encode_value(&ParamValue::Int(500)).unwrap();
        assert_eq!(raw, 500.0);
        assert_eq!(ty, MavParamType::MAV_PARAM_TYPE_INT32);
    }

    #[test]
    fn test_encode_text_unsupported() {
        let err = encode_value(&ParamValue::Text("QuadX".into())).unwrap_err();
        assert!(matches!(err, TransportError::Unsupported(_)));
    }

    #[test]
    fn test_decode_by_wire_type() {
        assert_eq!(
            decode_value(1.5, MavParamType::MAV_PARAM_TYPE_REAL32),
            ParamValue::Float(1.5)
        );
        assert_eq!(
            decode_value(3.0, MavParamType::MAV_PARAM_TYPE_UINT8),
            ParamValue::Int(3)
        );
    }
}
