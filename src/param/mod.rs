//! Parameter model types
//!
//! Provides the core value and record types the file store and sync engine
//! share: [`ParamValue`] (the union of types an ArduPilot parameter can
//! carry), [`Parameter`] (one named parameter with its pending change), and
//! [`Tolerance`] (the comparison rule used when verifying uploads).

pub mod reboot;

use bitflags::bitflags;
use std::fmt;

pub use reboot::requires_reboot;

bitflags! {
    /// Parameter flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamFlags: u8 {
        /// Parameter cannot be modified on the flight controller
        const READ_ONLY = 0b00000001;
        /// Parameter is produced by a calibration procedure
        const CALIBRATION = 0b00000010;
    }
}

/// Parameter value (union of supported types)
///
/// The MAVLink parameter protocol carries integers and floats; string values
/// only occur in local files for a small enumerated set of parameters that
/// never exist on the flight controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit floating point
    Float(f32),
    /// String value (file-only)
    Text(String),
}

impl ParamValue {
    /// Parse a value token from a parameter file.
    ///
    /// Integers parse as `Int`, other numerics as `Float`, anything else is
    /// kept as `Text`.
    pub fn parse(token: &str) -> ParamValue {
        if let Ok(i) = token.parse::<i32>() {
            ParamValue::Int(i)
        } else if let Ok(f) = token.parse::<f32>() {
            ParamValue::Float(f)
        } else {
            ParamValue::Text(token.to_string())
        }
    }

    /// Numeric view of this value, if it has one.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ParamValue::Int(i) => Some(*i as f32),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Comparison tolerance for verifying written values.
///
/// Integers and strings compare exactly; floats compare within a relative
/// and absolute tolerance to absorb f32 rounding on the MAVLink wire format
/// and on the flight controller itself.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Relative tolerance for float comparison
    pub rel: f32,
    /// Absolute tolerance for float comparison
    pub abs: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rel: 1e-4,
            abs: 1e-8,
        }
    }
}

impl Tolerance {
    /// Whether two values are equal within this tolerance.
    ///
    /// Mixed `Int`/`Float` pairs compare numerically: the flight controller
    /// reports every parameter as a typed number, and an integer target may
    /// legitimately come back as `REAL32`.
    pub fn matches(&self, a: &ParamValue, b: &ParamValue) -> bool {
        match (a, b) {
            (ParamValue::Int(x), ParamValue::Int(y)) => x == y,
            (ParamValue::Text(x), ParamValue::Text(y)) => x == y,
            (ParamValue::Text(_), _) | (_, ParamValue::Text(_)) => false,
            _ => {
                // At least one side is a float; both have numeric views here.
                let x = a.as_f32().unwrap_or(f32::NAN);
                let y = b.as_f32().unwrap_or(f32::NAN);
                (x - y).abs() <= self.abs.max(self.rel * x.abs().max(y.abs()))
            }
        }
    }
}

/// A single named parameter with its pending change.
///
/// Identity is the name. `new_value` absent means "no pending change";
/// `value` is the last value the flight controller confirmed (or the file
/// value, until a sync has run).
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Parameter name (`[A-Z0-9_]+`, MAVLink limits names to 16 bytes)
    pub name: String,
    /// Last known flight-controller value
    pub value: ParamValue,
    /// Pending target value, if any
    pub new_value: Option<ParamValue>,
    /// Unit string from parameter metadata (may be empty)
    pub unit: String,
    /// Parameter flags
    pub flags: ParamFlags,
    /// Whether the connected flight controller is known to have this
    /// parameter. False until observed (see
    /// [`crate::file::ParameterFile::mark_fc_presence`]).
    pub exists_on_fc: bool,
    /// Why this parameter is being changed (file comment)
    pub change_reason: String,
}

impl Parameter {
    /// Create a parameter with a known value and no pending change.
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            new_value: None,
            unit: String::new(),
            flags: ParamFlags::empty(),
            exists_on_fc: false,
            change_reason: String::new(),
        }
    }

    /// Whether an edit is pending upload.
    pub fn has_pending_change(&self) -> bool {
        self.new_value.is_some()
    }

    /// The value an upload would send: the pending value if one is set.
    pub fn target_value(&self) -> &ParamValue {
        self.new_value.as_ref().unwrap_or(&self.value)
    }
}

/// Whether `name` is a valid parameter name (`[A-Z0-9_]+`).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse() {
        assert_eq!(ParamValue::parse("500"), ParamValue::Int(500));
        assert_eq!(ParamValue::parse("-3"), ParamValue::Int(-3));
        assert_eq!(ParamValue::parse("0.5"), ParamValue::Float(0.5));
        assert_eq!(
            ParamValue::parse("QuadX"),
            ParamValue::Text("QuadX".to_string())
        );
    }

    #[test]
    fn test_value_display_round_trips() {
        assert_eq!(ParamValue::Int(500).to_string(), "500");
        assert_eq!(ParamValue::Float(0.5).to_string(), "0.5");
        assert_eq!(ParamValue::Text("QuadX".into()).to_string(), "QuadX");
    }

    #[test]
    fn test_tolerance_int_exact() {
        let tol = Tolerance::default();
        assert!(tol.matches(&ParamValue::Int(500), &ParamValue::Int(500)));
        assert!(!tol.matches(&ParamValue::Int(500), &ParamValue::Int(501)));
    }

    #[test]
    fn test_tolerance_float_epsilon() {
        let tol = Tolerance::default();
        assert!(tol.matches(&ParamValue::Float(1.0), &ParamValue::Float(1.00005)));
        assert!(!tol.matches(&ParamValue::Float(1.0), &ParamValue::Float(1.01)));
    }

    #[test]
    fn test_tolerance_mixed_numeric() {
        let tol = Tolerance::default();
        // FC reports an integer target back as REAL32
        assert!(tol.matches(&ParamValue::Int(500), &ParamValue::Float(500.0)));
        assert!(!tol.matches(&ParamValue::Int(500), &ParamValue::Float(501.0)));
    }

    #[test]
    fn test_tolerance_text() {
        let tol = Tolerance::default();
        assert!(tol.matches(
            &ParamValue::Text("a".into()),
            &ParamValue::Text("a".into())
        ));
        assert!(!tol.matches(&ParamValue::Text("1".into()), &ParamValue::Int(1)));
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("RTL_ALT"));
        assert!(is_valid_name("SR0_EXTRA1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("rtl_alt"));
        assert!(!is_valid_name("RTL ALT"));
    }

    #[test]
    fn test_target_value() {
        let mut p = Parameter::new("RTL_ALT", ParamValue::Int(400));
        assert_eq!(p.target_value(), &ParamValue::Int(400));
        p.new_value = Some(ParamValue::Int(500));
        assert!(p.has_pending_change());
        assert_eq!(p.target_value(), &ParamValue::Int(500));
    }
}
