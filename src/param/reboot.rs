//! Reboot-required parameter classification
//!
//! Some ArduPilot parameters only take effect after the flight controller
//! restarts. The convention is encoded in the name: feature-enable switches
//! (`*_EN`, `*_ENABLE`), driver/backend selectors (`*_TYPE`), and the system
//! identification axis selector (`SID_AXIS`).

/// Name suffixes that mark a parameter as reboot-required.
const REBOOT_SUFFIXES: [&str; 3] = ["_TYPE", "_EN", "_ENABLE"];

/// Name substrings that mark a parameter as reboot-required.
const REBOOT_SUBSTRINGS: [&str; 1] = ["SID_AXIS"];

/// Whether changing the named parameter requires a flight-controller reboot.
///
/// Pure and total over any string; unknown names simply classify as not
/// requiring a reboot.
pub fn requires_reboot(name: &str) -> bool {
    REBOOT_SUFFIXES.iter().any(|s| name.ends_with(s))
        || REBOOT_SUBSTRINGS.iter().any(|s| name.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_suffix() {
        assert!(requires_reboot("ARM_TYPE"));
        assert!(requires_reboot("GPS_TYPE"));
        assert!(requires_reboot("BATT_MONITOR_TYPE"));
    }

    #[test]
    fn test_enable_suffixes() {
        assert!(requires_reboot("RC_ENABLE"));
        assert!(requires_reboot("FENCE_EN"));
    }

    #[test]
    fn test_sid_axis_substring() {
        assert!(requires_reboot("AHRS_YAW_SID_AXIS"));
        assert!(requires_reboot("SID_AXIS"));
    }

    #[test]
    fn test_non_reboot_names() {
        assert!(!requires_reboot("ARMING_CHECK"));
        assert!(!requires_reboot("RTL_ALT"));
        assert!(!requires_reboot("GPS_TYPE2_RATE"));
        assert!(!requires_reboot(""));
    }
}
