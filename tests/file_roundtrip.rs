//! Parameter file round-trip and step-sequence behavior on real files.

use std::fs;

use paramsync::{FileSet, ParamValue, ParameterFile, ParseError};

const STEP_FILE: &str = "\
# 07_batt_voltage.param
# Battery monitor configuration for a 4S pack.

BATT_MONITOR_TYPE,4  # analog voltage and current
BATT_CAPACITY,5200
BATT_LOW_VOLT,14.0  # land before cell damage
BATT_VOLT_MULT,10.1

# Calibrated against a bench multimeter on 2026-08-12.
BATT_AMP_PERVLT,17.0
";

#[test]
fn save_load_round_trip_preserves_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("07_batt_voltage.param");
    fs::write(&path, STEP_FILE).unwrap();

    let mut file = ParameterFile::load(&path).unwrap();
    file.save(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), STEP_FILE);

    // A second round trip through a fresh load is also stable
    let mut reloaded = ParameterFile::load(&path).unwrap();
    reloaded.save(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), STEP_FILE);
}

#[test]
fn round_trip_preserves_windows_line_endings() {
    // Step files authored on Windows arrive with CRLF terminators and
    // sometimes no final newline; saving must not rewrite them wholesale.
    let text = "# header\r\nBATT_CAPACITY,5200\r\nRTL_ALT,500  # keep";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("windows.param");
    fs::write(&path, text).unwrap();

    let mut file = ParameterFile::load(&path).unwrap();
    file.save(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

#[test]
fn edits_touch_only_the_edited_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("07_batt_voltage.param");
    fs::write(&path, STEP_FILE).unwrap();

    let mut file = ParameterFile::load(&path).unwrap();
    file.set_new_value("BATT_CAPACITY", ParamValue::Int(6000));
    file.set_change_reason("BATT_CAPACITY", "upgraded pack");
    file.save(&path).unwrap();

    let written = fs::read_to_string(&path).unwrap();
    let expected = STEP_FILE.replace(
        "BATT_CAPACITY,5200",
        "BATT_CAPACITY,6000  # upgraded pack",
    );
    assert_eq!(written, expected);
}

#[test]
fn malformed_file_fails_without_partial_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.param");
    fs::write(&path, "BATT_CAPACITY,5200\nBATT_LOW_VOLT;14.0\n").unwrap();

    let err = ParameterFile::load(&path).unwrap_err();
    assert!(matches!(err, ParseError::MalformedLine { line: 2, .. }));
}

#[test]
fn step_sequence_walks_in_numeric_order_and_flushes() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("03_gps.param"), "GPS_TYPE,1\n").unwrap();
    fs::write(dir.path().join("07_batt.param"), STEP_FILE).unwrap();
    fs::write(dir.path().join("12_rtl.param"), "RTL_ALT,500\n").unwrap();

    let set = FileSet::scan(dir.path()).unwrap();
    assert_eq!(set.len(), 3);

    let mut step = set.open(0).unwrap();
    assert!(step.file.get("GPS_TYPE").is_some());

    // Edit step 0, then move on: the edit must land on disk
    step.file.set_new_value("GPS_TYPE", ParamValue::Int(2));
    let step = set.advance(step, 1).unwrap();
    assert_eq!(step.index, 1);
    assert!(step.file.get("BATT_CAPACITY").is_some());

    let flushed = fs::read_to_string(dir.path().join("03_gps.param")).unwrap();
    assert_eq!(flushed, "GPS_TYPE,2\n");
}
