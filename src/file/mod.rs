//! Intermediate parameter file store
//!
//! Parameter files are plain text, one parameter per line:
//!
//! ```text
//! # Step 05: return-to-launch setup
//! RTL_ALT,500  # fly home above the treeline
//! RTL_SPEED,0
//! ```
//!
//! Comment-only and blank lines are retained verbatim, and an unedited
//! parameter line is written back byte-for-byte, so a load/save round trip
//! with no value changes reproduces the file exactly.

mod diff;
pub mod store;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::param::{is_valid_name, ParamFlags, ParamValue, Parameter};

pub use diff::diff;
pub use store::{FileSet, StepFile};

/// Errors from loading a parameter file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: malformed parameter entry (expected NAME,VALUE): {content:?}")]
    MalformedLine { line: usize, content: String },

    #[error("line {line}: invalid parameter name: {name:?}")]
    InvalidName { line: usize, name: String },

    #[error("line {line}: duplicate parameter: {name}")]
    DuplicateName { line: usize, name: String },

    #[error("no step {index} in a sequence of {count}")]
    StepOutOfRange { index: usize, count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One parameter line with its upload flag.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The parameter this line defines
    pub param: Parameter,
    /// Whether the sync engine should upload this parameter
    pub upload: bool,
    /// Original line text without its terminator; reused on save while the
    /// entry is unedited
    raw: String,
    /// The line's original terminator (`\n`, `\r\n`, or empty at EOF)
    eol: &'static str,
    /// Set when the rendered form no longer matches `raw`
    edited: bool,
}

impl Entry {
    fn render(&self) -> String {
        let mut out = format!("{},{}", self.param.name, self.param.target_value());
        if !self.param.change_reason.is_empty() {
            out.push_str("  # ");
            out.push_str(&self.param.change_reason);
        }
        out
    }
}

/// One line of a parameter file.
#[derive(Debug, Clone)]
enum Line {
    /// A parameter entry
    Entry(Entry),
    /// Comment-only or blank line, kept verbatim including its terminator
    Verbatim(String),
}

/// Split text into `(line, terminator)` pairs, where the terminator is
/// `"\n"`, `"\r\n"`, or `""` for a final line without a newline. Unlike
/// `str::lines`, nothing is lost: concatenating the pairs reproduces the
/// input byte-for-byte.
fn lines_with_eol(text: &str) -> Vec<(&str, &'static str)> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find('\n') {
            Some(pos) => {
                if pos > 0 && rest.as_bytes()[pos - 1] == b'\r' {
                    out.push((&rest[..pos - 1], "\r\n"));
                } else {
                    out.push((&rest[..pos], "\n"));
                }
                rest = &rest[pos + 1..];
            }
            None => {
                out.push((rest, ""));
                break;
            }
        }
    }
    out
}

/// An ordered, comment-preserving parameter file.
///
/// Line order is preserved across read-modify-write round trips; lines that
/// are not parameter entries are retained byte-for-byte.
#[derive(Debug, Clone, Default)]
pub struct ParameterFile {
    lines: Vec<Line>,
    /// name -> index into `lines`
    index: HashMap<String, usize>,
    /// Unsaved edits present
    dirty: bool,
}

impl ParameterFile {
    /// Create an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a parameter file from disk.
    ///
    /// Fails on malformed parameter lines; comment-only and blank lines are
    /// tolerated and preserved.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse parameter file text.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut file = Self::new();
        for (number, (raw, eol)) in lines_with_eol(text).into_iter().enumerate() {
            let number = number + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                file.lines.push(Line::Verbatim(format!("{raw}{eol}")));
                continue;
            }

            let Some((name, rest)) = trimmed.split_once(',') else {
                return Err(ParseError::MalformedLine {
                    line: number,
                    content: raw.to_string(),
                });
            };
            let name = name.trim();
            if !is_valid_name(name) {
                return Err(ParseError::InvalidName {
                    line: number,
                    name: name.to_string(),
                });
            }
            if file.index.contains_key(name) {
                return Err(ParseError::DuplicateName {
                    line: number,
                    name: name.to_string(),
                });
            }

            let (value_token, reason) = match rest.split_once('#') {
                Some((v, c)) => (v.trim(), c.trim().to_string()),
                None => (rest.trim(), String::new()),
            };
            if value_token.is_empty() {
                return Err(ParseError::MalformedLine {
                    line: number,
                    content: raw.to_string(),
                });
            }

            let value = ParamValue::parse(value_token);
            let mut param = Parameter::new(name, value.clone());
            // The file records target values; until a sync confirms otherwise
            // the target is also the best known value.
            param.new_value = Some(value);
            param.change_reason = reason;

            file.index.insert(name.to_string(), file.lines.len());
            file.lines.push(Line::Entry(Entry {
                param,
                upload: false,
                raw: raw.to_string(),
                eol,
                edited: false,
            }));
        }
        Ok(file)
    }

    /// Write the file back to disk and clear the dirty state.
    ///
    /// Line terminators (LF or CRLF, and a missing final newline) are
    /// reproduced as loaded; an edited entry keeps its line's terminator.
    pub fn save(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(raw) => out.push_str(raw),
                Line::Entry(e) => {
                    if e.edited {
                        out.push_str(&e.render());
                    } else {
                        out.push_str(&e.raw);
                    }
                    out.push_str(e.eol);
                }
            }
        }
        fs::write(path, &out)?;

        // Saved text is now the canonical raw form.
        for line in &mut self.lines {
            if let Line::Entry(e) = line {
                if e.edited {
                    e.raw = e.render();
                    e.edited = false;
                }
            }
        }
        self.dirty = false;
        Ok(())
    }

    /// Whether the file has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of parameter entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the file has no parameter entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entry(name).map(|e| &e.param)
    }

    /// Iterate parameter entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|l| match l {
            Line::Entry(e) => Some(e),
            Line::Verbatim(_) => None,
        })
    }

    /// Parameters currently flagged for upload, in file order.
    pub fn flagged(&self) -> Vec<&Parameter> {
        self.entries()
            .filter(|e| e.upload)
            .map(|e| &e.param)
            .collect()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        let idx = *self.index.get(name)?;
        match &self.lines[idx] {
            Line::Entry(e) => Some(e),
            Line::Verbatim(_) => None,
        }
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        let idx = *self.index.get(name)?;
        match &mut self.lines[idx] {
            Line::Entry(e) => Some(e),
            Line::Verbatim(_) => None,
        }
    }

    /// Record a user edit: set the pending target value for `name`.
    ///
    /// Returns false if the parameter is not in this file.
    pub fn set_new_value(&mut self, name: &str, value: ParamValue) -> bool {
        let Some(e) = self.entry_mut(name) else {
            return false;
        };
        e.param.new_value = Some(value);
        e.edited = true;
        self.dirty = true;
        true
    }

    /// Record why a parameter is being changed.
    pub fn set_change_reason(&mut self, name: &str, reason: impl Into<String>) -> bool {
        let Some(e) = self.entry_mut(name) else {
            return false;
        };
        e.param.change_reason = reason.into();
        e.edited = true;
        self.dirty = true;
        true
    }

    /// Set the upload flag for a single parameter.
    pub fn set_upload(&mut self, name: &str, upload: bool) -> bool {
        match self.entry_mut(name) {
            Some(e) => {
                e.upload = upload;
                true
            }
            None => false,
        }
    }

    /// Flag exactly the named set for upload, clearing all other flags.
    pub fn flag_for_upload<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for line in &mut self.lines {
            if let Line::Entry(e) = line {
                e.upload = false;
            }
        }
        for name in names {
            self.set_upload(name, true);
        }
    }

    /// Attach metadata flags to a parameter (from parameter documentation,
    /// not from the file text; does not dirty the file).
    pub fn set_flags(&mut self, name: &str, flags: ParamFlags) -> bool {
        match self.entry_mut(name) {
            Some(e) => {
                e.param.flags = flags;
                true
            }
            None => false,
        }
    }

    /// Record which of this file's parameters the connected flight
    /// controller reports, from a full parameter download.
    ///
    /// The sync engine uses this to distinguish a parameter that is
    /// legitimately new to the flight controller from a file that does not
    /// match the connected hardware at all.
    pub fn mark_fc_presence(&mut self, remote: &HashMap<String, ParamValue>) {
        for line in &mut self.lines {
            if let Line::Entry(e) = line {
                e.param.exists_on_fc = remote.contains_key(&e.param.name);
            }
        }
    }

    /// Update the last known flight-controller value after a confirmed
    /// upload. Does not touch the file text: the file records targets, not
    /// observations.
    pub fn confirm_value(&mut self, name: &str, value: ParamValue) -> bool {
        let Some(e) = self.entry_mut(name) else {
            return false;
        };
        e.param.value = value;
        e.param.exists_on_fc = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Step 05: return-to-launch setup

RTL_ALT,500  # fly home above the treeline
RTL_SPEED,0
BATT_CAPACITY,5200
";

    #[test]
    fn test_parse_preserves_structure() {
        let file = ParameterFile::parse(SAMPLE).unwrap();
        assert_eq!(file.len(), 3);
        assert_eq!(file.get("RTL_ALT").unwrap().target_value(), &ParamValue::Int(500));
        assert_eq!(
            file.get("RTL_ALT").unwrap().change_reason,
            "fly home above the treeline"
        );
        assert_eq!(file.get("RTL_SPEED").unwrap().change_reason, "");
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("05_rtl.param");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut file = ParameterFile::load(&path).unwrap();
        file.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, SAMPLE);
    }

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let text = "RTL_ALT,500  # keep";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_newline.param");
        std::fs::write(&path, text).unwrap();

        let mut file = ParameterFile::load(&path).unwrap();
        file.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_round_trip_crlf() {
        let text = "# header\r\nRTL_ALT,500\r\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crlf.param");
        std::fs::write(&path, text).unwrap();

        let mut file = ParameterFile::load(&path).unwrap();
        file.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_edit_keeps_line_terminator() {
        let mut file = ParameterFile::parse("GPS_TYPE,1\r\nRTL_ALT,400\r\n").unwrap();
        file.set_new_value("RTL_ALT", ParamValue::Int(500));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crlf.param");
        file.save(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "GPS_TYPE,1\r\nRTL_ALT,500\r\n"
        );
    }

    #[test]
    fn test_edit_renders_new_value_and_reason() {
        let mut file = ParameterFile::parse("RTL_ALT,400\n").unwrap();
        assert!(file.set_new_value("RTL_ALT", ParamValue::Int(500)));
        assert!(file.set_change_reason("RTL_ALT", "raised for terrain"));
        assert!(file.is_dirty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.param");
        file.save(&path).unwrap();
        assert!(!file.is_dirty());

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "RTL_ALT,500  # raised for terrain\n");
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let err = ParameterFile::parse("RTL_ALT,500\nnot a parameter\n").unwrap_err();
        match err {
            ParseError::MalformedLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = ParameterFile::parse("rtl_alt,500\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidName { line: 1, .. }));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ParameterFile::parse("RTL_ALT,500\nRTL_ALT,400\n").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateName { line: 2, .. }));
    }

    #[test]
    fn test_missing_value_rejected() {
        let err = ParameterFile::parse("RTL_ALT,\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_text_values_are_file_only() {
        let file = ParameterFile::parse("FRAME_LAYOUT,QuadX\n").unwrap();
        let p = file.get("FRAME_LAYOUT").unwrap();
        assert_eq!(p.target_value(), &ParamValue::Text("QuadX".into()));
        assert!(!p.exists_on_fc);
    }

    #[test]
    fn test_mark_fc_presence() {
        let mut file = ParameterFile::parse(SAMPLE).unwrap();
        let remote: HashMap<String, ParamValue> =
            [("RTL_ALT".to_string(), ParamValue::Float(400.0))].into();
        file.mark_fc_presence(&remote);
        assert!(file.get("RTL_ALT").unwrap().exists_on_fc);
        assert!(!file.get("RTL_SPEED").unwrap().exists_on_fc);
    }

    #[test]
    fn test_flag_for_upload_replaces_previous_flags() {
        let mut file = ParameterFile::parse(SAMPLE).unwrap();
        file.flag_for_upload(["RTL_ALT", "RTL_SPEED"]);
        assert_eq!(file.flagged().len(), 2);
        file.flag_for_upload(["BATT_CAPACITY"]);
        let flagged = file.flagged();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].name, "BATT_CAPACITY");
    }

    #[test]
    fn test_confirm_value_does_not_dirty_file() {
        let mut file = ParameterFile::parse("RTL_ALT,500\n").unwrap();
        assert!(file.confirm_value("RTL_ALT", ParamValue::Float(500.0)));
        assert!(!file.is_dirty());
        assert_eq!(file.get("RTL_ALT").unwrap().value, ParamValue::Float(500.0));
    }
}
