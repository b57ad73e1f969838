//! Numbered configuration-step file sequence
//!
//! A vehicle configuration directory holds a fixed sequence of parameter
//! files named `NN_description.param`. The numeric prefix is the step
//! number; the user walks the sequence in order, uploading each file's
//! flagged subset before moving on.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ParameterFile, ParseError};

/// The ordered set of step files in a configuration directory.
#[derive(Debug, Clone)]
pub struct FileSet {
    steps: Vec<(u32, PathBuf)>,
}

/// A step file loaded into memory.
#[derive(Debug)]
pub struct StepFile {
    /// Position in the sequence (0-based)
    pub index: usize,
    /// Path the file was loaded from and will be saved to
    pub path: PathBuf,
    /// The loaded parameter file
    pub file: ParameterFile,
}

impl FileSet {
    /// Scan `dir` for `NN_name.param` files, ordered by numeric prefix.
    ///
    /// Files without a numeric prefix or a `.param` extension are ignored;
    /// they are documentation or templates, not steps.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self, ParseError> {
        let mut steps = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("param") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
            let Ok(number) = digits.parse::<u32>() else {
                continue;
            };
            steps.push((number, path));
        }
        steps.sort();
        Ok(Self { steps })
    }

    /// Number of steps in the sequence.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Path of the given step, if it exists.
    pub fn path(&self, index: usize) -> Option<&Path> {
        self.steps.get(index).map(|(_, p)| p.as_path())
    }

    /// Load the given step from disk.
    pub fn open(&self, index: usize) -> Result<StepFile, ParseError> {
        let (_, path) = self
            .steps
            .get(index)
            .ok_or(ParseError::StepOutOfRange {
                index,
                count: self.steps.len(),
            })?;
        Ok(StepFile {
            index,
            path: path.clone(),
            file: ParameterFile::load(path)?,
        })
    }

    /// Move from one step to another.
    ///
    /// Unsaved edits in the current step are flushed to disk before the new
    /// step is loaded; a step file is never discarded with pending edits.
    pub fn advance(&self, mut current: StepFile, index: usize) -> Result<StepFile, ParseError> {
        if current.file.is_dirty() {
            current.file.save(&current.path)?;
        }
        self.open(index)
    }
}
