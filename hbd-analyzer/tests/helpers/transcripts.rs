//! Transcript fixture builders
//!
//! Lines are written in the Android 12-hour export layout:
//! `M/D/YY, H:MM AM - Sender: text`

use std::fs;
use std::path::{Path, PathBuf};

/// Builds an exported chat transcript line by line
#[derive(Debug, Default, Clone)]
pub struct TranscriptBuilder {
    lines: Vec<String>,
}

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message; `date` is `M/D/YY`, `time` is `H:MM AM`
    pub fn message(mut self, date: &str, time: &str, sender: &str, text: &str) -> Self {
        self.lines.push(format!("{}, {} - {}: {}", date, time, sender, text));
        self
    }

    /// Add a system notice (no sender)
    pub fn system(mut self, date: &str, time: &str, text: &str) -> Self {
        self.lines.push(format!("{}, {} - {}", date, time, text));
        self
    }

    /// Add a raw line, e.g. a continuation
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Write the transcript as UTF-8 into `dir/file_name`
    pub fn write(&self, dir: &Path, file_name: &str) -> PathBuf {
        write_raw(dir, file_name, self.lines.join("\n").as_bytes())
    }
}

/// Write arbitrary bytes as a transcript file
pub fn write_raw(dir: &Path, file_name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, bytes).expect("Failed to write transcript fixture");
    path
}
