//! Heuristic attachment extraction from captured message bodies
//!
//! This is not a MIME parser. A body is scanned once, line by line:
//!
//! - `filename="..."` anywhere on a line names the next attachment
//! - `Content-Transfer-Encoding: base64` (any case) starts collecting payload
//! - a line beginning with `--` ends the payload
//!
//! A body that ends while a payload is still being collected keeps what was
//! collected. The boundary line itself never becomes part of a payload.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use lazy_static::lazy_static;
use log::{error, info};
use regex::Regex;

use crate::sink::error::SinkError;

lazy_static! {
    static ref FILENAME_RE: Regex = Regex::new(r#"filename="([^"]+)""#).unwrap();
    static ref ENCODING_RE: Regex =
        Regex::new(r"(?i)Content-Transfer-Encoding:\s*base64").unwrap();
}

const BOUNDARY_PREFIX: &str = "--";

/// An encoded attachment found in a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Name taken from the most recent filename marker
    pub filename: String,
    /// Trimmed payload lines, in order
    pub encoded_lines: Vec<String>,
}

impl Attachment {
    /// Decode the payload lines as one standard base64 string
    pub fn decode(&self) -> Result<Vec<u8>, SinkError> {
        B64.decode(self.encoded_lines.concat())
            .map_err(|source| SinkError::Decode {
                filename: self.filename.clone(),
                source,
            })
    }

    /// Path the attachment is written to inside `dir`.
    ///
    /// Only the last component of the filename is used, so `../x` lands in
    /// `dir` as `x`. Returns `None` when nothing usable remains.
    pub fn target_path(&self, dir: &Path) -> Option<PathBuf> {
        Path::new(&self.filename)
            .file_name()
            .map(|name| dir.join(name))
    }

    /// Decode and write the attachment into `dir`, replacing any existing
    /// file of the same name. Returns the path written.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, SinkError> {
        let data = self.decode()?;
        let path = self.target_path(dir).ok_or_else(|| SinkError::Persist {
            path: dir.join(&self.filename),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "filename has no usable final component",
            ),
        })?;

        fs::write(&path, data).map_err(|source| SinkError::Persist {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn is_complete(&self) -> bool {
        !self.filename.is_empty() && !self.encoded_lines.is_empty()
    }
}

#[derive(Debug)]
enum ScanState {
    Seeking,
    Capturing(Vec<String>),
}

/// Find every attachment in `body` that has both a name and a payload.
pub fn extract_attachments<S: AsRef<str>>(body: &[S]) -> Vec<Attachment> {
    let mut found = Vec::new();
    let mut filename = String::new();
    let mut state = ScanState::Seeking;

    let mut emit = |filename: &str, encoded_lines: Vec<String>| {
        let attachment = Attachment {
            filename: filename.to_owned(),
            encoded_lines,
        };
        if attachment.is_complete() {
            found.push(attachment);
        }
    };

    for line in body {
        let line = line.as_ref();

        if let Some(caps) = FILENAME_RE.captures(line) {
            filename = caps[1].to_owned();
            continue;
        }

        if ENCODING_RE.is_match(line) {
            state = ScanState::Capturing(Vec::new());
            continue;
        }

        if let ScanState::Capturing(lines) = &mut state {
            if line.starts_with(BOUNDARY_PREFIX) {
                let lines = std::mem::take(lines);
                state = ScanState::Seeking;
                emit(&filename, lines);
            } else {
                lines.push(line.trim().to_owned());
            }
        }
    }

    // Body ended without a closing boundary
    if let ScanState::Capturing(lines) = state {
        emit(&filename, lines);
    }

    found
}

/// Extract, decode and write every attachment in `body` into `dir`.
///
/// Failures are logged and skip only the attachment concerned. Returns the
/// number of files written.
pub fn save_attachments<S: AsRef<str>>(body: &[S], dir: &Path) -> usize {
    let mut saved = 0;
    for attachment in extract_attachments(body) {
        match attachment.persist(dir) {
            Ok(path) => {
                info!("Saved attachment: {}", path.display());
                saved += 1;
            }
            Err(e) => error!("Error saving attachment {}: {e}", attachment.filename),
        }
    }
    saved
}
