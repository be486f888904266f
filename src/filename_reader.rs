//! Resolution of test-image filenames on the host.
//!
//! When the capture pipeline runs on a development host, every frame
//! "captured" is read from disk instead. A filename reader decides
//! which file stands in for the frame at the current simulation time
//! step. Three reader kinds exist:
//!
//! - **sequence**: `prefix + zero-padded(time step, digits) + suffix`
//! - **file list**: one filename per line, advanced by one line per
//!   simulation tick
//! - **constant**: the same filename every tick
//!
//! Readers are configured from a plain-text file whose first line is
//! `READER_TYPE = <kind>` followed by the kind-specific keys, or built
//! programmatically.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{error, warn};

use crate::error::{OscarError, OscarResult};

/// Maximum sequence-number width accepted for a sequence reader.
const MAX_SEQ_DIGITS: u32 = 10;

enum ReaderKind {
    Sequence {
        prefix: String,
        digits: u32,
        suffix: String,
    },
    FileList {
        list_path: String,
        lines: std::io::Lines<BufReader<File>>,
        current: String,
    },
    Constant {
        name: String,
    },
}

/// A configured filename reader.
pub struct FilenameReader {
    kind: ReaderKind,
}

impl FilenameReader {
    /// A sequence reader emitting `prefix + zero-padded step + suffix`.
    pub fn sequence(prefix: &str, digits: u32, suffix: &str) -> OscarResult<Self> {
        if prefix.is_empty() || suffix.is_empty() || digits == 0 || digits > MAX_SEQ_DIGITS {
            return Err(OscarError::InvalidParameter(format!(
                "sequence reader ({prefix:?}, {digits}, {suffix:?})"
            )));
        }
        Ok(FilenameReader {
            kind: ReaderKind::Sequence {
                prefix: prefix.to_owned(),
                digits,
                suffix: suffix.to_owned(),
            },
        })
    }

    /// A file-list reader taking one filename per line from `list`.
    pub fn file_list(list: &Path) -> OscarResult<Self> {
        let file = File::open(list).map_err(|source| OscarError::UnableToOpenFile {
            path: list.to_path_buf(),
            source,
        })?;
        Ok(FilenameReader {
            kind: ReaderKind::FileList {
                list_path: list.display().to_string(),
                lines: BufReader::new(file).lines(),
                current: String::new(),
            },
        })
    }

    /// A constant reader always emitting `name`.
    pub fn constant(name: &str) -> OscarResult<Self> {
        if name.is_empty() {
            return Err(OscarError::InvalidParameter(
                "constant reader with empty filename".into(),
            ));
        }
        Ok(FilenameReader {
            kind: ReaderKind::Constant {
                name: name.to_owned(),
            },
        })
    }

    /// Build a reader from its configuration file.
    pub fn from_config_file(config: &Path) -> OscarResult<Self> {
        let file = File::open(config).map_err(|source| OscarError::UnableToOpenFile {
            path: config.to_path_buf(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();
        let mut next_value = |key: &str| -> OscarResult<String> {
            let line = lines
                .next()
                .transpose()?
                .ok_or_else(|| OscarError::FileParseError(format!("missing `{key}` line")))?;
            let (k, v) = line
                .split_once('=')
                .ok_or_else(|| OscarError::FileParseError(format!("malformed line {line:?}")))?;
            if k.trim() != key {
                return Err(OscarError::FileParseError(format!(
                    "expected `{key}`, found `{}`",
                    k.trim()
                )));
            }
            Ok(v.trim().to_owned())
        };

        let reader_type = next_value("READER_TYPE")?;
        match reader_type.as_str() {
            "FRD_SEQUENCE_READER" => {
                let prefix = next_value("FILENAME_PREFIX")?;
                let digits: u32 = next_value("FILENAME_SEQ_NR_DIGITS")?
                    .parse()
                    .map_err(|_| {
                        OscarError::FileParseError("FILENAME_SEQ_NR_DIGITS is not a number".into())
                    })?;
                let suffix = next_value("FILENAME_SUFFIX")?;
                FilenameReader::sequence(&prefix, digits, &suffix)
            }
            "FRD_FILELIST_READER" => {
                let list = next_value("FILENAME_LIST")?;
                FilenameReader::file_list(Path::new(&list))
            }
            "FRD_CONSTANT_READER" => {
                let name = next_value("FILENAME")?;
                FilenameReader::constant(&name)
            }
            other => Err(OscarError::FileParseError(format!(
                "unknown reader type `{other}`"
            ))),
        }
    }

    /// The filename standing in for the frame at `time_step`.
    pub fn current_file_name(&self, time_step: u32) -> String {
        match &self.kind {
            ReaderKind::Sequence {
                prefix,
                digits,
                suffix,
            } => format!(
                "{prefix}{time_step:0width$}{suffix}",
                width = *digits as usize
            ),
            ReaderKind::FileList { current, .. } => current.clone(),
            ReaderKind::Constant { name } => name.clone(),
        }
    }

    /// Advance to the next simulation time step. Only the file-list
    /// reader holds per-tick state.
    pub fn on_cycle(&mut self, _time_step: u32) {
        if let ReaderKind::FileList {
            list_path,
            lines,
            current,
        } = &mut self.kind
        {
            match lines.next() {
                Some(Ok(line)) => {
                    if line.is_empty() {
                        warn!(list = %list_path, "next file name is an empty string");
                    }
                    *current = line;
                }
                Some(Err(err)) => {
                    error!(list = %list_path, %err, "unable to read next file name");
                    current.clear();
                }
                None => {
                    warn!(list = %list_path, "file list exhausted");
                    current.clear();
                }
            }
        }
    }
}
