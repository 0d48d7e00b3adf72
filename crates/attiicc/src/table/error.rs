use std::path::PathBuf;

use crate::channel::Channel;

/// Errors raised while reading, parsing or writing measurement tables.
#[derive(Debug)]
pub enum TableError {
    /// Filesystem access failed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The CSV reader/writer failed (quoting, UTF-8, flush).
    Csv { path: PathBuf, source: csv::Error },
    /// A raw measurement export did not have the fixed column count.
    ColumnCount {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    /// A compound label did not follow the `p<frame>_.._.._.._<well>..:<cell>` pattern.
    MalformedLabel {
        path: PathBuf,
        /// 1-based data row (header excluded).
        row: usize,
        label: String,
        reason: &'static str,
    },
    /// A numeric column held something that is not a number.
    InvalidNumber {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    /// A table read back from disk lacks a required column.
    MissingColumn { path: PathBuf, column: String },
    /// No CSV was found under any directory carrying the channel suffix.
    NoInputs { root: PathBuf, channel: Channel },
    /// A table was passed in the slot of a different channel.
    ChannelMismatch { expected: Channel, found: Channel },
}

impl TableError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Csv { path, source } => write!(f, "{}: csv error: {}", path.display(), source),
            Self::ColumnCount {
                path,
                expected,
                found,
            } => write!(
                f,
                "{}: expected {} columns, found {}",
                path.display(),
                expected,
                found
            ),
            Self::MalformedLabel {
                path,
                row,
                label,
                reason,
            } => write!(
                f,
                "{}: row {}: malformed label '{}': {}",
                path.display(),
                row,
                label,
                reason
            ),
            Self::InvalidNumber {
                path,
                row,
                column,
                value,
            } => write!(
                f,
                "{}: row {}: column '{}' is not a number: '{}'",
                path.display(),
                row,
                column,
                value
            ),
            Self::MissingColumn { path, column } => {
                write!(f, "{}: missing required column '{}'", path.display(), column)
            }
            Self::NoInputs { root, channel } => write!(
                f,
                "no CSV files found under {} in directories ending with '{}'",
                root.display(),
                channel
            ),
            Self::ChannelMismatch { expected, found } => write!(
                f,
                "expected the {} table in this position, got {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}
