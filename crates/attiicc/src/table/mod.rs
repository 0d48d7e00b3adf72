//! Measurement tables: per-channel exports, the merged cell table and the
//! frame-completed record table.
//!
//! Absence of a measurement is explicit (`Option`) in memory. The `na`
//! sentinel only exists at the CSV boundary, see [`csv_io`].

pub mod csv_io;
mod error;
mod label;
mod loader;
mod merge;

use std::fmt;

use crate::channel::{Channel, ChannelParams};

pub use error::TableError;
pub use label::{parse_label, ParsedLabel};
pub use loader::{load_channel_table, read_channel_export};
pub use merge::{merge_channel_tables, MergeStats};

/// A time-lapse frame index. Written as `p{n}` in labels and trend strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Frame(pub u32);

impl Frame {
    /// Parse a `p`-prefixed frame token (`p00`, `p7`).
    pub fn parse_token(token: &str) -> Option<Self> {
        let digits = token.strip_prefix('p')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Frame)
    }

    /// Parse either a bare number (`3`) or a `p`-prefixed token (`p03`).
    pub fn parse_loose(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::parse_token(s).or_else(|| s.parse().ok().map(Frame))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Shape descriptors exported per detected cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Morphology {
    pub area: f64,
    pub circularity: f64,
    pub aspect_ratio: f64,
    pub roundness: f64,
    pub solidity: f64,
}

/// One row of a single-channel measurement export.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub field: String,
    pub frame: Frame,
    pub well: u32,
    /// Local cell index within its (field, frame, well).
    pub cell: u32,
    pub x: f64,
    pub y: f64,
    pub mean_intensity: f64,
    pub morphology: Morphology,
    /// Trailing token of the compound label.
    pub cell_id: String,
    pub label: String,
}

/// All rows loaded for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable {
    pub channel: Channel,
    pub rows: Vec<ChannelRow>,
}

impl ChannelTable {
    pub fn new(channel: Channel, rows: Vec<ChannelRow>) -> Self {
        Self { channel, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-cell measurement after the three channels were joined.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMeasurement {
    pub cell: u32,
    pub x: f64,
    pub y: f64,
    /// Mean intensity per channel.
    pub intensity: ChannelParams<f64>,
    pub morphology: Morphology,
    /// Source label per channel, indexed d0, d1, d2.
    pub labels: [String; 3],
    pub cell_id: String,
}

impl CellMeasurement {
    pub fn label(&self, channel: Channel) -> &str {
        &self.labels[channel.index()]
    }

    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// One detected cell present in all three channels.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub field: String,
    pub well: u32,
    pub frame: Frame,
    pub measurement: CellMeasurement,
}

impl MergedRow {
    /// Single-channel view of this row, as the loader would have produced it.
    pub fn channel_row(&self, channel: Channel) -> ChannelRow {
        let m = &self.measurement;
        ChannelRow {
            field: self.field.clone(),
            frame: self.frame,
            well: self.well,
            cell: m.cell,
            x: m.x,
            y: m.y,
            mean_intensity: m.intensity.get(channel),
            morphology: m.morphology,
            cell_id: m.cell_id.clone(),
            label: m.label(channel).to_string(),
        }
    }
}

/// A row of the frame-completed table.
///
/// `measurement` is `None` for placeholder rows synthesised for frames in
/// which no cell was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub field: String,
    pub well: u32,
    pub frame: Frame,
    pub cell_count: u32,
    pub measurement: Option<CellMeasurement>,
}

impl CellRecord {
    pub fn placeholder(field: &str, well: u32, frame: Frame) -> Self {
        Self {
            field: field.to_string(),
            well,
            frame,
            cell_count: 0,
            measurement: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.measurement.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tokens_parse_and_display() {
        assert_eq!(Frame::parse_token("p00"), Some(Frame(0)));
        assert_eq!(Frame::parse_token("p15"), Some(Frame(15)));
        assert_eq!(Frame::parse_token("15"), None);
        assert_eq!(Frame::parse_token("p"), None);
        assert_eq!(Frame::parse_token("px1"), None);
        assert_eq!(Frame::parse_loose(" 7 "), Some(Frame(7)));
        assert_eq!(Frame::parse_loose("p07"), Some(Frame(7)));
        assert_eq!(Frame(4).to_string(), "p4");
    }
}
