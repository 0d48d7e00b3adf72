//! attiicc: live-cell microscopy pipeline for effector/target imaging.
//!
//! The stages are:
//!
//! 1. **Preprocess** – Gaussian or rolling-ball background subtraction over a
//!    channel-suffixed (`d0`/`d1`/`d2`) image tree.
//! 2. **Segment** – label masks and ImageJ ROI archives per image, behind the
//!    [`Segmenter`] trait, with a threshold backend built in.
//! 3. **Tables** – per-channel measurement exports loaded, parsed and merged
//!    into one row per detected cell.
//! 4. **Analysis** – cell counts, frame completion, count trends and events,
//!    cell-type classification, single-cell speeds and effector-target
//!    proximity.
//! 5. **Matching** – cross-frame grouping of coincident detections.
//!
//! [`run_analysis`] chains the table stages and writes every result to the
//! paths of an [`OutputLayout`].

pub mod analysis;
mod channel;
mod config;
pub mod matching;
mod pipeline;
pub mod preprocess;
pub mod segment;
pub mod table;
mod workspace;

#[cfg(test)]
mod test_utils;

pub use analysis::{CellType, ClassifyConfig, Event};
pub use channel::{Channel, ChannelParams};
pub use config::{AnalysisConfig, ConfigError, PipelineConfig};
pub use matching::{match_points, MatchConfig, MatchMode, MatchedPoint};
pub use pipeline::{run_analysis, AnalysisReport, OutputLayout};
pub use preprocess::{process_tree, BackgroundMethod, PreprocessConfig};
pub use segment::{segment_tree, Segmenter, ThresholdConfig, ThresholdSegmenter};
pub use table::{CellRecord, Frame, MergedRow, TableError};
pub use workspace::create_directories;
