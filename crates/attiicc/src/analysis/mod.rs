//! Analyses over the merged cell table.
//!
//! Counting, frame completion, count trends, cell-type classification,
//! single-cell speeds and effector-target proximity.

mod cell_count;
mod cell_type;
mod completion;
mod kinematics;
mod proximity;
mod trend;

pub use cell_count::count_cells;
pub use cell_type::{
    classify_cells, write_classified_csv, CellFlags, CellType, ClassifiedRecord, ClassifyConfig,
    GroupSizes,
};
pub use completion::{fill_missing_frames, observed_frames, CompletionStats};
pub use kinematics::{
    mean_speeds, moving_speeds, write_mean_speeds_csv, write_speeds_csv, SpeedRecord, WellSpeed,
};
pub use proximity::{effector_target_proximity, write_proximity_csv, ProximityRecord};
pub use trend::{derive_trends, write_trends_csv, Direction, Event, WellTrend};
