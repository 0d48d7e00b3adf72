//! End-to-end table analysis: load, merge, count, complete, then trends,
//! classification, speeds and proximity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::analysis::{
    classify_cells, count_cells, derive_trends, effector_target_proximity, fill_missing_frames,
    mean_speeds, moving_speeds, observed_frames, write_classified_csv, write_mean_speeds_csv,
    write_proximity_csv, write_speeds_csv, write_trends_csv, CompletionStats,
};
use crate::channel::Channel;
use crate::config::AnalysisConfig;
use crate::table::csv_io::{write_channel_csv, write_merged_csv, write_records_csv};
use crate::table::{load_channel_table, merge_channel_tables, MergeStats, TableError};

/// Where [`run_analysis`] writes each table. Nothing is written elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    /// Per-channel tables; `None` skips writing that channel.
    pub channel_tables: [Option<PathBuf>; 3],
    pub merged: PathBuf,
    pub completed: PathBuf,
    pub trends: PathBuf,
    pub classified: PathBuf,
    pub speeds: PathBuf,
    pub mean_speeds: PathBuf,
    pub proximity: PathBuf,
}

impl OutputLayout {
    /// Conventional file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            channel_tables: Channel::ALL.map(|c| Some(dir.join(format!("{}_output.csv", c)))),
            merged: dir.join("merged_output.csv"),
            completed: dir.join("completed_frames.csv"),
            trends: dir.join("trends.csv"),
            classified: dir.join("classified_cells.csv"),
            speeds: dir.join("single_cell_speeds.csv"),
            mean_speeds: dir.join("mean_speeds.csv"),
            proximity: dir.join("proximity.csv"),
        }
    }

    fn all_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.channel_tables.iter().flatten().chain([
            &self.merged,
            &self.completed,
            &self.trends,
            &self.classified,
            &self.speeds,
            &self.mean_speeds,
            &self.proximity,
        ])
    }
}

/// Row counts of one analysis run.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct AnalysisReport {
    /// Loaded rows per channel (d0, d1, d2).
    pub channel_rows: [usize; 3],
    pub merge: MergeStats,
    pub completion: CompletionStats,
    pub records: usize,
    pub trends: usize,
    /// Wells per event name.
    pub events: BTreeMap<String, usize>,
    /// Classified measured cells per type.
    pub cell_types: BTreeMap<String, usize>,
    pub speed_rows: usize,
    pub wells_with_speed: usize,
    pub proximity_pairs: usize,
}

fn ensure_parent(path: &Path) -> Result<(), TableError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| TableError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Run every analysis over the measurement exports below `measurements_root`.
pub fn run_analysis(
    measurements_root: &Path,
    config: &AnalysisConfig,
    layout: &OutputLayout,
) -> Result<AnalysisReport, TableError> {
    for path in layout.all_paths() {
        ensure_parent(path)?;
    }
    let mut report = AnalysisReport::default();

    let tables = [
        load_channel_table(measurements_root, Channel::D0)?,
        load_channel_table(measurements_root, Channel::D1)?,
        load_channel_table(measurements_root, Channel::D2)?,
    ];
    for (i, table) in tables.iter().enumerate() {
        report.channel_rows[i] = table.len();
        if let Some(path) = &layout.channel_tables[i] {
            write_channel_csv(path, table)?;
        }
    }

    let (merged, merge_stats) = merge_channel_tables(&tables[0], &tables[1], &tables[2])?;
    report.merge = merge_stats;
    write_merged_csv(&layout.merged, &merged)?;

    let counted = count_cells(merged);
    let required = match &config.required_frames {
        Some(frames) => frames.clone(),
        None => observed_frames(&counted),
    };
    let (records, completion) = fill_missing_frames(counted, Some(&required));
    report.completion = completion;
    report.records = records.len();
    write_records_csv(&layout.completed, &records)?;

    let trends = derive_trends(&records, &required);
    report.trends = trends.len();
    for t in &trends {
        *report.events.entry(t.event().to_string()).or_insert(0) += 1;
    }
    write_trends_csv(&layout.trends, &trends)?;

    let classified = classify_cells(records, &config.classify);
    for c in &classified {
        if let Some(ty) = c.cell_type() {
            *report.cell_types.entry(ty.to_string()).or_insert(0) += 1;
        }
    }
    write_classified_csv(&layout.classified, &classified)?;

    let speeds = moving_speeds(classified.iter().map(|c| &c.record));
    let wells = mean_speeds(&speeds);
    report.speed_rows = speeds.len();
    report.wells_with_speed = wells.iter().filter(|w| w.mean_speed.is_some()).count();
    write_speeds_csv(&layout.speeds, &speeds)?;
    write_mean_speeds_csv(&layout.mean_speeds, &wells)?;

    let pairs = effector_target_proximity(&classified);
    report.proximity_pairs = pairs.len();
    write_proximity_csv(&layout.proximity, &pairs)?;

    tracing::info!(
        "Analysis done: {} records, {} trends, {} proximity pairs",
        report.records,
        report.trends,
        report.proximity_pairs
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::csv_io::read_records_csv;
    use crate::test_utils::{raw_export, raw_line};

    /// One field, one well, frames 0..3; the cell is missing from frame 2.
    fn write_exports(root: &Path) {
        for (ch, mean) in [("d0", 2.0), ("d1", 0.1), ("d2", 0.9)] {
            let dir = root.join(format!("fieldA{}", ch));
            std::fs::create_dir_all(&dir).unwrap();
            let lines: Vec<String> = [(0, 0.0, 0.0), (1, 3.0, 4.0), (3, 3.0, 4.0)]
                .iter()
                .map(|&(frame, x, y)| {
                    let label = format!("p{:02}_0_A_fieldA_7:0001", frame);
                    raw_line(1, &label, x, y).replace(",1.5,", &format!(",{},", mean))
                })
                .collect();
            std::fs::write(dir.join("m.csv"), raw_export(&lines)).unwrap();
        }
    }

    #[test]
    fn runs_end_to_end_into_explicit_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("measurements");
        let out = tmp.path().join("results");
        write_exports(&root);

        let layout = OutputLayout::in_dir(&out);
        let report = run_analysis(&root, &AnalysisConfig::default(), &layout).unwrap();

        assert_eq!(report.channel_rows, [3, 3, 3]);
        assert_eq!(report.merge.joined, 3);
        // Frame 2 is not observed anywhere, so nothing is missing.
        assert_eq!(report.completion.placeholders, 0);
        assert_eq!(report.trends, 1);
        assert_eq!(report.events.get("No Change"), Some(&1));
        assert_eq!(report.cell_types.get("E"), Some(&3));
        assert_eq!(report.speed_rows, 3);
        assert_eq!(report.wells_with_speed, 1);
        assert_eq!(report.proximity_pairs, 0);

        for path in layout.all_paths() {
            assert!(path.is_file(), "missing {}", path.display());
        }
    }

    #[test]
    fn required_frames_add_placeholders() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("measurements");
        write_exports(&root);
        let layout = OutputLayout::in_dir(&tmp.path().join("results"));
        let config = AnalysisConfig {
            required_frames: Some((0..4).map(crate::table::Frame).collect()),
            ..AnalysisConfig::default()
        };

        let report = run_analysis(&root, &config, &layout).unwrap();
        assert_eq!(report.completion.placeholders, 1);
        assert_eq!(report.events.get("Mixed Event"), Some(&1));

        let records = read_records_csv(&layout.completed).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records[2].is_placeholder());
    }
}
