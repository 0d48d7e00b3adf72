//! Per-channel measurement export loading.

use std::path::Path;

use super::csv_io::Cells;
use super::{parse_label, ChannelRow, ChannelTable, Morphology, TableError};
use crate::channel::Channel;
use crate::workspace::{dir_name, files_with_extensions, walk_dirs};

/// Number of columns of a raw measurement export:
/// ` , Label, Area, Mean, X, Y, Circ., AR, Round, Solidity`.
pub const RAW_COLUMNS: usize = 10;

const RAW_NAMES: [&str; RAW_COLUMNS] = [
    "cell", "label", "area", "mean_intensity", "X", "Y", "circ.", "ar", "round", "solidity",
];

/// Read one raw export into channel rows tagged with `field`.
pub fn read_channel_export(path: &Path, field: &str) -> Result<Vec<ChannelRow>, TableError> {
    let file = std::fs::File::open(path).map_err(|e| TableError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers().map_err(|e| TableError::csv(path, e))?;
    if headers.len() != RAW_COLUMNS {
        return Err(TableError::ColumnCount {
            path: path.to_path_buf(),
            expected: RAW_COLUMNS,
            found: headers.len(),
        });
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TableError::csv(path, e))?;
        if record.len() != RAW_COLUMNS {
            return Err(TableError::ColumnCount {
                path: path.to_path_buf(),
                expected: RAW_COLUMNS,
                found: record.len(),
            });
        }
        let c = Cells {
            path,
            row: i + 1,
            record: &record,
        };

        let label = c.str(1);
        let parsed = parse_label(label).map_err(|reason| TableError::MalformedLabel {
            path: path.to_path_buf(),
            row: i + 1,
            label: label.to_string(),
            reason,
        })?;

        rows.push(ChannelRow {
            field: field.to_string(),
            frame: parsed.frame,
            well: parsed.well,
            cell: c.u32(0, RAW_NAMES[0])?,
            x: c.f64(4, RAW_NAMES[4])?,
            y: c.f64(5, RAW_NAMES[5])?,
            mean_intensity: c.f64(3, RAW_NAMES[3])?,
            morphology: Morphology {
                area: c.f64(2, RAW_NAMES[2])?,
                circularity: c.f64(6, RAW_NAMES[6])?,
                aspect_ratio: c.f64(7, RAW_NAMES[7])?,
                roundness: c.f64(8, RAW_NAMES[8])?,
                solidity: c.f64(9, RAW_NAMES[9])?,
            },
            cell_id: parsed.cell_id,
            label: label.to_string(),
        });
    }
    Ok(rows)
}

/// Load every export below `root` that sits in a directory ending with the
/// channel suffix.
///
/// The field of each row is the directory name with the suffix removed. The
/// result is sorted by (field, well, frame), ties kept in file order.
pub fn load_channel_table(root: &Path, channel: Channel) -> Result<ChannelTable, TableError> {
    let suffix = channel.suffix();
    let dirs = walk_dirs(root).map_err(|e| TableError::io(root, e))?;

    let mut rows = Vec::new();
    let mut n_files = 0usize;
    for dir in dirs.iter().filter(|d| dir_name(d).ends_with(suffix)) {
        let name = dir_name(dir);
        let field = &name[..name.len() - suffix.len()];
        let files = files_with_extensions(dir, &["csv"]).map_err(|e| TableError::io(dir, e))?;
        for file in files {
            let loaded = read_channel_export(&file, field)?;
            tracing::debug!(
                "Loaded {} rows from {} (field '{}')",
                loaded.len(),
                file.display(),
                field
            );
            rows.extend(loaded);
            n_files += 1;
        }
    }

    if n_files == 0 {
        return Err(TableError::NoInputs {
            root: root.to_path_buf(),
            channel,
        });
    }

    rows.sort_by(|a, b| (&a.field, a.well, a.frame).cmp(&(&b.field, b.well, b.frame)));
    tracing::info!(
        "{} rows loaded for channel {} from {} files",
        rows.len(),
        channel,
        n_files
    );
    Ok(ChannelTable::new(channel, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Frame;
    use crate::test_utils::{raw_export, raw_line};

    #[test]
    fn loads_and_sorts_rows_from_suffixed_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("f01d1")).unwrap();
        std::fs::create_dir_all(root.join("f01d0")).unwrap();
        std::fs::write(
            root.join("f01d1/b.csv"),
            raw_export(&[raw_line(1, "p02_0_A_x_3:c1", 1.0, 2.0), raw_line(1, "p00_0_A_x_3:c1", 0.0, 0.0)]),
        )
        .unwrap();
        std::fs::write(
            root.join("f01d1/a.csv"),
            raw_export(&[raw_line(1, "p01_0_A_x_1:c1", 5.0, 5.0)]),
        )
        .unwrap();
        std::fs::write(
            root.join("f01d0/ignored.csv"),
            raw_export(&[raw_line(1, "p01_0_A_x_9:c1", 5.0, 5.0)]),
        )
        .unwrap();

        let table = load_channel_table(root, Channel::D1).unwrap();
        assert_eq!(table.channel, Channel::D1);
        let keys: Vec<_> = table.rows.iter().map(|r| (r.field.as_str(), r.well, r.frame)).collect();
        assert_eq!(
            keys,
            vec![("f01", 1, Frame(1)), ("f01", 3, Frame(0)), ("f01", 3, Frame(2))]
        );
        assert_eq!(table.rows[0].cell_id, "c1");
        assert_eq!(table.rows[2].x, 1.0);
    }

    #[test]
    fn wrong_column_count_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("short.csv");
        std::fs::write(&path, " ,Label,Area\n1,p00_a_b_c_1:1,3\n").unwrap();
        match read_channel_export(&path, "f") {
            Err(TableError::ColumnCount { found, expected, .. }) => {
                assert_eq!(found, 3);
                assert_eq!(expected, RAW_COLUMNS);
            }
            other => panic!("expected ColumnCount, got {:?}", other),
        }
    }

    #[test]
    fn malformed_label_names_file_and_row() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.csv");
        std::fs::write(
            &path,
            raw_export(&[raw_line(1, "p00_0_A_x_1:c1", 0.0, 0.0), raw_line(2, "frame0-well1", 0.0, 0.0)]),
        )
        .unwrap();
        match read_channel_export(&path, "f") {
            Err(TableError::MalformedLabel { row, label, path: p, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(label, "frame0-well1");
                assert_eq!(p, path);
            }
            other => panic!("expected MalformedLabel, got {:?}", other),
        }
    }

    #[test]
    fn empty_tree_reports_no_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_channel_table(tmp.path(), Channel::D2),
            Err(TableError::NoInputs { .. })
        ));
    }
}
