//! CSV persistence for the table types.
//!
//! Every writer takes an explicit output path. Missing values are written as
//! the literal [`NA`] and read back as `None`.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use super::{CellMeasurement, CellRecord, ChannelRow, ChannelTable, Frame, MergedRow, Morphology, TableError};
use crate::channel::{Channel, ChannelParams};

/// Sentinel written for values that are not available.
pub const NA: &str = "na";

/// Column order of the merged cell table.
pub const MERGED_COLUMNS: [&str; 18] = [
    "field",
    "well",
    "frame",
    "cell",
    "X",
    "Y",
    "mean_intensity_d0",
    "mean_intensity_d1",
    "mean_intensity_d2",
    "area",
    "circ.",
    "ar",
    "round",
    "solidity",
    "label_d0",
    "label_d1",
    "label",
    "cell_ID",
];

/// Extra column of the frame-completed table.
pub const CELL_COUNT_COLUMN: &str = "cell_count";

// ── Low-level helpers ──────────────────────────────────────────────────────

pub(crate) fn create_writer(path: &Path) -> Result<csv::Writer<File>, TableError> {
    csv::Writer::from_path(path).map_err(|e| TableError::csv(path, e))
}

pub(crate) fn open_reader(path: &Path) -> Result<csv::Reader<File>, TableError> {
    let file = File::open(path).map_err(|e| TableError::io(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

pub(crate) fn write_row<I, S>(
    writer: &mut csv::Writer<File>,
    path: &Path,
    fields: I,
) -> Result<(), TableError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    writer
        .write_record(fields)
        .map_err(|e| TableError::csv(path, e))
}

pub(crate) fn finish(mut writer: csv::Writer<File>, path: &Path) -> Result<(), TableError> {
    writer.flush().map_err(|e| TableError::io(path, e))
}

/// Format an optional value, `na` when absent.
pub fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| NA.to_string(), |v| v.to_string())
}

/// Format a 0/1 indicator.
pub(crate) fn fmt_flag(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

pub(crate) fn is_na(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case(NA) || value.eq_ignore_ascii_case("nan")
}

/// Header-name lookup for a table read back from disk.
pub(crate) struct Columns {
    path: PathBuf,
    index: HashMap<String, usize>,
}

impl Columns {
    pub(crate) fn from_headers(path: &Path, headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self {
            path: path.to_path_buf(),
            index,
        }
    }

    pub(crate) fn require(&self, column: &str) -> Result<usize, TableError> {
        self.index
            .get(column)
            .copied()
            .ok_or_else(|| TableError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
    }

    pub(crate) fn find(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }
}

/// Typed access to one record, with file/row context for errors.
pub(crate) struct Cells<'a> {
    pub(crate) path: &'a Path,
    /// 1-based data row.
    pub(crate) row: usize,
    pub(crate) record: &'a StringRecord,
}

impl<'a> Cells<'a> {
    pub(crate) fn str(&self, idx: usize) -> &'a str {
        self.record.get(idx).unwrap_or("")
    }

    fn invalid(&self, column: &str, value: &str) -> TableError {
        TableError::InvalidNumber {
            path: self.path.to_path_buf(),
            row: self.row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn f64(&self, idx: usize, column: &str) -> Result<f64, TableError> {
        let value = self.str(idx);
        value.parse::<f64>().map_err(|_| self.invalid(column, value))
    }

    /// Integer column; tolerates a float spelling such as `3.0`.
    pub(crate) fn u32(&self, idx: usize, column: &str) -> Result<u32, TableError> {
        let value = self.str(idx);
        if let Ok(v) = value.parse::<u32>() {
            return Ok(v);
        }
        match value.parse::<f64>() {
            Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(v as u32),
            _ => Err(self.invalid(column, value)),
        }
    }

    pub(crate) fn frame(&self, idx: usize, column: &str) -> Result<Frame, TableError> {
        let value = self.str(idx);
        Frame::parse_loose(value).ok_or_else(|| self.invalid(column, value))
    }
}

// ── Channel tables ─────────────────────────────────────────────────────────

fn channel_columns(channel: Channel) -> [String; 14] {
    [
        "field".to_string(),
        "frame".to_string(),
        "well".to_string(),
        "cell".to_string(),
        "X".to_string(),
        "Y".to_string(),
        "area".to_string(),
        channel.intensity_column(),
        "circ.".to_string(),
        "ar".to_string(),
        "round".to_string(),
        "solidity".to_string(),
        "cell_ID".to_string(),
        "label".to_string(),
    ]
}

/// Write a loaded single-channel table.
pub fn write_channel_csv(path: &Path, table: &ChannelTable) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(&mut writer, path, channel_columns(table.channel))?;
    for r in &table.rows {
        let m = &r.morphology;
        write_row(
            &mut writer,
            path,
            [
                r.field.clone(),
                r.frame.0.to_string(),
                r.well.to_string(),
                r.cell.to_string(),
                r.x.to_string(),
                r.y.to_string(),
                m.area.to_string(),
                r.mean_intensity.to_string(),
                m.circularity.to_string(),
                m.aspect_ratio.to_string(),
                m.roundness.to_string(),
                m.solidity.to_string(),
                r.cell_id.clone(),
                r.label.clone(),
            ],
        )?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} {} rows to {}", table.len(), table.channel, path.display());
    Ok(())
}

/// Read a single-channel table written by [`write_channel_csv`].
///
/// The channel is recovered from the `mean_intensity_<ch>` header.
pub fn read_channel_csv(path: &Path) -> Result<ChannelTable, TableError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| TableError::csv(path, e))?.clone();
    let cols = Columns::from_headers(path, &headers);

    let channel = Channel::ALL
        .into_iter()
        .find(|c| cols.find(&c.intensity_column()).is_some())
        .ok_or_else(|| TableError::MissingColumn {
            path: path.to_path_buf(),
            column: "mean_intensity_<d0|d1|d2>".to_string(),
        })?;

    let names = channel_columns(channel);
    let idx: Vec<usize> = names
        .iter()
        .map(|n| cols.require(n))
        .collect::<Result<_, _>>()?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TableError::csv(path, e))?;
        let c = Cells {
            path,
            row: i + 1,
            record: &record,
        };
        rows.push(ChannelRow {
            field: c.str(idx[0]).to_string(),
            frame: c.frame(idx[1], &names[1])?,
            well: c.u32(idx[2], &names[2])?,
            cell: c.u32(idx[3], &names[3])?,
            x: c.f64(idx[4], &names[4])?,
            y: c.f64(idx[5], &names[5])?,
            morphology: Morphology {
                area: c.f64(idx[6], &names[6])?,
                circularity: c.f64(idx[8], &names[8])?,
                aspect_ratio: c.f64(idx[9], &names[9])?,
                roundness: c.f64(idx[10], &names[10])?,
                solidity: c.f64(idx[11], &names[11])?,
            },
            mean_intensity: c.f64(idx[7], &names[7])?,
            cell_id: c.str(idx[12]).to_string(),
            label: c.str(idx[13]).to_string(),
        });
    }
    Ok(ChannelTable::new(channel, rows))
}

// ── Merged and frame-completed tables ──────────────────────────────────────

fn measurement_fields(m: &CellMeasurement) -> [String; 15] {
    [
        m.cell.to_string(),
        m.x.to_string(),
        m.y.to_string(),
        m.intensity.d0.to_string(),
        m.intensity.d1.to_string(),
        m.intensity.d2.to_string(),
        m.morphology.area.to_string(),
        m.morphology.circularity.to_string(),
        m.morphology.aspect_ratio.to_string(),
        m.morphology.roundness.to_string(),
        m.morphology.solidity.to_string(),
        m.labels[0].clone(),
        m.labels[1].clone(),
        m.labels[2].clone(),
        m.cell_id.clone(),
    ]
}

/// Write the merged cell table.
pub fn write_merged_csv(path: &Path, rows: &[MergedRow]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(&mut writer, path, MERGED_COLUMNS)?;
    for r in rows {
        let key = [r.field.clone(), r.well.to_string(), r.frame.0.to_string()];
        write_row(
            &mut writer,
            path,
            key.into_iter().chain(measurement_fields(&r.measurement)),
        )?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} merged rows to {}", rows.len(), path.display());
    Ok(())
}

fn read_measurement(c: &Cells<'_>, idx: &[usize]) -> Result<CellMeasurement, TableError> {
    let name = |i: usize| MERGED_COLUMNS[i];
    Ok(CellMeasurement {
        cell: c.u32(idx[3], name(3))?,
        x: c.f64(idx[4], name(4))?,
        y: c.f64(idx[5], name(5))?,
        intensity: ChannelParams::new(
            c.f64(idx[6], name(6))?,
            c.f64(idx[7], name(7))?,
            c.f64(idx[8], name(8))?,
        ),
        morphology: Morphology {
            area: c.f64(idx[9], name(9))?,
            circularity: c.f64(idx[10], name(10))?,
            aspect_ratio: c.f64(idx[11], name(11))?,
            roundness: c.f64(idx[12], name(12))?,
            solidity: c.f64(idx[13], name(13))?,
        },
        labels: [
            c.str(idx[14]).to_string(),
            c.str(idx[15]).to_string(),
            c.str(idx[16]).to_string(),
        ],
        cell_id: c.str(idx[17]).to_string(),
    })
}

fn merged_indices(cols: &Columns) -> Result<Vec<usize>, TableError> {
    MERGED_COLUMNS.iter().map(|n| cols.require(n)).collect()
}

/// Read a merged cell table; fails on any missing required column.
pub fn read_merged_csv(path: &Path) -> Result<Vec<MergedRow>, TableError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| TableError::csv(path, e))?.clone();
    let cols = Columns::from_headers(path, &headers);
    let idx = merged_indices(&cols)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TableError::csv(path, e))?;
        let c = Cells {
            path,
            row: i + 1,
            record: &record,
        };
        rows.push(MergedRow {
            field: c.str(idx[0]).to_string(),
            well: c.u32(idx[1], "well")?,
            frame: c.frame(idx[2], "frame")?,
            measurement: read_measurement(&c, &idx)?,
        });
    }
    Ok(rows)
}

/// Header of the frame-completed table.
pub(crate) fn record_header() -> Vec<&'static str> {
    MERGED_COLUMNS.iter().copied().chain([CELL_COUNT_COLUMN]).collect()
}

/// Cells of one frame-completed row; placeholders carry `na`.
pub(crate) fn record_fields(r: &CellRecord) -> Vec<String> {
    let mut fields = vec![r.field.clone(), r.well.to_string(), r.frame.0.to_string()];
    match &r.measurement {
        Some(m) => fields.extend(measurement_fields(m)),
        None => fields.extend(std::iter::repeat(NA.to_string()).take(MERGED_COLUMNS.len() - 3)),
    }
    fields.push(r.cell_count.to_string());
    fields
}

/// Write the frame-completed table; placeholder rows carry `na`.
pub fn write_records_csv(path: &Path, records: &[CellRecord]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(&mut writer, path, record_header())?;
    for r in records {
        write_row(&mut writer, path, record_fields(r))?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read a table written by [`write_records_csv`].
pub fn read_records_csv(path: &Path) -> Result<Vec<CellRecord>, TableError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| TableError::csv(path, e))?.clone();
    let cols = Columns::from_headers(path, &headers);
    let idx = merged_indices(&cols)?;
    let count_idx = cols.require(CELL_COUNT_COLUMN)?;

    let mut records = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TableError::csv(path, e))?;
        let c = Cells {
            path,
            row: i + 1,
            record: &record,
        };
        let measurement = if is_na(c.str(idx[3])) {
            None
        } else {
            Some(read_measurement(&c, &idx)?)
        };
        records.push(CellRecord {
            field: c.str(idx[0]).to_string(),
            well: c.u32(idx[1], "well")?,
            frame: c.frame(idx[2], "frame")?,
            cell_count: c.u32(count_idx, CELL_COUNT_COLUMN)?,
            measurement,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::merged_row;

    #[test]
    fn merged_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.csv");
        let rows = vec![
            merged_row("f1", 2, 0, 1, [10.5, 20.25], [2.0, 0.1, 0.9], 120.0),
            merged_row("f1", 2, 1, 1, [11.0, 21.0], [1.5, 0.3, 0.2], 118.5),
        ];
        write_merged_csv(&path, &rows).unwrap();
        let back = read_merged_csv(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn missing_column_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrow.csv");
        std::fs::write(&path, "field,well,frame,cell,X,Y\nf1,1,0,1,0.0,0.0\n").unwrap();
        match read_merged_csv(&path) {
            Err(TableError::MissingColumn { column, .. }) => {
                assert_eq!(column, "mean_intensity_d0")
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn placeholders_are_written_as_na_and_read_back_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filled.csv");
        let real = merged_row("f1", 3, 0, 1, [1.0, 1.0], [1.0, 1.0, 1.0], 50.0);
        let records = vec![
            CellRecord {
                field: "f1".into(),
                well: 3,
                frame: Frame(0),
                cell_count: 1,
                measurement: Some(real.measurement),
            },
            CellRecord::placeholder("f1", 3, Frame(1)),
        ];
        write_records_csv(&path, &records).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("f1,3,1,na,na"));
        assert!(last.ends_with(",na,0"));

        assert_eq!(read_records_csv(&path).unwrap(), records);
    }

    #[test]
    fn invalid_number_names_row_and_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        let mut text = MERGED_COLUMNS.join(",");
        text.push('\n');
        text.push_str("f1,1,0,1,oops,0,1,1,1,10,1,1,1,1,a,b,c,d\n");
        std::fs::write(&path, text).unwrap();
        match read_merged_csv(&path) {
            Err(TableError::InvalidNumber { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "X");
            }
            other => panic!("expected InvalidNumber, got {:?}", other),
        }
    }

    #[test]
    fn channel_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d1.csv");
        let row = merged_row("f2", 5, 3, 2, [4.0, 8.0], [0.5, 1.5, 0.25], 99.0);
        let table = ChannelTable::new(Channel::D1, vec![row.channel_row(Channel::D1)]);
        write_channel_csv(&path, &table).unwrap();
        assert_eq!(read_channel_csv(&path).unwrap(), table);
    }
}
