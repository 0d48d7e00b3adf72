//! Frame-to-frame displacement of wells holding a single cell.

use std::collections::BTreeMap;
use std::path::Path;

use crate::table::csv_io::{create_writer, finish, fmt_opt, record_fields, record_header, write_row};
use crate::table::{CellRecord, TableError};

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedRecord {
    pub record: CellRecord,
    /// Displacement from the previous single-cell row of the well; `None`
    /// for the first one.
    pub moving_speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WellSpeed {
    pub field: String,
    pub well: u32,
    pub mean_speed: Option<f64>,
}

/// Speeds of measured rows with `cell_count == 1`, sorted by
/// (field, well, frame).
pub fn moving_speeds<'a, I>(records: I) -> Vec<SpeedRecord>
where
    I: IntoIterator<Item = &'a CellRecord>,
{
    let mut single: Vec<&CellRecord> = records
        .into_iter()
        .filter(|r| r.cell_count == 1 && r.measurement.is_some())
        .collect();
    single.sort_by(|a, b| (&a.field, a.well, a.frame).cmp(&(&b.field, b.well, b.frame)));

    let mut out: Vec<SpeedRecord> = Vec::with_capacity(single.len());
    let mut prev: Option<&CellRecord> = None;
    for r in single {
        let moving_speed = match (prev, &r.measurement) {
            (Some(p), Some(m)) if p.field == r.field && p.well == r.well => {
                p.measurement.as_ref().map(|pm| {
                    let [x0, y0] = pm.position();
                    let [x1, y1] = m.position();
                    round2((x1 - x0).hypot(y1 - y0))
                })
            }
            _ => None,
        };
        out.push(SpeedRecord {
            record: r.clone(),
            moving_speed,
        });
        prev = Some(r);
    }
    tracing::info!("{} single-cell rows with speed", out.len());
    out
}

/// Mean of the defined speeds per (field, well), rounded to 2 decimals.
pub fn mean_speeds(speeds: &[SpeedRecord]) -> Vec<WellSpeed> {
    let mut acc: BTreeMap<(&str, u32), (f64, usize)> = BTreeMap::new();
    for s in speeds {
        let e = acc
            .entry((s.record.field.as_str(), s.record.well))
            .or_insert((0.0, 0));
        if let Some(v) = s.moving_speed {
            e.0 += v;
            e.1 += 1;
        }
    }
    acc.into_iter()
        .map(|((field, well), (sum, n))| WellSpeed {
            field: field.to_string(),
            well,
            mean_speed: (n > 0).then(|| round2(sum / n as f64)),
        })
        .collect()
}

pub fn write_speeds_csv(path: &Path, speeds: &[SpeedRecord]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(
        &mut writer,
        path,
        record_header().into_iter().chain(["moving_speed"]),
    )?;
    for s in speeds {
        let mut fields = record_fields(&s.record);
        fields.push(fmt_opt(s.moving_speed));
        write_row(&mut writer, path, fields)?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} speed rows to {}", speeds.len(), path.display());
    Ok(())
}

pub fn write_mean_speeds_csv(path: &Path, wells: &[WellSpeed]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(&mut writer, path, ["field", "well", "moving_speed"])?;
    for w in wells {
        write_row(
            &mut writer,
            path,
            [w.field.clone(), w.well.to_string(), fmt_opt(w.mean_speed)],
        )?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} mean speeds to {}", wells.len(), path.display());
    Ok(())
}
