//! Effector-target distances within each image.

use std::collections::BTreeMap;
use std::path::Path;

use super::cell_type::{CellType, ClassifiedRecord};
use crate::table::csv_io::{create_writer, finish, write_row};
use crate::table::{Frame, TableError};

/// Distance between one effector and one target of the same image.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityRecord {
    pub field: String,
    pub frame: Frame,
    pub well: u32,
    pub effector_cell: u32,
    pub target_cell: u32,
    pub distance: f64,
}

/// Every E-T pair within each (field, frame, well), groups in key order and
/// pairs in table order. Groups without both types emit nothing.
pub fn effector_target_proximity(rows: &[ClassifiedRecord]) -> Vec<ProximityRecord> {
    let mut groups: BTreeMap<(&str, Frame, u32), (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, r) in rows.iter().enumerate() {
        let slot = match r.cell_type() {
            Some(CellType::Effector) => 0,
            Some(CellType::Target) => 1,
            _ => continue,
        };
        let g = groups
            .entry((r.record.field.as_str(), r.record.frame, r.record.well))
            .or_default();
        if slot == 0 {
            g.0.push(i);
        } else {
            g.1.push(i);
        }
    }

    let mut out = Vec::new();
    for ((field, frame, well), (effectors, targets)) in &groups {
        for &ei in effectors {
            for &ti in targets {
                let (Some(e), Some(t)) = (&rows[ei].record.measurement, &rows[ti].record.measurement)
                else {
                    continue;
                };
                let [ex, ey] = e.position();
                let [tx, ty] = t.position();
                out.push(ProximityRecord {
                    field: field.to_string(),
                    frame: *frame,
                    well: *well,
                    effector_cell: e.cell,
                    target_cell: t.cell,
                    distance: (ex - tx).hypot(ey - ty),
                });
            }
        }
    }
    tracing::info!("{} effector-target pairs measured", out.len());
    out
}

pub fn write_proximity_csv(path: &Path, pairs: &[ProximityRecord]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(
        &mut writer,
        path,
        ["field", "frame", "well", "E_cell_ID", "T_cell_ID", "E-T_distance"],
    )?;
    for p in pairs {
        write_row(
            &mut writer,
            path,
            [
                p.field.clone(),
                p.frame.0.to_string(),
                p.well.to_string(),
                p.effector_cell.to_string(),
                p.target_cell.to_string(),
                p.distance.to_string(),
            ],
        )?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} proximity rows to {}", pairs.len(), path.display());
    Ok(())
}
