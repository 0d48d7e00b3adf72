use std::collections::HashMap;

use crate::table::{CellRecord, Frame, MergedRow};

/// Attach `cell_count` to every merged row.
///
/// The count of a (field, frame, well) is the largest local cell index seen
/// in it; cells are numbered 1..n per image by the measurement export, so
/// this stays the detected count even when the merge dropped some rows.
/// Output is sorted by (field, well, frame), ties kept in input order.
pub fn count_cells(rows: Vec<MergedRow>) -> Vec<CellRecord> {
    let mut max_cell: HashMap<(String, Frame, u32), u32> = HashMap::new();
    for r in &rows {
        let entry = max_cell
            .entry((r.field.clone(), r.frame, r.well))
            .or_insert(0);
        *entry = (*entry).max(r.measurement.cell);
    }

    let mut records: Vec<CellRecord> = rows
        .into_iter()
        .map(|r| {
            let cell_count = max_cell
                .get(&(r.field.clone(), r.frame, r.well))
                .copied()
                .unwrap_or(0);
            CellRecord {
                field: r.field,
                well: r.well,
                frame: r.frame,
                cell_count,
                measurement: Some(r.measurement),
            }
        })
        .collect();

    records.sort_by(|a, b| (&a.field, a.well, a.frame).cmp(&(&b.field, b.well, b.frame)));
    tracing::info!("{} groups counted over {} rows", max_cell.len(), records.len());
    records
}
