//! Inner join of the three channel tables.

use std::collections::HashMap;

use super::{CellMeasurement, ChannelRow, ChannelTable, Frame, MergedRow, TableError};
use crate::channel::{Channel, ChannelParams};

type Key<'a> = (&'a str, u32, Frame, u32);

fn key(row: &ChannelRow) -> Key<'_> {
    (row.field.as_str(), row.well, row.frame, row.cell)
}

/// Bookkeeping of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MergeStats {
    /// Rows present in all three channels.
    pub joined: usize,
    /// Rows of each channel (d0, d1, d2) that did not make it into the join.
    pub dropped: [usize; 3],
    /// Joined rows whose shared columns (position, morphology, cell_ID)
    /// differ between channels. The d2 values are kept.
    pub shared_mismatch: usize,
}

/// First occurrence of every key; later duplicates are ignored.
fn index_rows(rows: &[ChannelRow]) -> HashMap<Key<'_>, usize> {
    let mut index = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        index.entry(key(row)).or_insert(i);
    }
    index
}

fn shared_columns_agree(a: &ChannelRow, b: &ChannelRow) -> bool {
    a.x == b.x && a.y == b.y && a.morphology == b.morphology && a.cell_id == b.cell_id
}

fn check_channel(table: &ChannelTable, expected: Channel) -> Result<(), TableError> {
    if table.channel != expected {
        return Err(TableError::ChannelMismatch {
            expected,
            found: table.channel,
        });
    }
    Ok(())
}

/// Join d0, d1 and d2 on (field, well, frame, cell).
///
/// Rows missing from any channel are dropped: a cell that was not detected
/// consistently across channels is not part of the merged table. Columns
/// common to all three tables are kept once (taken from d2); each channel
/// contributes its intensity and its label. Output is sorted by
/// (field, well, frame, cell).
pub fn merge_channel_tables(
    d0: &ChannelTable,
    d1: &ChannelTable,
    d2: &ChannelTable,
) -> Result<(Vec<MergedRow>, MergeStats), TableError> {
    check_channel(d0, Channel::D0)?;
    check_channel(d1, Channel::D1)?;
    check_channel(d2, Channel::D2)?;

    let idx0 = index_rows(&d0.rows);
    let idx1 = index_rows(&d1.rows);
    let idx2 = index_rows(&d2.rows);

    let mut stats = MergeStats::default();
    let mut merged = Vec::with_capacity(d2.rows.len());

    for (i, r2) in d2.rows.iter().enumerate() {
        let k = key(r2);
        if idx2.get(&k) != Some(&i) {
            continue;
        }
        let (Some(&i0), Some(&i1)) = (idx0.get(&k), idx1.get(&k)) else {
            continue;
        };
        let (r0, r1) = (&d0.rows[i0], &d1.rows[i1]);

        if !shared_columns_agree(r0, r2) || !shared_columns_agree(r1, r2) {
            stats.shared_mismatch += 1;
        }

        merged.push(MergedRow {
            field: r2.field.clone(),
            well: r2.well,
            frame: r2.frame,
            measurement: CellMeasurement {
                cell: r2.cell,
                x: r2.x,
                y: r2.y,
                intensity: ChannelParams::new(r0.mean_intensity, r1.mean_intensity, r2.mean_intensity),
                morphology: r2.morphology,
                labels: [r0.label.clone(), r1.label.clone(), r2.label.clone()],
                cell_id: r2.cell_id.clone(),
            },
        });
    }

    stats.joined = merged.len();
    stats.dropped = [
        d0.len() - stats.joined,
        d1.len() - stats.joined,
        d2.len() - stats.joined,
    ];

    merged.sort_by(|a, b| {
        (&a.field, a.well, a.frame, a.measurement.cell).cmp(&(
            &b.field,
            b.well,
            b.frame,
            b.measurement.cell,
        ))
    });

    tracing::info!("{} rows after merging d0/d1/d2", stats.joined);
    tracing::debug!(
        "Rows dropped by the join: d0={} d1={} d2={}",
        stats.dropped[0],
        stats.dropped[1],
        stats.dropped[2]
    );
    if stats.shared_mismatch > 0 {
        tracing::warn!(
            "{} merged rows have differing position/morphology across channels; kept d2 values",
            stats.shared_mismatch
        );
    }

    Ok((merged, stats))
}
