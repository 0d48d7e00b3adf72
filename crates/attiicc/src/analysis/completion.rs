//! Temporal completion: one row per required frame for every well.

use std::collections::{BTreeMap, BTreeSet};

use crate::table::{CellRecord, Frame};

/// Counters reported by [`fill_missing_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct CompletionStats {
    /// Number of (field, well) pairs visited.
    pub wells: usize,
    /// Number of placeholder rows synthesised.
    pub placeholders: usize,
}

/// Sorted unique frames observed anywhere in `records`.
pub fn observed_frames(records: &[CellRecord]) -> Vec<Frame> {
    records
        .iter()
        .map(|r| r.frame)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Add a placeholder row (no measurement, count 0) for every required frame a
/// (field, well) has no row for.
///
/// `required` defaults to [`observed_frames`]. Output is the union of real and
/// synthetic rows sorted by (field, well, frame).
pub fn fill_missing_frames(
    records: Vec<CellRecord>,
    required: Option<&[Frame]>,
) -> (Vec<CellRecord>, CompletionStats) {
    let required: Vec<Frame> = match required {
        Some(frames) => frames.to_vec(),
        None => observed_frames(&records),
    };

    let mut present: BTreeMap<(String, u32), BTreeSet<Frame>> = BTreeMap::new();
    for r in &records {
        present
            .entry((r.field.clone(), r.well))
            .or_default()
            .insert(r.frame);
    }

    let mut stats = CompletionStats {
        wells: present.len(),
        placeholders: 0,
    };
    let mut out = records;
    for ((field, well), frames) in &present {
        let mut added = BTreeSet::new();
        let missing: Vec<Frame> = required
            .iter()
            .copied()
            .filter(|f| !frames.contains(f) && added.insert(*f))
            .collect();
        tracing::debug!(
            "Field {}, well {}: {} frames present, missing {:?}",
            field,
            well,
            frames.len(),
            missing.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        stats.placeholders += missing.len();
        out.extend(missing.into_iter().map(|f| CellRecord::placeholder(field, *well, f)));
    }

    out.sort_by(|a, b| (&a.field, a.well, a.frame).cmp(&(&b.field, b.well, b.frame)));
    tracing::info!(
        "Completed {} wells over {} frames: {} placeholder rows added",
        stats.wells,
        required.len(),
        stats.placeholders
    );
    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cell_record;

    fn frames_of(records: &[CellRecord], field: &str, well: u32) -> Vec<u32> {
        let set: BTreeSet<u32> = records
            .iter()
            .filter(|r| r.field == field && r.well == well)
            .map(|r| r.frame.0)
            .collect();
        set.into_iter().collect()
    }

    #[test]
    fn every_well_gets_every_required_frame_once() {
        let records = vec![
            cell_record("f1", 1, 0, 1, 1, [0.0, 0.0]),
            cell_record("f1", 1, 2, 1, 2, [0.0, 0.0]),
            cell_record("f1", 1, 2, 2, 2, [1.0, 0.0]),
            cell_record("f2", 4, 1, 1, 1, [0.0, 0.0]),
        ];
        let required = [Frame(0), Frame(1), Frame(2), Frame(3)];
        let (out, stats) = fill_missing_frames(records, Some(&required));

        assert_eq!(stats.wells, 2);
        assert_eq!(stats.placeholders, 2 + 3);
        for (field, well) in [("f1", 1), ("f2", 4)] {
            assert_eq!(frames_of(&out, field, well), vec![0, 1, 2, 3]);
            let placeholders = out
                .iter()
                .filter(|r| r.field == field && r.well == well && r.is_placeholder())
                .count();
            let real_frames = out
                .iter()
                .filter(|r| r.field == field && r.well == well && !r.is_placeholder())
                .map(|r| r.frame)
                .collect::<BTreeSet<_>>()
                .len();
            assert_eq!(placeholders + real_frames, required.len());
        }
    }

    #[test]
    fn placeholders_have_zero_count_and_sorted_position() {
        let records = vec![
            cell_record("f1", 1, 0, 1, 1, [0.0, 0.0]),
            cell_record("f1", 1, 2, 1, 1, [0.0, 0.0]),
        ];
        let (out, _) = fill_missing_frames(records, None);
        // Observed frames are {0, 2}; nothing is missing.
        assert_eq!(out.len(), 2);

        let (out, _) = fill_missing_frames(out, Some(&[Frame(0), Frame(1), Frame(2)]));
        assert_eq!(out.len(), 3);
        assert!(out[1].is_placeholder());
        assert_eq!(out[1].frame, Frame(1));
        assert_eq!(out[1].cell_count, 0);
    }

    #[test]
    fn duplicate_required_frames_yield_one_placeholder() {
        let records = vec![cell_record("f1", 1, 0, 1, 1, [0.0, 0.0])];
        let (out, stats) = fill_missing_frames(records, Some(&[Frame(1), Frame(1), Frame(0)]));
        assert_eq!(stats.placeholders, 1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn completion_is_idempotent() {
        let records = vec![
            cell_record("f1", 1, 0, 1, 1, [0.0, 0.0]),
            cell_record("f1", 2, 3, 1, 1, [0.0, 0.0]),
        ];
        let required = [Frame(0), Frame(1), Frame(2), Frame(3)];
        let (once, _) = fill_missing_frames(records, Some(&required));
        let (twice, stats) = fill_missing_frames(once.clone(), Some(&required));
        assert_eq!(stats.placeholders, 0);
        assert_eq!(once, twice);
    }
}
