//! Cross-frame object matching.
//!
//! Points of several frames are pooled, sorted by position and grouped when
//! points of *different* frames lie within a distance threshold. The default
//! [`MatchMode::Greedy`] seeds a group at every ungrouped point and absorbs
//! ungrouped later points close to the seed. It is order dependent and not a
//! transitive closure. [`MatchMode::Transitive`] groups the connected
//! components of the "close and cross-frame" relation instead.

use std::cmp::Ordering;
use std::path::Path;

use crate::table::csv_io::{create_writer, finish, open_reader, write_row, Cells, Columns};
use crate::table::TableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Greedy,
    Transitive,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Inclusive distance limit in pixels.
    pub distance_threshold: f64,
    pub mode: MatchMode,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 50.0,
            mode: MatchMode::Greedy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// A point has a NaN or infinite coordinate.
    NonFinite { frame_index: usize, index: usize },
    /// Threshold is negative or not finite.
    InvalidThreshold(f64),
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { frame_index, index } => write!(
                f,
                "point {} of frame {} has a non-finite coordinate",
                index, frame_index
            ),
            Self::InvalidThreshold(t) => write!(f, "invalid distance threshold {}", t),
        }
    }
}

impl std::error::Error for MatchError {}

/// A pooled point and the group it was assigned to.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPoint {
    pub x: f64,
    pub y: f64,
    /// Position of the point's frame in the input sequence.
    pub frame_index: usize,
    /// Position of the point within its frame.
    pub index: usize,
    pub group: usize,
}

impl MatchedPoint {
    pub fn group_name(&self) -> String {
        format!("group_{}", self.group)
    }
}

fn sort_key(a: &MatchedPoint, b: &MatchedPoint) -> Ordering {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(a.frame_index.cmp(&b.frame_index))
        .then(a.index.cmp(&b.index))
}

fn close(a: &MatchedPoint, b: &MatchedPoint, threshold: f64) -> bool {
    a.frame_index != b.frame_index && (a.x - b.x).hypot(a.y - b.y) <= threshold
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Keeps the smaller index as root so roots are first members.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Assign a group to every point of `frames`.
///
/// Output is in sorted order: (x, y), ties by (frame_index, index).
pub fn match_points(frames: &[Vec<[f64; 2]>], config: &MatchConfig) -> Result<Vec<MatchedPoint>, MatchError> {
    let threshold = config.distance_threshold;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(MatchError::InvalidThreshold(threshold));
    }

    let mut points = Vec::with_capacity(frames.iter().map(Vec::len).sum());
    for (frame_index, frame) in frames.iter().enumerate() {
        for (index, &[x, y]) in frame.iter().enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(MatchError::NonFinite { frame_index, index });
            }
            points.push(MatchedPoint {
                x,
                y,
                frame_index,
                index,
                group: usize::MAX,
            });
        }
    }
    points.sort_by(sort_key);

    // Sorted by x: once dx exceeds the threshold no later point can be close.
    let n = points.len();
    let groups = match config.mode {
        MatchMode::Greedy => {
            let mut assigned: Vec<Option<usize>> = vec![None; n];
            let mut next = 0;
            for i in 0..n {
                if assigned[i].is_some() {
                    continue;
                }
                let g = next;
                next += 1;
                assigned[i] = Some(g);
                for j in i + 1..n {
                    if points[j].x - points[i].x > threshold {
                        break;
                    }
                    if assigned[j].is_none() && close(&points[i], &points[j], threshold) {
                        assigned[j] = Some(g);
                    }
                }
            }
            assigned.into_iter().map(|g| g.unwrap_or(usize::MAX)).collect::<Vec<_>>()
        }
        MatchMode::Transitive => {
            let mut set = DisjointSet::new(n);
            for i in 0..n {
                for j in i + 1..n {
                    if points[j].x - points[i].x > threshold {
                        break;
                    }
                    if close(&points[i], &points[j], threshold) {
                        set.union(i, j);
                    }
                }
            }
            let mut ids = vec![usize::MAX; n];
            let mut next = 0;
            (0..n)
                .map(|i| {
                    let root = set.find(i);
                    if ids[root] == usize::MAX {
                        ids[root] = next;
                        next += 1;
                    }
                    ids[root]
                })
                .collect()
        }
    };

    for (p, g) in points.iter_mut().zip(groups) {
        p.group = g;
    }
    let group_count = points.iter().map(|p| p.group + 1).max().unwrap_or(0);
    tracing::info!(
        "{} points from {} frames matched into {} groups ({:?})",
        n,
        frames.len(),
        group_count,
        config.mode
    );
    Ok(points)
}

/// Read the `X`/`Y` columns of one per-frame point table.
pub fn read_points_csv(path: &Path) -> Result<Vec<[f64; 2]>, TableError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| TableError::csv(path, e))?.clone();
    let cols = Columns::from_headers(path, &headers);
    let (xi, yi) = (cols.require("X")?, cols.require("Y")?);

    let mut points = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TableError::csv(path, e))?;
        let c = Cells {
            path,
            row: i + 1,
            record: &record,
        };
        points.push([c.f64(xi, "X")?, c.f64(yi, "Y")?]);
    }
    Ok(points)
}

pub fn write_matches_csv(path: &Path, points: &[MatchedPoint]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(&mut writer, path, ["X", "Y", "frame_index", "index", "Group"])?;
    for p in points {
        write_row(
            &mut writer,
            path,
            [
                p.x.to_string(),
                p.y.to_string(),
                p.frame_index.to_string(),
                p.index.to_string(),
                p.group_name(),
            ],
        )?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} matched points to {}", points.len(), path.display());
    Ok(())
}
