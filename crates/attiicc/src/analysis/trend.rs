//! Change-point encoding of per-well cell counts and event classification.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::table::csv_io::{create_writer, finish, write_row};
use crate::table::{CellRecord, Frame, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }
}

/// Biological event read off a count trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Event {
    CellDeath,
    CellDivision,
    NoEvent,
    NoChange,
    MixedEvent,
}

impl Event {
    /// Classify a serialized trend-2 string.
    ///
    /// Precedence: decrease only, increase only, `stable`, neither direction,
    /// then both directions.
    pub fn classify(trend: &str) -> Self {
        let inc = trend.contains("increase");
        let dec = trend.contains("decrease");
        if dec && !inc {
            Event::CellDeath
        } else if inc && !dec {
            Event::CellDivision
        } else if trend.contains("stable") {
            Event::NoEvent
        } else if !inc && !dec {
            Event::NoChange
        } else {
            Event::MixedEvent
        }
    }

    /// Same precedence as [`Event::classify`], evaluated on the transitions
    /// themselves so field names cannot leak into the decision.
    pub fn from_transitions(transitions: &[(Frame, Direction)]) -> Self {
        let inc = transitions.iter().any(|(_, d)| *d == Direction::Increase);
        let dec = transitions.iter().any(|(_, d)| *d == Direction::Decrease);
        match (inc, dec) {
            (false, true) => Event::CellDeath,
            (true, false) => Event::CellDivision,
            (false, false) => Event::NoChange,
            (true, true) => Event::MixedEvent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Event::CellDeath => "Cell Death",
            Event::CellDivision => "Cell Division",
            Event::NoEvent => "No Event",
            Event::NoChange => "No Change",
            Event::MixedEvent => "Mixed Event",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change points of one well's count series.
#[derive(Debug, Clone, PartialEq)]
pub struct WellTrend {
    pub field: String,
    pub well: u32,
    /// Frames where the count was first seen or changed, with the new count.
    pub changes: Vec<(Frame, u32)>,
    /// Direction of every change after the first retained count.
    pub transitions: Vec<(Frame, Direction)>,
}

impl WellTrend {
    fn prefix(&self) -> String {
        format!("{}_well_{}_", self.field, self.well)
    }

    /// `{field}_well_{well}_p0_0_p2_1...`
    pub fn trend_1(&self) -> String {
        let body: Vec<String> = self
            .changes
            .iter()
            .map(|(f, c)| format!("{}_{}", f, c))
            .collect();
        self.prefix() + &body.join("_")
    }

    /// `{field}_well_{well}_p2_increase...`; only the prefix when the count
    /// never changed.
    pub fn trend_2(&self) -> String {
        let body: Vec<String> = self
            .transitions
            .iter()
            .map(|(f, d)| format!("{}_{}", f, d.as_str()))
            .collect();
        self.prefix() + &body.join("_")
    }

    /// Event of this well.
    ///
    /// Agrees with [`Event::classify`] on [`WellTrend::trend_2`] whenever the
    /// field name carries no direction word. Derived trends never record a
    /// `stable` transition, so [`Event::NoEvent`] only comes from classifying
    /// external trend strings.
    pub fn event(&self) -> Event {
        Event::from_transitions(&self.transitions)
    }
}

/// Build one [`WellTrend`] per (field, well) over the `required` frames.
///
/// The count of a frame is the `cell_count` of its rows (0 for placeholders).
/// Wells with rows in fewer than two required frames are skipped.
pub fn derive_trends(records: &[CellRecord], required: &[Frame]) -> Vec<WellTrend> {
    let mut series: BTreeMap<(&str, u32), BTreeMap<Frame, u32>> = BTreeMap::new();
    for r in records {
        let counts = series.entry((r.field.as_str(), r.well)).or_default();
        let c = counts.entry(r.frame).or_insert(0);
        *c = (*c).max(r.cell_count);
    }

    let mut trends = Vec::with_capacity(series.len());
    let mut skipped = 0usize;
    for ((field, well), counts) in &series {
        let observed = required.iter().filter(|f| counts.contains_key(f)).count();
        if observed < 2 {
            skipped += 1;
            continue;
        }

        let mut trend = WellTrend {
            field: field.to_string(),
            well: *well,
            changes: Vec::new(),
            transitions: Vec::new(),
        };
        let mut last: Option<u32> = None;
        for &frame in required {
            let Some(&count) = counts.get(&frame) else {
                continue;
            };
            match last {
                None => trend.changes.push((frame, count)),
                Some(prev) if prev != count => {
                    trend.changes.push((frame, count));
                    let dir = if count > prev {
                        Direction::Increase
                    } else {
                        Direction::Decrease
                    };
                    trend.transitions.push((frame, dir));
                }
                Some(_) => {}
            }
            last = Some(count);
        }
        trends.push(trend);
    }

    tracing::info!("{} well trends derived", trends.len());
    if skipped > 0 {
        tracing::debug!("{} wells skipped with fewer than two observed frames", skipped);
    }
    trends
}

/// Write `field, well, trend_1, trend_2, event`.
pub fn write_trends_csv(path: &Path, trends: &[WellTrend]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    write_row(&mut writer, path, ["field", "well", "trend_1", "trend_2", "event"])?;
    for t in trends {
        write_row(
            &mut writer,
            path,
            [
                t.field.clone(),
                t.well.to_string(),
                t.trend_1(),
                t.trend_2(),
                t.event().to_string(),
            ],
        )?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} trends to {}", trends.len(), path.display());
    Ok(())
}
