//! Intensity/area thresholding into effector, target and death indicators.

use std::fmt;
use std::path::Path;

use crate::channel::ChannelParams;
use crate::table::csv_io::{create_writer, finish, fmt_flag, record_fields, record_header, write_row, NA};
use crate::table::{CellMeasurement, CellRecord, TableError};

/// Thresholds of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Mean-intensity thresholds: effector (d0), target (d1), death (d2).
    pub intensity: ChannelParams<f64>,
    /// Double-positive cells smaller than this lose the target flag.
    pub area_d0: Option<f64>,
    /// Double-negative cells larger than this gain the target flag.
    pub area_d1: Option<f64>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            intensity: ChannelParams::new(1.0, 1.0, 0.5),
            area_d0: None,
            area_d1: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Effector,
    Target,
    DoublePositive,
    DoubleNegative,
    Unknown,
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Effector => "E",
            CellType::Target => "T",
            CellType::DoublePositive => "dp",
            CellType::DoubleNegative => "dn",
            CellType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholded flags of one measured cell, after area correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellFlags {
    pub effector: bool,
    pub target: bool,
    pub death: bool,
}

impl CellFlags {
    pub fn from_intensity(m: &CellMeasurement, thresholds: &ChannelParams<f64>) -> Self {
        Self {
            effector: m.intensity.d0 > thresholds.d0,
            target: m.intensity.d1 > thresholds.d1,
            death: m.intensity.d2 > thresholds.d2,
        }
    }

    pub fn death_effector(&self) -> bool {
        self.effector && self.death
    }

    pub fn death_target(&self) -> bool {
        self.target && self.death
    }

    pub fn defined_effector(&self) -> bool {
        self.effector && !self.target
    }

    pub fn defined_target(&self) -> bool {
        self.target && !self.effector
    }

    pub fn double_pos(&self) -> bool {
        self.effector && self.target
    }

    pub fn double_neg(&self) -> bool {
        !self.effector && !self.target
    }

    pub fn cell_type(&self) -> CellType {
        if self.defined_effector() {
            CellType::Effector
        } else if self.defined_target() {
            CellType::Target
        } else if self.double_pos() {
            CellType::DoublePositive
        } else if self.double_neg() {
            CellType::DoubleNegative
        } else {
            CellType::Unknown
        }
    }

    /// Area correction; the masks are taken from `self` before any change.
    fn corrected(self, area: f64, config: &ClassifyConfig) -> Self {
        let mut out = self;
        if self.double_pos() && config.area_d0.is_some_and(|t| area < t) {
            out.target = false;
        }
        if self.double_neg() && config.area_d1.is_some_and(|t| area > t) {
            out.target = true;
        }
        out
    }
}

/// A record with its flags; placeholders have none.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub record: CellRecord,
    pub flags: Option<CellFlags>,
}

impl ClassifiedRecord {
    pub fn cell_type(&self) -> Option<CellType> {
        self.flags.map(|f| f.cell_type())
    }
}

/// Sizes of the four effector/target groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupSizes {
    pub double_pos: usize,
    pub effector: usize,
    pub double_neg: usize,
    pub target: usize,
}

impl GroupSizes {
    fn tally<'a>(flags: impl Iterator<Item = &'a CellFlags>) -> Self {
        let mut g = Self::default();
        for f in flags {
            match (f.effector, f.target) {
                (true, true) => g.double_pos += 1,
                (true, false) => g.effector += 1,
                (false, false) => g.double_neg += 1,
                (false, true) => g.target += 1,
            }
        }
        g
    }
}

impl fmt::Display for GroupSizes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "double positive {}, effector {}, double negative {}, target {}",
            self.double_pos, self.effector, self.double_neg, self.target
        )
    }
}

/// Threshold every measured record and apply the area correction.
pub fn classify_cells(records: Vec<CellRecord>, config: &ClassifyConfig) -> Vec<ClassifiedRecord> {
    let raw: Vec<Option<CellFlags>> = records
        .iter()
        .map(|r| {
            r.measurement
                .as_ref()
                .map(|m| CellFlags::from_intensity(m, &config.intensity))
        })
        .collect();
    let before = GroupSizes::tally(raw.iter().flatten());

    let classified: Vec<ClassifiedRecord> = records
        .into_iter()
        .zip(raw)
        .map(|(record, flags)| {
            let flags = match (flags, &record.measurement) {
                (Some(f), Some(m)) => Some(f.corrected(m.morphology.area, config)),
                _ => None,
            };
            ClassifiedRecord { record, flags }
        })
        .collect();
    let after = GroupSizes::tally(classified.iter().filter_map(|c| c.flags.as_ref()));

    tracing::info!("Before correction: {}", before);
    tracing::info!("After correction: {}", after);
    classified
}

const FLAG_COLUMNS: [&str; 10] = [
    "effector",
    "target",
    "death",
    "death_effector",
    "death_target",
    "defined_effector",
    "defined_target",
    "double_pos",
    "double_neg",
    "cell_type",
];

fn flag_fields(flags: Option<CellFlags>) -> Vec<String> {
    let Some(f) = flags else {
        return vec![NA.to_string(); FLAG_COLUMNS.len()];
    };
    let mut out: Vec<String> = [
        f.effector,
        f.target,
        f.death,
        f.death_effector(),
        f.death_target(),
        f.defined_effector(),
        f.defined_target(),
        f.double_pos(),
        f.double_neg(),
    ]
    .into_iter()
    .map(|b| fmt_flag(b).to_string())
    .collect();
    out.push(f.cell_type().to_string());
    out
}

/// Write the record table extended by the indicator and `cell_type` columns.
pub fn write_classified_csv(path: &Path, rows: &[ClassifiedRecord]) -> Result<(), TableError> {
    let mut writer = create_writer(path)?;
    let header = record_header().into_iter().chain(FLAG_COLUMNS);
    write_row(&mut writer, path, header)?;
    for r in rows {
        let mut fields = record_fields(&r.record);
        fields.extend(flag_fields(r.flags));
        write_row(&mut writer, path, fields)?;
    }
    finish(writer, path)?;
    tracing::info!("Saved {} classified rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Frame;
    use crate::test_utils::measurement;

    fn record(intensity: [f64; 3], area: f64) -> CellRecord {
        CellRecord {
            field: "f1".into(),
            well: 1,
            frame: Frame(0),
            cell_count: 1,
            measurement: Some(measurement(1, [0.0, 0.0], intensity, area)),
        }
    }

    #[test]
    fn effector_with_death() {
        let out = classify_cells(vec![record([2.0, 0.1, 0.9], 100.0)], &ClassifyConfig::default());
        let f = out[0].flags.unwrap();
        assert!(f.effector);
        assert!(!f.target);
        assert!(f.death);
        assert!(f.death_effector());
        assert!(!f.death_target());
        assert_eq!(out[0].cell_type(), Some(CellType::Effector));
    }

    #[test]
    fn area_correction_uses_uncorrected_masks() {
        let config = ClassifyConfig {
            area_d0: Some(50.0),
            area_d1: Some(150.0),
            ..ClassifyConfig::default()
        };
        let out = classify_cells(
            vec![
                // small double positive -> effector
                record([2.0, 2.0, 0.0], 40.0),
                // large double positive stays
                record([2.0, 2.0, 0.0], 60.0),
                // large double negative -> target
                record([0.0, 0.0, 0.0], 200.0),
                // small double negative stays
                record([0.0, 0.0, 0.0], 100.0),
            ],
            &config,
        );
        let types: Vec<_> = out.iter().map(|c| c.cell_type().unwrap()).collect();
        assert_eq!(
            types,
            vec![
                CellType::Effector,
                CellType::DoublePositive,
                CellType::Target,
                CellType::DoubleNegative
            ]
        );
    }

    #[test]
    fn correction_disabled_without_area_thresholds() {
        let out = classify_cells(vec![record([2.0, 2.0, 0.0], 1.0)], &ClassifyConfig::default());
        assert_eq!(out[0].cell_type(), Some(CellType::DoublePositive));
    }

    #[test]
    fn death_is_never_corrected() {
        let config = ClassifyConfig {
            area_d1: Some(10.0),
            ..ClassifyConfig::default()
        };
        let out = classify_cells(vec![record([0.0, 0.0, 0.6], 20.0)], &config);
        let f = out[0].flags.unwrap();
        assert!(f.target);
        assert!(f.death);
        assert!(f.death_target());
    }

    #[test]
    fn placeholders_carry_na_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classified.csv");
        let out = classify_cells(
            vec![
                record([2.0, 0.1, 0.9], 100.0),
                CellRecord::placeholder("f1", 1, Frame(1)),
            ],
            &ClassifyConfig::default(),
        );
        assert!(out[1].flags.is_none());
        write_classified_csv(&path, &out).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("cell_count,effector,target,death,death_effector,death_target,defined_effector,defined_target,double_pos,double_neg,cell_type"));
        assert!(lines[1].ends_with(",1,1,0,1,1,0,1,0,0,0,E"));
        assert!(lines[2].ends_with(",0,na,na,na,na,na,na,na,na,na,na"));
    }
}
