//! Shared fixtures for unit tests: synthetic exports, rows and images.

use image::{ImageBuffer, Luma};

use crate::channel::ChannelParams;
use crate::table::{CellMeasurement, CellRecord, ChannelRow, Frame, MergedRow, Morphology};

pub(crate) type Gray16 = ImageBuffer<Luma<u16>, Vec<u16>>;

/// One data line of a raw ten-column measurement export.
pub(crate) fn raw_line(cell: u32, label: &str, x: f64, y: f64) -> String {
    format!("{},{},100,1.5,{},{},0.9,1.1,0.9,0.95", cell, label, x, y)
}

/// A raw export with the instrument header and the given data lines.
pub(crate) fn raw_export(lines: &[String]) -> String {
    let mut s = String::from(" ,Label,Area,Mean,X,Y,Circ.,AR,Round,Solidity\n");
    for line in lines {
        s.push_str(line);
        s.push('\n');
    }
    s
}

fn morphology(area: f64) -> Morphology {
    Morphology {
        area,
        circularity: 0.9,
        aspect_ratio: 1.1,
        roundness: 0.9,
        solidity: 0.95,
    }
}

pub(crate) fn channel_row(
    field: &str,
    well: u32,
    frame: u32,
    cell: u32,
    xy: [f64; 2],
    intensity: f64,
) -> ChannelRow {
    ChannelRow {
        field: field.to_string(),
        frame: Frame(frame),
        well,
        cell,
        x: xy[0],
        y: xy[1],
        mean_intensity: intensity,
        morphology: morphology(100.0),
        cell_id: format!("{:04}", cell),
        label: format!("p{:02}_0_A_{}_{}:{:04}", frame, field, well, cell),
    }
}

pub(crate) fn measurement(cell: u32, xy: [f64; 2], intensity: [f64; 3], area: f64) -> CellMeasurement {
    CellMeasurement {
        cell,
        x: xy[0],
        y: xy[1],
        intensity: ChannelParams::new(intensity[0], intensity[1], intensity[2]),
        morphology: morphology(area),
        labels: [
            format!("d0:{:04}", cell),
            format!("d1:{:04}", cell),
            format!("d2:{:04}", cell),
        ],
        cell_id: format!("{:04}", cell),
    }
}

pub(crate) fn merged_row(
    field: &str,
    well: u32,
    frame: u32,
    cell: u32,
    xy: [f64; 2],
    intensity: [f64; 3],
    area: f64,
) -> MergedRow {
    MergedRow {
        field: field.to_string(),
        well,
        frame: Frame(frame),
        measurement: measurement(cell, xy, intensity, area),
    }
}

/// A real (non-placeholder) record at `xy`.
pub(crate) fn cell_record(
    field: &str,
    well: u32,
    frame: u32,
    cell: u32,
    cell_count: u32,
    xy: [f64; 2],
) -> CellRecord {
    CellRecord {
        field: field.to_string(),
        well,
        frame: Frame(frame),
        cell_count,
        measurement: Some(measurement(cell, xy, [0.0, 0.0, 0.0], 100.0)),
    }
}

/// Records for one well whose per-frame counts follow `counts`.
///
/// A zero count becomes a placeholder row.
pub(crate) fn well_series(field: &str, well: u32, counts: &[u32]) -> Vec<CellRecord> {
    let mut out = Vec::new();
    for (frame, &count) in counts.iter().enumerate() {
        if count == 0 {
            out.push(CellRecord::placeholder(field, well, Frame(frame as u32)));
            continue;
        }
        for cell in 1..=count {
            out.push(cell_record(field, well, frame as u32, cell, count, [cell as f64, 0.0]));
        }
    }
    out
}

/// Flat background with bright square "cells".
pub(crate) fn draw_cells_image(w: u32, h: u32, squares: &[([u32; 2], u32)], bg: u16, fg: u16) -> Gray16 {
    let mut img = Gray16::from_pixel(w, h, Luma([bg]));
    for &([x0, y0], side) in squares {
        for y in y0..(y0 + side).min(h) {
            for x in x0..(x0 + side).min(w) {
                img.put_pixel(x, y, Luma([fg]));
            }
        }
    }
    img
}
