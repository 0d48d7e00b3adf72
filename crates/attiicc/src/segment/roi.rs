//! ImageJ ROI archives.
//!
//! Every object is stored as one polygon `.roi` entry: a 64-byte big-endian
//! header (`Iout`, version, type, bounds, point count) followed by the x then
//! y coordinates relative to the bounding box.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::{Roi, SegmentError};
use crate::workspace::{files_with_extensions, mirror_path, walk_dirs};

const MAGIC: &[u8; 4] = b"Iout";
const VERSION: i16 = 227;
const HEADER_LEN: usize = 64;
const TYPE_POLYGON: u8 = 0;

// Header offsets.
const OFF_VERSION: usize = 4;
const OFF_TYPE: usize = 6;
const OFF_TOP: usize = 8;
const OFF_LEFT: usize = 10;
const OFF_BOTTOM: usize = 12;
const OFF_RIGHT: usize = 14;
const OFF_N: usize = 16;

fn put_i16(buf: &mut [u8], at: usize, v: i16) {
    buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
}

fn get_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([buf[at], buf[at + 1]])
}

fn to_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode one polygon as an ImageJ `.roi` record.
pub fn encode_polygon(polygon: &[[i32; 2]]) -> Vec<u8> {
    let n = polygon.len().min(u16::MAX as usize);
    let pts = &polygon[..n];
    let left = pts.iter().map(|p| p[0]).min().unwrap_or(0);
    let top = pts.iter().map(|p| p[1]).min().unwrap_or(0);
    let right = pts.iter().map(|p| p[0]).max().unwrap_or(0);
    let bottom = pts.iter().map(|p| p[1]).max().unwrap_or(0);

    let mut buf = vec![0u8; HEADER_LEN + 4 * n];
    buf[..4].copy_from_slice(MAGIC);
    put_i16(&mut buf, OFF_VERSION, VERSION);
    buf[OFF_TYPE] = TYPE_POLYGON;
    put_i16(&mut buf, OFF_TOP, to_i16(top));
    put_i16(&mut buf, OFF_LEFT, to_i16(left));
    put_i16(&mut buf, OFF_BOTTOM, to_i16(bottom));
    put_i16(&mut buf, OFF_RIGHT, to_i16(right));
    buf[OFF_N..OFF_N + 2].copy_from_slice(&(n as u16).to_be_bytes());

    for (i, p) in pts.iter().enumerate() {
        put_i16(&mut buf, HEADER_LEN + 2 * i, to_i16(p[0] - left));
        put_i16(&mut buf, HEADER_LEN + 2 * (n + i), to_i16(p[1] - top));
    }
    buf
}

/// Decode a polygon record written by [`encode_polygon`].
pub fn decode_polygon(buf: &[u8]) -> Option<Vec<[i32; 2]>> {
    if buf.len() < HEADER_LEN || &buf[..4] != MAGIC || buf[OFF_TYPE] != TYPE_POLYGON {
        return None;
    }
    let top = get_i16(buf, OFF_TOP) as i32;
    let left = get_i16(buf, OFF_LEFT) as i32;
    let n = u16::from_be_bytes([buf[OFF_N], buf[OFF_N + 1]]) as usize;
    if buf.len() < HEADER_LEN + 4 * n {
        return None;
    }
    Some(
        (0..n)
            .map(|i| {
                let x = get_i16(buf, HEADER_LEN + 2 * i) as i32 + left;
                let y = get_i16(buf, HEADER_LEN + 2 * (n + i)) as i32 + top;
                [x, y]
            })
            .collect(),
    )
}

/// Entry name `<label>-<y>-<x>.roi`, with the polygon's first point.
fn entry_name(roi: &Roi) -> String {
    let [x, y] = roi.polygon.first().copied().unwrap_or([0, 0]);
    format!("{:04}-{:04}-{:04}.roi", roi.label, y.max(0), x.max(0))
}

fn zip_err(path: &Path, source: zip::result::ZipError) -> SegmentError {
    SegmentError::Zip {
        path: path.to_path_buf(),
        source,
    }
}

fn io_err(path: &Path, source: std::io::Error) -> SegmentError {
    SegmentError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `rois` to a zip archive at `path`; no ROIs give a valid empty archive.
pub fn write_roi_archive(path: &Path, rois: &[Roi]) -> Result<(), SegmentError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for roi in rois {
        zip.start_file(entry_name(roi), options)
            .map_err(|e| zip_err(path, e))?;
        zip.write_all(&encode_polygon(&roi.polygon))
            .map_err(|e| io_err(path, e))?;
    }
    zip.finish().map_err(|e| zip_err(path, e))?;
    Ok(())
}

/// Read every polygon entry of an archive. The label is taken from the
/// leading number of the entry name.
pub fn read_roi_archive(path: &Path) -> Result<Vec<Roi>, SegmentError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_err(path, e))?;
    let mut rois = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_err(path, e))?;
        let label = entry
            .name()
            .split('-')
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or((i + 1).min(u16::MAX as usize) as u16);
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(|e| io_err(path, e))?;
        match decode_polygon(&buf) {
            Some(polygon) => rois.push(Roi { label, polygon }),
            None => tracing::warn!("{}: entry {} is not a polygon ROI", path.display(), entry.name()),
        }
    }
    Ok(rois)
}

/// True when the archive has no entries.
pub fn is_archive_empty(path: &Path) -> Result<bool, SegmentError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let archive = zip::ZipArchive::new(file).map_err(|e| zip_err(path, e))?;
    Ok(archive.len() == 0)
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Across filesystems rename fails.
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

/// Move every empty `.zip` below `source` to the same relative location
/// below `destination`. Unreadable archives are logged and left in place.
/// Returns the new paths.
pub fn quarantine_empty_archives(source: &Path, destination: &Path) -> Result<Vec<PathBuf>, SegmentError> {
    let dirs = walk_dirs(source).map_err(|e| io_err(source, e))?;
    let mut moved = Vec::new();
    for dir in dirs {
        if dir.starts_with(destination) {
            continue;
        }
        let files = match files_with_extensions(&dir, &["zip"]) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                continue;
            }
        };
        for zip_path in files {
            match is_archive_empty(&zip_path) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Cannot inspect {}: {}", zip_path.display(), e);
                    continue;
                }
            }
            let target = mirror_path(&zip_path, source, destination);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            move_file(&zip_path, &target).map_err(|e| io_err(&zip_path, e))?;
            tracing::info!("Moved empty ROI archive {} to {}", zip_path.display(), target.display());
            moved.push(target);
        }
    }
    Ok(moved)
}
