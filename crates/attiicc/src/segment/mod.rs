//! Cell segmentation: label masks and ROI archives per image folder.
//!
//! The model is behind the [`Segmenter`] trait. [`ThresholdSegmenter`] is a
//! classical backend (Otsu threshold + 8-connected components) that needs no
//! trained weights.

mod roi;

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};
use rayon::prelude::*;

use crate::channel::Channel;
use crate::preprocess::Gray16;
use crate::workspace::{dir_name, files_with_extensions, walk_dirs};

pub use roi::{
    decode_polygon, encode_polygon, is_archive_empty, quarantine_empty_archives, read_roi_archive,
    write_roi_archive,
};

/// Image extensions picked up by [`segment_folder`].
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

/// One segmented object: its mask label and outer boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roi {
    pub label: u16,
    /// Closed boundary in pixel coordinates (x, y).
    pub polygon: Vec<[i32; 2]>,
}

/// Output of a segmentation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// 0 is background; objects are labelled 1..=n.
    pub mask: Gray16,
    pub rois: Vec<Roi>,
}

#[derive(Debug)]
pub enum SegmentError {
    Io { path: PathBuf, source: std::io::Error },
    Image { path: PathBuf, source: image::ImageError },
    Zip { path: PathBuf, source: zip::result::ZipError },
    /// More objects than a 16-bit mask can label.
    TooManyObjects(usize),
    /// Failure reported by a model backend.
    Backend(String),
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Image { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Zip { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::TooManyObjects(n) => write!(f, "{} objects do not fit a 16-bit label mask", n),
            Self::Backend(msg) => write!(f, "segmentation backend failed: {}", msg),
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Image { source, .. } => Some(source),
            Self::Zip { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A segmentation model.
///
/// Implementations are shared across worker threads when a tree is
/// processed, hence `Sync`.
pub trait Segmenter: Sync {
    fn segment(&self, image: &Gray16, channel: Option<Channel>) -> Result<Segmentation, SegmentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Components smaller than this many pixels are discarded.
    pub min_area_px: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self { min_area_px: 20 }
    }
}

/// Otsu threshold on the min-max normalised image, 8-connected components.
#[derive(Debug, Clone, Default)]
pub struct ThresholdSegmenter {
    pub config: ThresholdConfig,
}

impl ThresholdSegmenter {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }
}

fn normalize_to_u8(image: &Gray16) -> Option<GrayImage> {
    let lo = image.as_raw().iter().copied().min()?;
    let hi = image.as_raw().iter().copied().max()?;
    if hi == lo {
        return None;
    }
    let scale = 255.0 / (hi - lo) as f32;
    Some(ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([((image.get_pixel(x, y).0[0] - lo) as f32 * scale).round() as u8])
    }))
}

#[derive(Debug, Clone, Copy)]
struct Component {
    area: u32,
    min: [u32; 2],
    max: [u32; 2],
}

/// Outer contour of label `label` inside its bounding box.
fn outer_polygon(mask: &Gray16, label: u16, c: &Component) -> Vec<[i32; 2]> {
    // One pixel of padding so the contour tracer sees a closed border.
    let (w, h) = (c.max[0] - c.min[0] + 3, c.max[1] - c.min[1] + 3);
    let sub = GrayImage::from_fn(w, h, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= w - 2 && y <= h - 2;
        let on = inside && mask.get_pixel(c.min[0] + x - 1, c.min[1] + y - 1).0[0] == label;
        Luma([if on { 255 } else { 0 }])
    });
    let (ox, oy) = (c.min[0] as i32 - 1, c.min[1] as i32 - 1);
    find_contours::<i32>(&sub)
        .into_iter()
        .find(|ct| ct.border_type == BorderType::Outer && ct.parent.is_none())
        .map(|ct| ct.points.iter().map(|p| [p.x + ox, p.y + oy]).collect())
        .unwrap_or_default()
}

impl Segmenter for ThresholdSegmenter {
    fn segment(&self, image: &Gray16, _channel: Option<Channel>) -> Result<Segmentation, SegmentError> {
        let (w, h) = image.dimensions();
        let Some(norm) = normalize_to_u8(image) else {
            return Ok(Segmentation {
                mask: Gray16::new(w, h),
                rois: Vec::new(),
            });
        };
        let level = imageproc::contrast::otsu_level(&norm);
        let binary = GrayImage::from_fn(w, h, |x, y| {
            Luma([if norm.get_pixel(x, y).0[0] > level { 255 } else { 0 }])
        });
        let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

        let mut comps: Vec<Option<Component>> = Vec::new();
        for (x, y, p) in labels.enumerate_pixels() {
            let l = p.0[0] as usize;
            if l == 0 {
                continue;
            }
            if comps.len() <= l {
                comps.resize(l + 1, None);
            }
            let c = comps[l].get_or_insert(Component {
                area: 0,
                min: [x, y],
                max: [x, y],
            });
            c.area += 1;
            c.min = [c.min[0].min(x), c.min[1].min(y)];
            c.max = [c.max[0].max(x), c.max[1].max(y)];
        }

        // Renumber kept components 1..=n in raster order of first pixel.
        let mut remap = vec![0u16; comps.len()];
        let mut kept: Vec<Component> = Vec::new();
        for (l, c) in comps.iter().enumerate() {
            let Some(c) = c else { continue };
            if c.area < self.config.min_area_px {
                continue;
            }
            kept.push(*c);
            if kept.len() > u16::MAX as usize {
                return Err(SegmentError::TooManyObjects(kept.len()));
            }
            remap[l] = kept.len() as u16;
        }

        let mask = Gray16::from_fn(w, h, |x, y| {
            let l = labels.get_pixel(x, y).0[0] as usize;
            Luma([remap.get(l).copied().unwrap_or(0)])
        });
        let rois = kept
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let label = (i + 1) as u16;
                Roi {
                    label,
                    polygon: outer_polygon(&mask, label, c),
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Otsu level {}: {} components, {} kept",
            level,
            comps.iter().flatten().count(),
            rois.len()
        );
        Ok(Segmentation { mask, rois })
    }
}

/// Name of the saved label mask: `<stem>_label.<ext>`; TIFF inputs stay
/// TIFF, everything else is written as 16-bit PNG.
pub fn mask_name(input: &Path) -> String {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("tif") | Some("tiff") => format!("{}_label.{}", stem, ext.as_deref().unwrap_or("tif")),
        _ => format!("{}_label.png", stem),
    }
}

pub fn archive_name(input: &Path) -> String {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    format!("{}_rois.zip", stem)
}

/// Counters of a segmentation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentSummary {
    pub folders: usize,
    pub images: usize,
    pub objects: usize,
    /// Images with zero detections.
    pub empty: usize,
    pub failures: usize,
}

impl SegmentSummary {
    fn add(&mut self, other: &SegmentSummary) {
        self.folders += other.folders;
        self.images += other.images;
        self.objects += other.objects;
        self.empty += other.empty;
        self.failures += other.failures;
    }
}

fn segment_file<S: Segmenter + ?Sized>(
    segmenter: &S,
    input: &Path,
    output_dir: &Path,
    channel: Option<Channel>,
) -> Result<usize, SegmentError> {
    let image = image::open(input)
        .map_err(|e| SegmentError::Image {
            path: input.to_path_buf(),
            source: e,
        })?
        .into_luma16();
    let seg = segmenter.segment(&image, channel)?;

    let mask_path = output_dir.join(mask_name(input));
    seg.mask.save(&mask_path).map_err(|e| SegmentError::Image {
        path: mask_path.clone(),
        source: e,
    })?;
    write_roi_archive(&output_dir.join(archive_name(input)), &seg.rois)?;
    Ok(seg.rois.len())
}

/// Segment every image directly inside `input` into `output`.
///
/// A failing image is logged and counted; the folder continues.
pub fn segment_folder<S: Segmenter + ?Sized>(
    segmenter: &S,
    input: &Path,
    output: &Path,
) -> Result<SegmentSummary, SegmentError> {
    std::fs::create_dir_all(output).map_err(|e| SegmentError::Io {
        path: output.to_path_buf(),
        source: e,
    })?;
    let files = files_with_extensions(input, &IMAGE_EXTENSIONS).map_err(|e| SegmentError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;
    tracing::info!("Found {} images in {}", files.len(), input.display());

    let channel = Channel::from_dir(input);
    let mut summary = SegmentSummary {
        folders: 1,
        ..SegmentSummary::default()
    };
    for path in &files {
        match segment_file(segmenter, path, output, channel) {
            Ok(n) => {
                summary.images += 1;
                summary.objects += n;
                if n == 0 {
                    summary.empty += 1;
                }
                tracing::debug!("{}: {} objects", path.display(), n);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                summary.failures += 1;
            }
        }
    }
    Ok(summary)
}

/// Segment every directory below `input_root` into `output_root/<dir name>`,
/// folders in parallel.
pub fn segment_tree<S: Segmenter + ?Sized>(
    segmenter: &S,
    input_root: &Path,
    output_root: &Path,
) -> Result<SegmentSummary, SegmentError> {
    let dirs: Vec<PathBuf> = walk_dirs(input_root)
        .map_err(|e| SegmentError::Io {
            path: input_root.to_path_buf(),
            source: e,
        })?
        .into_iter()
        .filter(|d| d.as_path() != input_root)
        .collect();

    let results: Vec<_> = dirs
        .par_iter()
        .map(|dir| {
            let out = output_root.join(dir_name(dir));
            (dir, segment_folder(segmenter, dir, &out))
        })
        .collect();

    let mut total = SegmentSummary::default();
    for (dir, result) in results {
        match result {
            Ok(s) => total.add(&s),
            Err(e) => {
                tracing::warn!("Skipping folder {}: {}", dir.display(), e);
                total.failures += 1;
            }
        }
    }
    tracing::info!(
        "Segmented {} images in {} folders: {} objects, {} empty, {} failures",
        total.images,
        total.folders,
        total.objects,
        total.empty,
        total.failures
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_cells_image;

    #[test]
    fn threshold_segmenter_labels_each_square() {
        let img = draw_cells_image(64, 48, &[([5, 5], 8), ([30, 20], 10), ([50, 40], 2)], 100, 3000);
        let seg = ThresholdSegmenter::new(ThresholdConfig { min_area_px: 10 })
            .segment(&img, None)
            .unwrap();

        // The 2x2 square is below the area limit.
        assert_eq!(seg.rois.len(), 2);
        assert_eq!(seg.mask.get_pixel(8, 8).0[0], 1);
        assert_eq!(seg.mask.get_pixel(35, 25).0[0], 2);
        assert_eq!(seg.mask.get_pixel(50, 40).0[0], 0);
        assert_eq!(seg.mask.get_pixel(0, 0).0[0], 0);

        let xs: Vec<i32> = seg.rois[0].polygon.iter().map(|p| p[0]).collect();
        assert_eq!(xs.iter().min(), Some(&5));
        assert_eq!(xs.iter().max(), Some(&12));
    }

    #[test]
    fn flat_image_has_no_objects() {
        let img = draw_cells_image(16, 16, &[], 700, 0);
        let seg = ThresholdSegmenter::default().segment(&img, None).unwrap();
        assert!(seg.rois.is_empty());
        assert!(seg.mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn mask_names_keep_tiff() {
        assert_eq!(mask_name(Path::new("a/t0.tif")), "t0_label.tif");
        assert_eq!(mask_name(Path::new("a/t0.jpg")), "t0_label.png");
        assert_eq!(archive_name(Path::new("a/t0.png")), "t0_rois.zip");
    }

    #[test]
    fn tree_writes_masks_and_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(input.join("f1d0")).unwrap();
        draw_cells_image(32, 32, &[([4, 4], 6)], 50, 2000)
            .save(input.join("f1d0/t0.png"))
            .unwrap();
        draw_cells_image(32, 32, &[], 50, 0)
            .save(input.join("f1d0/t1.png"))
            .unwrap();

        let summary = segment_tree(&ThresholdSegmenter::default(), &input, &output).unwrap();
        assert_eq!(summary.images, 2);
        assert_eq!(summary.objects, 1);
        assert_eq!(summary.empty, 1);

        let mask = image::open(output.join("f1d0/t0_label.png")).unwrap();
        assert!(matches!(mask, image::DynamicImage::ImageLuma16(_)));
        assert_eq!(read_roi_archive(&output.join("f1d0/t0_rois.zip")).unwrap().len(), 1);
        assert!(is_archive_empty(&output.join("f1d0/t1_rois.zip")).unwrap());
    }
}
