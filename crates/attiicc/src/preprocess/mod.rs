//! Background subtraction over a channel-suffixed image tree.
//!
//! Directories ending in `d0`/`d1`/`d2` pick the per-channel filter
//! parameter; every PNG inside is corrected and written as `<stem>_bg.png`
//! (16-bit) at the mirrored location below the output root.

mod rolling_ball;

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use rayon::prelude::*;

use crate::channel::{Channel, ChannelParams};
use crate::workspace::{files_with_extensions, mirror_path, walk_dirs};

pub use rolling_ball::rolling_ball_background;

pub type Gray16 = ImageBuffer<Luma<u16>, Vec<u16>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMethod {
    /// Gaussian blur; parameter is sigma.
    #[default]
    Gaussian,
    /// Spherical opening; parameter is the ball radius.
    RollingBall,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub method: BackgroundMethod,
    /// Sigma or radius, in pixels, per channel.
    pub params: ChannelParams<f32>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            method: BackgroundMethod::Gaussian,
            params: ChannelParams::splat(20.0),
        }
    }
}

#[derive(Debug)]
pub enum PreprocessError {
    Io { path: PathBuf, source: std::io::Error },
    Image { path: PathBuf, source: image::ImageError },
    /// Sigma/radius must be finite and positive.
    InvalidParameter { channel: Option<Channel>, value: f32 },
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Image { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::InvalidParameter {
                channel: Some(channel),
                value,
            } => write!(f, "invalid filter parameter {} for channel {}", value, channel),
            Self::InvalidParameter { channel: None, value } => {
                write!(f, "invalid filter parameter {}", value)
            }
        }
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Image { source, .. } => Some(source),
            Self::InvalidParameter { .. } => None,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<(), PreprocessError> {
        for channel in Channel::ALL {
            let value = self.params.get(channel);
            if !value.is_finite() || value <= 0.0 {
                return Err(PreprocessError::InvalidParameter {
                    channel: Some(channel),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Estimate the background of `image` and subtract it, clamping at 0.
///
/// `param` is the Gaussian sigma or the ball radius and must be positive.
pub fn subtract_background(
    image: &Gray16,
    method: BackgroundMethod,
    param: f32,
) -> Result<Gray16, PreprocessError> {
    if !param.is_finite() || param <= 0.0 {
        return Err(PreprocessError::InvalidParameter {
            channel: None,
            value: param,
        });
    }
    let background: ImageBuffer<Luma<f32>, Vec<f32>> = match method {
        BackgroundMethod::Gaussian => {
            let blurred = imageproc::filter::gaussian_blur_f32(image, param);
            ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
                Luma([blurred.get_pixel(x, y).0[0] as f32])
            })
        }
        BackgroundMethod::RollingBall => rolling_ball_background(image, param),
    };

    Ok(ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y).0[0] as f32 - background.get_pixel(x, y).0[0];
        Luma([v.clamp(0.0, u16::MAX as f32) as u16])
    }))
}

/// Output file name of a corrected image.
pub fn corrected_name(input: &Path) -> String {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    format!("{}_bg.png", stem)
}

/// Correct every PNG directly inside `input_dir` into `output_dir`.
///
/// Returns (images written, images failed); a failing image is logged.
pub fn process_folder(
    input_dir: &Path,
    output_dir: &Path,
    method: BackgroundMethod,
    param: f32,
) -> Result<(usize, usize), PreprocessError> {
    let files = files_with_extensions(input_dir, &["png"]).map_err(|e| PreprocessError::Io {
        path: input_dir.to_path_buf(),
        source: e,
    })?;

    let (mut written, mut failed) = (0, 0);
    for path in files {
        let out_path = output_dir.join(corrected_name(&path));
        match correct_file(&path, &out_path, method, param) {
            Ok(()) => {
                tracing::debug!("Processed and saved: {}", out_path.display());
                written += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    Ok((written, failed))
}

fn correct_file(input: &Path, output: &Path, method: BackgroundMethod, param: f32) -> Result<(), PreprocessError> {
    let image = image::open(input)
        .map_err(|e| PreprocessError::Image {
            path: input.to_path_buf(),
            source: e,
        })?
        .into_luma16();
    subtract_background(&image, method, param)?
        .save(output)
        .map_err(|e| PreprocessError::Image {
            path: output.to_path_buf(),
            source: e,
        })
}

/// Counters of a [`process_tree`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreprocessSummary {
    /// Channel folders processed.
    pub folders: usize,
    pub images: usize,
    /// Images or folders that could not be processed.
    pub failures: usize,
}

/// Mirror `input_root` under `output_root` and correct every channel folder.
///
/// Folders run in parallel. Directories that cannot be created are logged
/// and skipped; folders without a channel suffix are skipped.
pub fn process_tree(
    input_root: &Path,
    output_root: &Path,
    config: &PreprocessConfig,
) -> Result<PreprocessSummary, PreprocessError> {
    config.validate()?;
    let dirs = walk_dirs(input_root).map_err(|e| PreprocessError::Io {
        path: input_root.to_path_buf(),
        source: e,
    })?;

    let mut summary = PreprocessSummary::default();
    let mut jobs = Vec::new();
    for dir in dirs {
        let out_dir = mirror_path(&dir, input_root, output_root);
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            tracing::warn!("Failed to create {}: {}", out_dir.display(), e);
            summary.failures += 1;
            continue;
        }
        let Some(channel) = Channel::from_dir(&dir) else {
            continue;
        };
        jobs.push((dir, out_dir, config.params.get(channel)));
    }

    tracing::info!("{} channel folders to preprocess ({:?})", jobs.len(), config.method);
    let results: Vec<_> = jobs
        .par_iter()
        .map(|(dir, out_dir, param)| (dir, process_folder(dir, out_dir, config.method, *param)))
        .collect();

    for (dir, result) in results {
        match result {
            Ok((written, failed)) => {
                summary.folders += 1;
                summary.images += written;
                summary.failures += failed;
            }
            Err(e) => {
                tracing::warn!("Skipping folder {}: {}", dir.display(), e);
                summary.failures += 1;
            }
        }
    }
    tracing::info!(
        "Preprocessed {} images in {} folders ({} failures)",
        summary.images,
        summary.folders,
        summary.failures
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_cells_image;

    #[test]
    fn gaussian_subtraction_removes_flat_background() {
        let img = draw_cells_image(40, 40, &[], 500, 0);
        let out = subtract_background(&img, BackgroundMethod::Gaussian, 3.0).unwrap();
        assert!(out.pixels().all(|p| p.0[0] <= 1));
    }

    #[test]
    fn rolling_ball_keeps_small_cells() {
        let img = draw_cells_image(40, 40, &[([18, 18], 3)], 200, 1200);
        let out = subtract_background(&img, BackgroundMethod::RollingBall, 8.0).unwrap();
        assert!(out.get_pixel(19, 19).0[0] > 900);
        assert_eq!(out.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let config = PreprocessConfig {
            params: ChannelParams::new(1.0, 0.0, 1.0),
            ..PreprocessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PreprocessError::InvalidParameter {
                channel: Some(Channel::D1),
                ..
            })
        ));
    }

    #[test]
    fn tree_is_mirrored_and_only_channel_folders_processed() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("raw");
        let output = tmp.path().join("bg");
        for dir in ["fieldA/f1d0", "fieldA/f1d2", "fieldA/notes"] {
            std::fs::create_dir_all(input.join(dir)).unwrap();
        }
        let img = draw_cells_image(16, 16, &[([4, 4], 3)], 100, 900);
        img.save(input.join("fieldA/f1d0/t0.png")).unwrap();
        img.save(input.join("fieldA/f1d2/t0.png")).unwrap();
        img.save(input.join("fieldA/notes/t0.png")).unwrap();

        let summary = process_tree(&input, &output, &PreprocessConfig {
            method: BackgroundMethod::Gaussian,
            params: ChannelParams::splat(2.0),
        })
        .unwrap();

        assert_eq!(summary.folders, 2);
        assert_eq!(summary.images, 2);
        assert_eq!(summary.failures, 0);
        let written = image::open(output.join("fieldA/f1d0/t0_bg.png")).unwrap();
        assert!(matches!(written, image::DynamicImage::ImageLuma16(_)));
        assert!(output.join("fieldA/notes").is_dir());
        assert!(!output.join("fieldA/notes/t0_bg.png").exists());
    }
}
