//! Rolling-ball background estimate.
//!
//! The background is the grey-scale opening of the intensity surface with a
//! spherical structuring element: a ball of radius `r` pushed up from below
//! until it touches the surface (erosion), then the envelope of the ball tops
//! (dilation). Features narrower than the ball are removed from the estimate.
//! Cost is O(pixels * r^2).

use image::{ImageBuffer, Luma};

/// Offsets inside the ball footprint with the ball height above its rim.
struct BallKernel {
    offsets: Vec<(i32, i32, f32)>,
}

impl BallKernel {
    fn new(radius: f32) -> Self {
        let r = radius.ceil() as i32;
        let r2 = radius * radius;
        let mut offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let d2 = (dx * dx + dy * dy) as f32;
                if d2 <= r2 {
                    offsets.push((dx, dy, (r2 - d2).sqrt()));
                }
            }
        }
        Self { offsets }
    }
}

/// One morphological pass over a row-major `w x h` buffer.
///
/// Erosion takes `min(src - height)`, dilation `max(src + height)`; only
/// offsets inside the image contribute.
fn pass(src: &[f32], w: usize, h: usize, kernel: &BallKernel, erode: bool) -> Vec<f32> {
    let mut out = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = if erode { f32::INFINITY } else { f32::NEG_INFINITY };
            for &(dx, dy, height) in &kernel.offsets {
                let (sx, sy) = (x as i64 + dx as i64, y as i64 + dy as i64);
                if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
                    continue;
                }
                let v = src[sy as usize * w + sx as usize];
                acc = if erode {
                    acc.min(v - height)
                } else {
                    acc.max(v + height)
                };
            }
            out[y * w + x] = acc;
        }
    }
    out
}

/// Background of `image` under a ball of `radius` pixels.
pub fn rolling_ball_background(
    image: &ImageBuffer<Luma<u16>, Vec<u16>>,
    radius: f32,
) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let (w, h) = image.dimensions();
    let src: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    let kernel = BallKernel::new(radius);
    let eroded = pass(&src, w as usize, h as usize, &kernel, true);
    let opened = pass(&eroded, w as usize, h as usize, &kernel, false);
    // The opening never exceeds the input; guard against rounding.
    let clamped: Vec<f32> = opened.iter().zip(&src).map(|(&b, &s)| b.min(s)).collect();
    ImageBuffer::from_raw(w, h, clamped).unwrap_or_else(|| ImageBuffer::new(w, h))
}
