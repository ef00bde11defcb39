//! Heuristic analyzer (statistical fallback)
//!
//! Three independent descriptors of the grayscale grid, each of which flags a
//! typical trace of tampering:
//! - **sharpness**: recompression and splicing wash out high frequencies.
//! - **edge density**: re-rendered documents are too clean, screenshots and
//!   recompressed scans too noisy.
//! - **entropy**: copy-paste and heavy digital cleanup flatten the histogram.
//!
//! Every rule adds a fixed weight when it fires; the sum is clamped to [0, 1].
//! The constants below carry no calibration record and are candidates for
//! empirical recalibration.

use image::{GrayImage, Luma};
use imageproc::{
    filter::laplacian_filter,
    gradients::{horizontal_sobel, vertical_sobel},
};
use serde::{Deserialize, Serialize};

// Laplacian variance below this reads as "unusually smooth".
pub const SHARPNESS_THRESHOLD: f64 = 60.0;
pub const SHARPNESS_WEIGHT: f64 = 0.4;

// Edge density outside [low, high] is suspicious in either direction.
pub const EDGE_DENSITY_LOW: f64 = 0.05;
pub const EDGE_DENSITY_HIGH: f64 = 0.4;
pub const EDGE_DENSITY_WEIGHT: f64 = 0.3;

// Canny hysteresis thresholds on the L1 Sobel magnitude of the raw grid.
pub const CANNY_LOW: i32 = 100;
pub const CANNY_HIGH: i32 = 200;

// tan(22.5 deg) in Q15; the 67.5 deg bound is tan(22.5) + 2.
const TAN_22_5_Q15: i64 = 13573;

// Bits.
pub const ENTROPY_THRESHOLD: f64 = 4.0;
pub const ENTROPY_WEIGHT: f64 = 0.3;

const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub sharpness: f64,
    pub edge_density: f64,
    pub entropy: f64,
}

/// Compute all three descriptors. Nothing is cached between calls.
pub fn measure(gray: &GrayImage) -> MetricSet {
    MetricSet {
        sharpness: sharpness(gray),
        edge_density: edge_density(gray),
        entropy: entropy(gray),
    }
}

/// Population variance of the 3x3 Laplacian response.
pub fn sharpness(gray: &GrayImage) -> f64 {
    let response = laplacian_filter(gray);
    let n = response.as_raw().len();
    if n == 0 {
        return 0.0;
    }

    let n = n as f64;
    let mean = response.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = response
        .as_raw()
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    variance.max(0.0)
}

/// Fraction of pixels Canny marks as edges, in [0, 1].
pub fn edge_density(gray: &GrayImage) -> f64 {
    let total = gray.as_raw().len();
    if total == 0 {
        return 0.0;
    }

    let edges = edge_map(gray);
    let marked = edges.as_raw().iter().filter(|&&v| v > 0).count();
    (marked as f64 / total as f64).clamp(0.0, 1.0)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    None,
    Weak,
    Strong,
}

/// Canny edge map (255 = edge) of the unsmoothed grid.
///
/// 3x3 Sobel with replicated borders, L1 gradient magnitude, non-maximum
/// suppression over four direction sectors, then hysteresis: pixels above
/// [`CANNY_HIGH`] seed edges which grow through 8-connected pixels above
/// [`CANNY_LOW`].
pub fn edge_map(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let dx: Vec<i32> = gx.as_raw().iter().map(|&v| i32::from(v)).collect();
    let dy: Vec<i32> = gy.as_raw().iter().map(|&v| i32::from(v)).collect();
    let magnitude: Vec<i32> = dx.iter().zip(&dy).map(|(x, y)| x.abs() + y.abs()).collect();

    // Outside the grid the magnitude reads as zero.
    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut marks = vec![Mark::None; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= CANNY_LOW {
                continue;
            }

            let (xi, yi) = (x as isize, y as isize);
            let ax = i64::from(dx[i].abs());
            let ay = i64::from(dy[i].abs()) << 15;
            let tan22 = ax * TAN_22_5_Q15;

            let local_max = if ay < tan22 {
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else if ay > tan22 + (ax << 16) {
                m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
            } else {
                let s = if (dx[i] ^ dy[i]) < 0 { -1 } else { 1 };
                m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
            };
            if !local_max {
                continue;
            }

            if m > CANNY_HIGH {
                marks[i] = Mark::Strong;
                stack.push((x, y));
            } else {
                marks[i] = Mark::Weak;
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let j = ny * w + nx;
                if marks[j] == Mark::Weak {
                    marks[j] = Mark::Strong;
                    stack.push((nx, ny));
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        if marks[y as usize * w + x as usize] == Mark::Strong {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Shannon entropy (bits) of the normalised 256-bin intensity histogram.
pub fn entropy(gray: &GrayImage) -> f64 {
    let mut histogram = [0u64; 256];
    for &v in gray.as_raw() {
        histogram[v as usize] += 1;
    }

    let total = gray.as_raw().len() as f64 + EPSILON;
    let bits: f64 = histogram
        .iter()
        .map(|&count| {
            let p = count as f64 / total;
            -p * (p + EPSILON).log2()
        })
        .sum();

    // A single-valued histogram lands a hair below zero because of the epsilon.
    bits.max(0.0)
}

/// Additive rule score in [0, 1].
pub fn score(metrics: &MetricSet) -> f64 {
    let mut score = 0.0;

    if metrics.sharpness < SHARPNESS_THRESHOLD {
        score += SHARPNESS_WEIGHT;
    }
    if metrics.edge_density < EDGE_DENSITY_LOW || metrics.edge_density > EDGE_DENSITY_HIGH {
        score += EDGE_DENSITY_WEIGHT;
    }
    if metrics.entropy < ENTROPY_THRESHOLD {
        score += ENTROPY_WEIGHT;
    }

    f64::clamp(score, 0.0, 1.0)
}
