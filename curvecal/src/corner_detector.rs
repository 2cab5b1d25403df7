//! Chessboard intersection candidates.
//!
//! The response is the ChESS operator evaluated on a ring of 16 samples:
//! around an X-junction, samples half a turn apart have the same colour and
//! samples a quarter turn apart have opposite colours. Candidates are local
//! maxima above a relative threshold, thinned by greedy non-maximum
//! suppression and refined to sub-pixel precision with the gradient saddle
//! condition: at the true corner every gradient in the window is orthogonal to
//! the vector joining it to the corner.

use std::f32::consts::PI;

use nalgebra::{Matrix2, Vector2};
use tracing::debug;

use crate::detector_config::{DetectorConfig, ResolvedParams};
use crate::image_buffer::ImageView;

/// Single-channel floating point image.
#[derive(Debug, Clone)]
pub struct GrayImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl GrayImage {
    pub fn from_view(image: &ImageView) -> Self {
        GrayImage {
            width: image.width(),
            height: image.height(),
            data: image.to_luma(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Bilinear sample with edge replication.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// 3x3 box blur with edge replication.
    pub fn box_blurred(&self) -> GrayImage {
        let (w, h) = (self.width as i64, self.height as i64);
        let at = |x: i64, y: i64| self.get(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32);
        let mut data = Vec::with_capacity(self.data.len());
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0.0;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        sum += at(x + dx, y + dy);
                    }
                }
                data.push(sum / 9.0);
            }
        }
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Central-difference gradient at an interior pixel.
    fn gradient(&self, x: u32, y: u32) -> Vector2<f64> {
        let gx = (self.get(x + 1, y) - self.get(x - 1, y)) as f64 * 0.5;
        let gy = (self.get(x, y + 1) - self.get(x, y - 1)) as f64 * 0.5;
        Vector2::new(gx, gy)
    }
}

/// A candidate intersection in image coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Corner {
    pub x: f32,
    pub y: f32,
    pub response: f32,
}

const RING_SAMPLES: usize = 16;

fn ring_offsets(radius: u32) -> [(f32, f32); RING_SAMPLES] {
    let mut offsets = [(0.0, 0.0); RING_SAMPLES];
    for (k, o) in offsets.iter_mut().enumerate() {
        let angle = (k as f32 + 0.5) * 2.0 * PI / RING_SAMPLES as f32;
        *o = (radius as f32 * angle.cos(), radius as f32 * angle.sin());
    }
    offsets
}

/// ChESS response of every pixel; pixels whose ring leaves the image get 0.
pub fn chess_response(gray: &GrayImage, ring_radius: u32) -> Vec<f32> {
    let (w, h) = (gray.width(), gray.height());
    let mut response = vec![0.0f32; w as usize * h as usize];
    let margin = ring_radius + 1;
    if w <= 2 * margin || h <= 2 * margin {
        return response;
    }
    let offsets = ring_offsets(ring_radius);
    let mut ring = [0.0f32; RING_SAMPLES];
    for y in margin..h - margin {
        for x in margin..w - margin {
            for (v, &(dx, dy)) in ring.iter_mut().zip(offsets.iter()) {
                *v = gray.sample(x as f32 + dx, y as f32 + dy);
            }
            let sum_response: f32 = (0..4)
                .map(|n| (ring[n] + ring[n + 8] - ring[n + 4] - ring[n + 12]).abs())
                .sum();
            let diff_response: f32 = (0..8).map(|n| (ring[n] - ring[n + 8]).abs()).sum();
            let ring_mean = ring.iter().sum::<f32>() / RING_SAMPLES as f32;
            let local_mean = (gray.get(x, y)
                + gray.get(x - 1, y)
                + gray.get(x + 1, y)
                + gray.get(x, y - 1)
                + gray.get(x, y + 1))
                / 5.0;
            let mean_response = (ring_mean - local_mean).abs();
            response[y as usize * w as usize + x as usize] =
                sum_response - diff_response - RING_SAMPLES as f32 * mean_response;
        }
    }
    response
}

/// Local maxima of `response` above `threshold_rel * max`, thinned so that no
/// two survivors are closer than `nms_radius`. Strongest first.
pub fn non_max_suppression(
    response: &[f32],
    width: u32,
    height: u32,
    threshold_rel: f32,
    nms_radius: u32,
) -> Vec<Corner> {
    let max = response.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = threshold_rel * max;
    let (w, h) = (width as usize, height as usize);

    let mut candidates = Vec::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let v = response[y * w + x];
            if v <= threshold {
                continue;
            }
            let is_peak = (y - 1..=y + 1)
                .all(|yy| (x - 1..=x + 1).all(|xx| response[yy * w + xx] <= v));
            if is_peak {
                candidates.push(Corner {
                    x: x as f32,
                    y: y as f32,
                    response: v,
                });
            }
        }
    }
    candidates.sort_by(|a, b| b.response.total_cmp(&a.response));

    let r = nms_radius as i64;
    let mut suppressed = vec![false; w * h];
    let mut kept = Vec::new();
    for c in candidates {
        let (cx, cy) = (c.x as i64, c.y as i64);
        if suppressed[cy as usize * w + cx as usize] {
            continue;
        }
        for yy in (cy - r).max(0)..=(cy + r).min(h as i64 - 1) {
            for xx in (cx - r).max(0)..=(cx + r).min(w as i64 - 1) {
                if (xx - cx).pow(2) + (yy - cy).pow(2) <= r * r {
                    suppressed[yy as usize * w + xx as usize] = true;
                }
            }
        }
        kept.push(c);
    }
    kept
}

/// Moves `corner` to the saddle point of the intensity surface. Returns
/// `None` when the window is flat or the estimate runs away.
pub fn refine_corner(
    gray: &GrayImage,
    corner: Corner,
    half_window: u32,
    max_iters: usize,
) -> Option<Corner> {
    let hw = half_window as i64;
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let start = Vector2::new(corner.x as f64, corner.y as f64);
    let mut q = start;

    for _ in 0..max_iters.max(1) {
        let (qx, qy) = (q.x.round() as i64, q.y.round() as i64);
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for y in (qy - hw).max(1)..=(qy + hw).min(h - 2) {
            for x in (qx - hw).max(1)..=(qx + hw).min(w - 2) {
                let g = gray.gradient(x as u32, y as u32);
                let ggt = g * g.transpose();
                a += ggt;
                b += ggt * Vector2::new(x as f64, y as f64);
            }
        }
        if a.determinant().abs() < 1e-6 {
            return None;
        }
        let next = a.try_inverse()? * b;
        let shift = (next - q).norm();
        q = next;
        if (q - start).norm() > half_window as f64 * 1.5 {
            return None;
        }
        if shift < 0.01 {
            break;
        }
    }

    Some(Corner {
        x: q.x as f32,
        y: q.y as f32,
        response: corner.response,
    })
}

/// Full candidate pipeline on an already blurred gray image.
pub fn detect_corners(
    gray: &GrayImage,
    params: &ResolvedParams,
    config: &DetectorConfig,
) -> Vec<Corner> {
    let response = chess_response(gray, params.ring_radius);
    let peaks = non_max_suppression(
        &response,
        gray.width(),
        gray.height(),
        config.threshold_rel,
        params.nms_radius,
    );
    let peak_count = peaks.len();
    let corners: Vec<Corner> = peaks
        .into_iter()
        .filter_map(|c| refine_corner(gray, c, params.refine_half_window, config.refine_max_iters))
        .collect();
    debug!(
        "ring radius {}: {} peaks, {} refined corners",
        params.ring_radius,
        peak_count,
        corners.len()
    );
    corners
}
