use crate::circle_fit::CircleFit;
use crate::corner_detector::Corner;
use crate::image_buffer::{ImageBuffer, ImageView};

const CANDIDATE: [u8; 3] = [255, 0, 0];
const LATTICE: [u8; 3] = [0, 200, 0];
const ARC: [u8; 3] = [0, 80, 255];

fn put(image: &mut ImageBuffer, x: i64, y: i64, rgb: [u8; 3]) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.set_rgb(x as u32, y as u32, rgb);
    }
}

fn cross(image: &mut ImageBuffer, x: f32, y: f32, arm: i64, rgb: [u8; 3]) {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    for d in -arm..=arm {
        put(image, cx + d, cy, rgb);
        put(image, cx, cy + d, rgb);
    }
}

/// A fitted row as drawn on the overlay.
#[derive(Debug, Copy, Clone)]
pub struct RowArc {
    pub fit: CircleFit,
    /// Horizontal extent of the row's intersections.
    pub x_range: [f32; 2],
    /// Whether the row lies above the circle centre.
    pub upward: bool,
}

/// Copy of `image` annotated with the raw candidates (red), the lattice
/// intersections (green) and the fitted row arcs (blue).
pub fn render(
    image: &ImageView,
    candidates: &[Corner],
    lattice: &[[f32; 2]],
    rows: &[RowArc],
) -> ImageBuffer {
    let mut out = image.to_owned_buffer();
    for c in candidates {
        cross(&mut out, c.x, c.y, 2, CANDIDATE);
    }
    for row in rows {
        let fit = &row.fit;
        for x in row.x_range[0].floor() as i64..=row.x_range[1].ceil() as i64 {
            let dx = x as f64 - fit.center[0];
            let h2 = fit.radius * fit.radius - dx * dx;
            if h2 < 0.0 {
                continue;
            }
            let y = if row.upward {
                fit.center[1] - h2.sqrt()
            } else {
                fit.center[1] + h2.sqrt()
            };
            put(&mut out, x, y.round() as i64, ARC);
        }
    }
    for p in lattice {
        cross(&mut out, p[0], p[1], 4, LATTICE);
    }
    out
}
