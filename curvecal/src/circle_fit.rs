use nalgebra::{Matrix4, Vector4};

use crate::error::{CalibError, Result};

/// A circle fitted to one lattice row.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CircleFit {
    pub center: [f64; 2],
    pub radius: f64,
    /// Root mean square of the point-to-circle distances.
    pub rms: f64,
}

impl CircleFit {
    /// `true` when the centre lies below the points (image `y` down), i.e.
    /// the row bows upwards in the middle.
    pub fn bows_upward(&self, points: &[[f32; 2]]) -> bool {
        let mean_y = points.iter().map(|p| p[1] as f64).sum::<f64>() / points.len() as f64;
        self.center[1] > mean_y
    }
}

/// Largest distance of any point from the chord joining the first and last
/// point.
pub fn sagitta(points: &[[f32; 2]]) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    let (dx, dy) = ((last[0] - first[0]) as f64, (last[1] - first[1]) as f64);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return 0.0;
    }
    points
        .iter()
        .map(|p| ((p[0] - first[0]) as f64 * dy - (p[1] - first[1]) as f64 * dx).abs() / len)
        .fold(0.0, f64::max)
}

/// Algebraic circle fit `a (x² + y²) + b x + c y + d = 0`.
///
/// Points are centred and scaled to unit spread first so the design matrix is
/// well conditioned. The coefficient vector is the right singular vector of
/// the smallest singular value of the normal matrix.
pub fn fit_circle(points: &[[f32; 2]]) -> Result<CircleFit> {
    if points.len() < 3 {
        return Err(CalibError::fit(format!(
            "a circle needs at least 3 points, got {}",
            points.len()
        )));
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p[0] as f64).sum::<f64>() / n;
    let my = points.iter().map(|p| p[1] as f64).sum::<f64>() / n;
    let scale = (points
        .iter()
        .map(|p| (p[0] as f64 - mx).powi(2) + (p[1] as f64 - my).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    if scale <= f64::EPSILON {
        return Err(CalibError::fit("row points coincide"));
    }

    let mut normal = Matrix4::<f64>::zeros();
    for p in points {
        let x = (p[0] as f64 - mx) / scale;
        let y = (p[1] as f64 - my) / scale;
        let row = Vector4::new(x * x + y * y, x, y, 1.0);
        normal += row * row.transpose();
    }

    let svd = normal.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibError::fit("singular value decomposition did not converge"))?;
    let mut order: Vec<usize> = (0..4).collect();
    order.sort_by(|&i, &j| svd.singular_values[j].total_cmp(&svd.singular_values[i]));
    let largest = svd.singular_values[order[0]];
    if svd.singular_values[order[2]] <= largest * 1e-12 {
        return Err(CalibError::fit("circle fit is rank deficient"));
    }
    let coeffs = v_t.row(order[3]);
    let (a, b, c, d) = (coeffs[0], coeffs[1], coeffs[2], coeffs[3]);
    if a.abs() <= 1e-12 {
        return Err(CalibError::fit("row points are collinear"));
    }

    let ux = -b / (2.0 * a);
    let uy = -c / (2.0 * a);
    let r2 = ux * ux + uy * uy - d / a;
    if r2 <= 0.0 || !r2.is_finite() {
        return Err(CalibError::fit("circle fit produced no real radius"));
    }
    let center = [mx + ux * scale, my + uy * scale];
    let radius = r2.sqrt() * scale;

    let rms = (points
        .iter()
        .map(|p| {
            let dist = ((p[0] as f64 - center[0]).powi(2) + (p[1] as f64 - center[1]).powi(2)).sqrt();
            (dist - radius).powi(2)
        })
        .sum::<f64>()
        / n)
        .sqrt();

    Ok(CircleFit {
        center,
        radius,
        rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn arc(cx: f64, cy: f64, r: f64, from: f64, to: f64, n: usize) -> Vec<[f32; 2]> {
        (0..n)
            .map(|i| {
                let t = from + (to - from) * i as f64 / (n - 1) as f64;
                [(cx + r * t.cos()) as f32, (cy + r * t.sin()) as f32]
            })
            .collect()
    }

    #[test]
    fn recovers_circle() {
        let pts = arc(400.0, 1800.0, 1500.0, -1.8, -1.35, 9);
        let fit = fit_circle(&pts).unwrap();
        assert_relative_eq!(fit.radius, 1500.0, max_relative = 1e-3);
        assert_relative_eq!(fit.center[0], 400.0, max_relative = 1e-3);
        assert!(fit.rms < 0.05);
        assert!(fit.bows_upward(&pts));
    }

    #[test]
    fn three_points_suffice() {
        let pts = [[0.0f32, 10.0], [10.0, 0.0], [20.0, 10.0]];
        let fit = fit_circle(&pts).unwrap();
        assert_relative_eq!(fit.radius, 10.0, max_relative = 1e-6);
        assert_relative_eq!(fit.center[1], 10.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_rows_fail() {
        let line = [[0.0f32, 5.0], [10.0, 5.0], [20.0, 5.0], [30.0, 5.0]];
        assert!(matches!(fit_circle(&line), Err(CalibError::FitFailure(_))));
        let same = [[3.0f32, 3.0]; 4];
        assert!(matches!(fit_circle(&same), Err(CalibError::FitFailure(_))));
        assert!(fit_circle(&line[..2]).is_err());
        assert!(sagitta(&line) < 1e-9);
    }

    #[test]
    fn sagitta_of_arc() {
        let pts = arc(0.0, 100.0, 100.0, -2.0, -1.1416, 21);
        let s = sagitta(&pts);
        // chord half angle ~0.4292 rad: sagitta = r (1 - cos)
        assert_relative_eq!(s, 100.0 * (1.0 - 0.4292f64.cos()), max_relative = 1e-2);
    }

    #[test]
    fn inverted_bow_is_detected() {
        let pts = arc(0.0, -500.0, 500.0, 1.3, 1.8, 7);
        let fit = fit_circle(&pts).unwrap();
        assert!(!fit.bows_upward(&pts));
    }
}
