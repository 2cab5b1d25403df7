use tracing::{debug, info, warn};

use crate::circle_fit::{fit_circle, sagitta, CircleFit};
use crate::corner_detector::{detect_corners, Corner, GrayImage};
use crate::debug_overlay::{self, RowArc};
use crate::detector_config::DetectorConfig;
use crate::error::{CalibError, Result};
use crate::grid_lattice::assemble_lattice;
use crate::image_buffer::{ImageBuffer, ImageView};

/// Everything learnt from one capture.
#[derive(Debug, Clone)]
pub struct CurvatureEstimate {
    /// Fitted radius in pixels of the input image.
    pub radius: f32,
    /// The `cols x rows` intersections, row-major, in input pixels.
    pub intersections: Vec<[f32; 2]>,
    /// Radius of every lattice row, top to bottom.
    pub row_radii: Vec<f32>,
    /// RMS distance of the intersections from their row circles.
    pub rms: f32,
    /// `true` when the rows bow downwards in the middle.
    pub inverted: bool,
    /// Annotated copy of the input, only produced in debug mode.
    pub debug_image: Option<ImageBuffer>,
}

/// Measures the curvature radius of a captured chessboard.
#[derive(Debug, Clone, Default)]
pub struct CurvatureEstimator {
    config: DetectorConfig,
}

impl CurvatureEstimator {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(CurvatureEstimator { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Finds the `cols x rows` inner intersections of the board in `image` and
    /// fits a circle through every row of them.
    ///
    /// `debug` adds an annotated image and extra log output; the numeric
    /// result and the error outcome are the same either way.
    pub fn estimate(
        &self,
        image: &ImageView,
        cols: u32,
        rows: u32,
        debug: bool,
    ) -> Result<CurvatureEstimate> {
        if cols < 3 || rows < 1 {
            return Err(CalibError::invalid(format!(
                "need at least 3x1 intersections to fit a curve, got {cols}x{rows}"
            )));
        }

        // never shrink a side below one pixel; thin captures then fail in detection
        let factor = image
            .width()
            .div_ceil(self.config.max_detection_width)
            .min(image.height())
            .max(1);
        let shrunk;
        let work = if factor > 1 {
            shrunk = image.downscaled(factor)?;
            debug!(
                "downscaled {}x{} capture by {} for detection",
                image.width(),
                image.height(),
                factor
            );
            shrunk.view()
        } else {
            *image
        };
        let to_input = |p: [f32; 2]| -> [f32; 2] {
            let f = factor as f32;
            let offset = (f - 1.0) / 2.0;
            [p[0] * f + offset, p[1] * f + offset]
        };

        let cell_size = (work.width() as f32 / (cols + 1) as f32)
            .min(work.height() as f32 / (rows + 1) as f32);
        let params = self.config.resolve(cell_size);
        debug!("expected cell {:.1}px, resolved {:?}", cell_size, params);

        let gray = GrayImage::from_view(&work).box_blurred();
        let corners = detect_corners(&gray, &params, &self.config);
        let lattice = assemble_lattice(
            &corners,
            cols as usize,
            rows as usize,
            self.config.link_tolerance,
        )?;
        let intersections: Vec<[f32; 2]> = lattice.points.iter().map(|&p| to_input(p)).collect();
        let row_points: Vec<&[[f32; 2]]> = intersections.chunks(cols as usize).collect();

        let sagittas: Vec<f64> = row_points.iter().map(|row| sagitta(row)).collect();
        let mean_sagitta = sagittas.iter().sum::<f64>() / sagittas.len() as f64;
        if debug {
            debug!("row sagittas {:?}", sagittas);
        }
        if mean_sagitta < self.config.min_sagitta_px as f64 {
            return Err(CalibError::fit(format!(
                "rows are straight: mean sagitta {:.3}px is below {}px",
                mean_sagitta, self.config.min_sagitta_px
            )));
        }

        let fits: Vec<CircleFit> = row_points
            .iter()
            .map(|row| fit_circle(row))
            .collect::<Result<_>>()?;
        let rms = (fits.iter().map(|f| f.rms * f.rms).sum::<f64>() / fits.len() as f64).sqrt();
        if rms > self.config.max_fit_rms_px as f64 {
            return Err(CalibError::fit(format!(
                "rows do not follow a circle: rms residual {:.3}px exceeds {}px",
                rms, self.config.max_fit_rms_px
            )));
        }

        let upward: Vec<bool> = fits
            .iter()
            .zip(&row_points)
            .map(|(fit, row)| fit.bows_upward(row))
            .collect();
        let inverted_rows = upward.iter().filter(|&&u| !u).count();
        let inverted = inverted_rows * 2 > fits.len();
        if inverted {
            warn!(
                "{} of {} rows bow downwards; reporting the radius magnitude",
                inverted_rows,
                fits.len()
            );
        }

        let row_radii: Vec<f32> = fits.iter().map(|f| f.radius as f32).collect();
        let mean_curvature = fits.iter().map(|f| 1.0 / f.radius).sum::<f64>() / fits.len() as f64;
        let radius = (1.0 / mean_curvature) as f32;

        let (min_r, max_r) = row_radii
            .iter()
            .fold((f32::INFINITY, 0.0f32), |(lo, hi), &r| (lo.min(r), hi.max(r)));
        if max_r > 1.5 * min_r {
            warn!(
                "row radii disagree: {:.1}px to {:.1}px, the capture may be tilted",
                min_r, max_r
            );
        }

        let debug_image = debug.then(|| {
            let candidates: Vec<Corner> = corners
                .iter()
                .map(|c| {
                    let [x, y] = to_input([c.x, c.y]);
                    Corner { x, y, ..*c }
                })
                .collect();
            let arcs: Vec<RowArc> = fits
                .iter()
                .zip(&row_points)
                .zip(&upward)
                .map(|((fit, row), &up)| RowArc {
                    fit: *fit,
                    x_range: [row[0][0], row[row.len() - 1][0]],
                    upward: up,
                })
                .collect();
            debug!("rendering debug overlay with {} candidates", candidates.len());
            debug_overlay::render(image, &candidates, &intersections, &arcs)
        });

        info!(
            "estimated curvature radius {:.1}px from {}x{} intersections (rms {:.3}px)",
            radius, cols, rows, rms
        );
        Ok(CurvatureEstimate {
            radius,
            intersections,
            row_radii,
            rms: rms as f32,
            inverted,
            debug_image,
        })
    }
}

/// Radius of curvature, in pixels, of the board captured in `image`, using
/// the default detector settings. `cols` and `rows` count the inner
/// intersections of the board.
pub fn detect_curvature(image: &ImageView, cols: u32, rows: u32, debug: bool) -> Result<f32> {
    CurvatureEstimator::default()
        .estimate(image, cols, rows, debug)
        .map(|estimate| estimate.radius)
}
