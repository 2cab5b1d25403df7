use serde::{Deserialize, Serialize};

use crate::error::{CalibError, Result};

/// Tuning knobs of the grid detector and curvature fit.
///
/// Every field has a default, so a JSON file only needs to name the values
/// it overrides. `None` sizes are derived from the expected cell size of the
/// board in the capture, see [`DetectorConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Radius of the 16-sample ring of the corner response, in pixels.
    pub ring_radius: Option<u32>,
    /// Candidates below `threshold_rel * max_response` are discarded.
    pub threshold_rel: f32,
    /// Minimum distance between two accepted candidates.
    pub nms_radius: Option<u32>,
    /// Half size of the window used for sub-pixel refinement.
    pub refine_half_window: Option<u32>,
    pub refine_max_iters: usize,
    /// How far a lattice neighbour may sit from its predicted position, as a
    /// fraction of the lattice spacing.
    pub link_tolerance: f32,
    /// Rows whose sagitta is below this many pixels are considered straight.
    pub min_sagitta_px: f32,
    pub max_fit_rms_px: f32,
    /// Captures wider than this are box-downscaled before detection.
    pub max_detection_width: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            ring_radius: None,
            threshold_rel: 0.2,
            nms_radius: None,
            refine_half_window: None,
            refine_max_iters: 12,
            link_tolerance: 0.4,
            min_sagitta_px: 0.5,
            max_fit_rms_px: 1.5,
            max_detection_width: 2000,
        }
    }
}

/// Concrete sizes for one detection run.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResolvedParams {
    pub ring_radius: u32,
    pub nms_radius: u32,
    pub refine_half_window: u32,
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(CalibError::invalid(format!("{name} must be positive, got {v}")))
            }
        };
        if !(self.threshold_rel.is_finite() && (0.0..1.0).contains(&self.threshold_rel)) {
            return Err(CalibError::invalid(format!(
                "threshold_rel must lie in [0, 1), got {}",
                self.threshold_rel
            )));
        }
        positive("link_tolerance", self.link_tolerance)?;
        positive("min_sagitta_px", self.min_sagitta_px)?;
        positive("max_fit_rms_px", self.max_fit_rms_px)?;
        if self.link_tolerance >= 1.0 {
            return Err(CalibError::invalid(format!(
                "link_tolerance must be below 1, got {}",
                self.link_tolerance
            )));
        }
        if self.ring_radius == Some(0) {
            return Err(CalibError::invalid("ring_radius must be positive"));
        }
        if self.refine_half_window == Some(0) {
            return Err(CalibError::invalid("refine_half_window must be positive"));
        }
        if self.max_detection_width < 64 {
            return Err(CalibError::invalid(format!(
                "max_detection_width must be at least 64, got {}",
                self.max_detection_width
            )));
        }
        Ok(())
    }

    /// Fills in the sizes left unset, scaled to a board cell of `cell_size`
    /// pixels.
    ///
    /// ```
    /// # use curvecal::detector_config::DetectorConfig;
    /// let p = DetectorConfig::default().resolve(40.0);
    /// assert_eq!((p.ring_radius, p.nms_radius, p.refine_half_window), (8, 4, 8));
    /// ```
    pub fn resolve(&self, cell_size: f32) -> ResolvedParams {
        let ring_radius = self
            .ring_radius
            .unwrap_or_else(|| ((cell_size * 0.2).round() as u32).clamp(3, 10));
        let nms_radius = self.nms_radius.unwrap_or((ring_radius / 2).max(2));
        let refine_half_window = self
            .refine_half_window
            .unwrap_or_else(|| ((cell_size * 0.2).round() as u32).clamp(2, 8));
        ResolvedParams {
            ring_radius,
            nms_radius,
            refine_half_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: DetectorConfig =
            serde_json::from_str(r#"{ "threshold_rel": 0.35, "ring_radius": 5 }"#).unwrap();
        assert_eq!(cfg.threshold_rel, 0.35);
        assert_eq!(cfg.ring_radius, Some(5));
        assert_eq!(cfg.refine_max_iters, 12);
        assert_eq!(cfg.max_detection_width, 2000);
    }

    #[test]
    fn invalid_values_rejected() {
        let bad = [
            DetectorConfig { threshold_rel: 1.5, ..Default::default() },
            DetectorConfig { link_tolerance: 0.0, ..Default::default() },
            DetectorConfig { max_fit_rms_px: f32::NAN, ..Default::default() },
            DetectorConfig { ring_radius: Some(0), ..Default::default() },
            DetectorConfig { max_detection_width: 10, ..Default::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(CalibError::InvalidParameter(_))));
        }
    }

    #[test]
    fn resolve_clamps_small_and_large_cells() {
        let cfg = DetectorConfig::default();
        let small = cfg.resolve(5.0);
        assert_eq!((small.ring_radius, small.nms_radius, small.refine_half_window), (3, 2, 2));
        let large = cfg.resolve(400.0);
        assert_eq!((large.ring_radius, large.nms_radius, large.refine_half_window), (10, 5, 8));
        let fixed = DetectorConfig { ring_radius: Some(6), nms_radius: Some(9), ..cfg };
        let p = fixed.resolve(400.0);
        assert_eq!((p.ring_radius, p.nms_radius), (6, 9));
    }
}
