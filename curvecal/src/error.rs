use thiserror::Error;

/// Failure kinds reported by every fallible operation in the crate.
///
/// `DetectionFailure` and `FitFailure` are kept apart so callers can tell
/// "no grid seen" from "grid seen but geometry unusable" and decide whether
/// a new capture is worth taking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibError {
    /// Malformed geometry, non-positive counts, radius or pitch, or a
    /// rectangle-containment violation. Raised before any pixel is touched.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The expected grid could not be found in a captured image.
    #[error("grid detection failed: {0}")]
    DetectionFailure(String),

    /// Grid intersections were found but the curvature fit is degenerate.
    #[error("curvature fit failed: {0}")]
    FitFailure(String),
}

impl CalibError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CalibError::InvalidParameter(msg.into())
    }

    pub(crate) fn detection(msg: impl Into<String>) -> Self {
        CalibError::DetectionFailure(msg.into())
    }

    pub(crate) fn fit(msg: impl Into<String>) -> Self {
        CalibError::FitFailure(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CalibError>;

/// Rejects zero, negative and NaN radii. `f32::INFINITY` is accepted: it is
/// the "no curvature" radius.
pub(crate) fn check_radius(radius: f32) -> Result<()> {
    if radius.is_nan() || radius <= 0.0 {
        return Err(CalibError::invalid(format!(
            "curvature radius must be strictly positive, got {radius}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_validation() {
        assert!(check_radius(1.0).is_ok());
        assert!(check_radius(f32::INFINITY).is_ok());
        assert!(matches!(check_radius(0.0), Err(CalibError::InvalidParameter(_))));
        assert!(matches!(check_radius(-1.0), Err(CalibError::InvalidParameter(_))));
        assert!(matches!(check_radius(f32::NAN), Err(CalibError::InvalidParameter(_))));
    }

    #[test]
    fn messages_name_the_kind() {
        let e = CalibError::detection("found 3 of 12 intersections");
        assert_eq!(e.to_string(), "grid detection failed: found 3 of 12 intersections");
    }
}
