use crate::error::{CalibError, Result};

fn check_pitch(pixel_pitch_mm: f32) -> Result<()> {
    if !pixel_pitch_mm.is_finite() || pixel_pitch_mm <= 0.0 {
        return Err(CalibError::invalid(format!(
            "pixel pitch must be a positive finite number of millimetres, got {pixel_pitch_mm}"
        )));
    }
    Ok(())
}

fn check_length(value: f32, unit: &str) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(CalibError::invalid(format!(
            "radius must be non-negative, got {value} {unit}"
        )));
    }
    Ok(())
}

/// Converts a radius measured in pixels to metres given the physical pixel
/// pitch in millimetres.
///
/// ```
/// # use curvecal::unit_converter::pixel_radius_to_meters;
/// let r = pixel_radius_to_meters(4000.0, 0.25).unwrap();
/// assert!((r - 1.0).abs() < 1e-6);
/// ```
pub fn pixel_radius_to_meters(radius_px: f32, pixel_pitch_mm: f32) -> Result<f32> {
    check_pitch(pixel_pitch_mm)?;
    check_length(radius_px, "px")?;
    Ok((radius_px as f64 * pixel_pitch_mm as f64 / 1000.0) as f32)
}

/// Inverse of [`pixel_radius_to_meters`].
pub fn meters_to_pixel_radius(radius_m: f32, pixel_pitch_mm: f32) -> Result<f32> {
    check_pitch(pixel_pitch_mm)?;
    check_length(radius_m, "m")?;
    Ok((radius_m as f64 * 1000.0 / pixel_pitch_mm as f64) as f32)
}
