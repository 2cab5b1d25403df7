use tracing::debug;

use crate::error::{check_radius, CalibError, Result};

/// Which way a [`CurvatureMap`] moves pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WarpDirection {
    /// Output is the flattened image; sources are read from the curved capture.
    ToFlat,
    /// Output is the curved image; sources are read from the flat image.
    ToCurved,
}

impl WarpDirection {
    fn to_tag(self) -> u32 {
        match self {
            WarpDirection::ToFlat => 0,
            WarpDirection::ToCurved => 1,
        }
    }

    fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(WarpDirection::ToFlat),
            1 => Ok(WarpDirection::ToCurved),
            _ => Err(CalibError::invalid(format!("unknown warp direction tag {tag}"))),
        }
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CalibError::invalid(format!(
            "map dimensions must be non-zero, got {width}x{height}"
        )));
    }
    Ok(())
}

#[inline]
fn centre_column(width: u32) -> f64 {
    (width as f64 - 1.0) / 2.0
}

/// `R * (1 - cos(theta))`, written with `sin` so it stays exact for huge radii.
#[inline]
fn sagitta(radius: f64, theta: f64) -> f64 {
    let half = (theta / 2.0).sin();
    2.0 * radius * half * half
}

/// Vertical displacement of every column of a flat row bent to `radius`.
///
/// `profile[x] = R * (1 - cos((x - cx) / R))` with `cx = (width - 1) / 2`:
/// zero at the centre column, growing towards both edges. An infinite radius
/// yields an all-zero profile.
pub fn build_profile(width: u32, radius: f32) -> Result<Vec<f32>> {
    if width == 0 {
        return Err(CalibError::invalid("profile width must be non-zero"));
    }
    check_radius(radius)?;
    if radius.is_infinite() {
        return Ok(vec![0.0; width as usize]);
    }
    let r = radius as f64;
    let cx = centre_column(width);
    Ok((0..width)
        .map(|x| sagitta(r, (x as f64 - cx) / r) as f32)
        .collect())
}

/// Dense per-pixel source coordinates for one warp.
///
/// For every output pixel `(x, y)` the map stores the `(x, y)` position to
/// sample in the input image. Built once per `(width, height, radius,
/// direction)` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvatureMap {
    width: u32,
    height: u32,
    radius: f32,
    direction: WarpDirection,
    /// Interleaved source coordinates, `width * height * 2` floats.
    map_data: Vec<f32>,
}

/// Byte size of the serialised header: width, height, radius, direction.
const HEADER_LEN: usize = 8 + 8 + 4 + 4;

impl CurvatureMap {
    fn build(width: u32, height: u32, radius: f32, direction: WarpDirection) -> Result<Self> {
        check_dimensions(width, height)?;
        check_radius(radius)?;

        let mut map_data = Vec::with_capacity(width as usize * height as usize * 2);
        if radius.is_infinite() {
            for y in 0..height {
                for x in 0..width {
                    map_data.push(x as f32);
                    map_data.push(y as f32);
                }
            }
        } else {
            // The horizontal source and the vertical shift only depend on the column.
            let r = radius as f64;
            let cx = centre_column(width);
            let columns: Vec<(f32, f64)> = (0..width)
                .map(|x| {
                    let u = x as f64 - cx;
                    match direction {
                        WarpDirection::ToFlat => {
                            let theta = u / r;
                            ((cx + r * theta.sin()) as f32, sagitta(r, theta))
                        }
                        WarpDirection::ToCurved => {
                            let theta = (u / r).clamp(-1.0, 1.0).asin();
                            ((cx + r * theta) as f32, -sagitta(r, theta))
                        }
                    }
                })
                .collect();
            for y in 0..height {
                for &(sx, dy) in &columns {
                    map_data.push(sx);
                    map_data.push((y as f64 + dy) as f32);
                }
            }
        }

        debug!(
            "built {:?} curvature map {}x{} for radius {}",
            direction, width, height, radius
        );
        Ok(CurvatureMap {
            width,
            height,
            radius,
            direction,
            map_data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn direction(&self) -> WarpDirection {
        self.direction
    }

    /// Source coordinate sampled for output pixel `(x, y)`.
    ///
    /// # Panics
    /// Panics if `(x, y)` is outside the map.
    pub fn source(&self, x: u32, y: u32) -> (f32, f32) {
        let index = (y as usize * self.width as usize + x as usize) * 2;
        (self.map_data[index], self.map_data[index + 1])
    }

    /// Offset from output pixel `(x, y)` to its source.
    pub fn displacement(&self, x: u32, y: u32) -> (f32, f32) {
        let (sx, sy) = self.source(x, y);
        (sx - x as f32, sy - y as f32)
    }

    /// Source coordinates of output row `y`, interleaved `x, y`.
    pub(crate) fn row(&self, y: u32) -> &[f32] {
        let start = y as usize * self.width as usize * 2;
        &self.map_data[start..start + self.width as usize * 2]
    }

    /// Little-endian encoding: `u64` width, `u64` height, `f32` radius, `u32`
    /// direction, then the interleaved source coordinates as `f32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.map_data.len() * 4);
        data.extend_from_slice(&(self.width as u64).to_le_bytes());
        data.extend_from_slice(&(self.height as u64).to_le_bytes());
        data.extend_from_slice(&self.radius.to_le_bytes());
        data.extend_from_slice(&self.direction.to_tag().to_le_bytes());
        for &val in &self.map_data {
            data.extend_from_slice(&val.to_le_bytes());
        }
        data
    }

    /// Decodes [`CurvatureMap::to_bytes`] output.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        fn field<const N: usize>(data: &[u8], offset: &mut usize) -> Result<[u8; N]> {
            let bytes = data
                .get(*offset..*offset + N)
                .and_then(|s| <[u8; N]>::try_from(s).ok())
                .ok_or_else(|| CalibError::invalid("curvature map data is truncated"))?;
            *offset += N;
            Ok(bytes)
        }

        let mut offset = 0;
        let width = u64::from_le_bytes(field(data, &mut offset)?);
        let height = u64::from_le_bytes(field(data, &mut offset)?);
        let radius = f32::from_le_bytes(field(data, &mut offset)?);
        let direction = WarpDirection::from_tag(u32::from_le_bytes(field(data, &mut offset)?))?;

        let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(CalibError::invalid(format!(
                    "curvature map dimensions {width}x{height} are out of range"
                )))
            }
        };
        check_dimensions(width, height)?;
        check_radius(radius)?;

        let payload = &data[offset..];
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(2 * 4))
            .ok_or_else(|| {
                CalibError::invalid(format!("a {width}x{height} curvature map is too large"))
            })?;
        if payload.len() != expected {
            return Err(CalibError::invalid(format!(
                "a {width}x{height} curvature map needs {expected} payload bytes, got {}",
                payload.len()
            )));
        }
        let map_data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let map = CurvatureMap {
            width,
            height,
            radius,
            direction,
            map_data,
        };
        map.check_row_order()?;
        Ok(map)
    }

    /// Checks that every source lies on the side of its output row that the
    /// in-place warp has not rewritten yet: at or below for [`WarpDirection::ToFlat`]
    /// (rows go top-down), at or above for [`WarpDirection::ToCurved`] (bottom-up).
    fn check_row_order(&self) -> Result<()> {
        for y in 0..self.height {
            for s in self.row(y).chunks_exact(2) {
                let (sx, sy) = (s[0], s[1]);
                if !sx.is_finite() || !sy.is_finite() {
                    return Err(CalibError::invalid(format!(
                        "curvature map row {y} has a non-finite source"
                    )));
                }
                let ordered = match self.direction {
                    WarpDirection::ToFlat => sy >= y as f32,
                    WarpDirection::ToCurved => sy <= y as f32,
                };
                if !ordered {
                    return Err(CalibError::invalid(format!(
                        "{:?} curvature map row {y} samples row {sy}",
                        self.direction
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Map that flattens a curved capture: for each flat pixel, where it was
/// seen in the curved image.
pub fn build_map(width: u32, height: u32, radius: f32) -> Result<CurvatureMap> {
    CurvatureMap::build(width, height, radius, WarpDirection::ToFlat)
}

/// Map that bends a flat image: for each curved pixel, where it comes from
/// in the flat image.
pub fn build_inverse_map(width: u32, height: u32, radius: f32) -> Result<CurvatureMap> {
    CurvatureMap::build(width, height, radius, WarpDirection::ToCurved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn profile_is_symmetric_and_zero_at_centre() {
        let profile = build_profile(101, 200.0).unwrap();
        assert_eq!(profile.len(), 101);
        assert_eq!(profile[50], 0.0);
        for x in 0..101 {
            assert_eq!(profile[x], profile[100 - x]);
        }
        let edge = 200.0 * (1.0 - (50.0f64 / 200.0).cos());
        assert_abs_diff_eq!(profile[0] as f64, edge, epsilon = 1e-4);
        assert!(profile[0] > profile[10]);
    }

    #[test]
    fn profile_of_even_width() {
        let profile = build_profile(4, 10.0).unwrap();
        assert_eq!(profile[0], profile[3]);
        assert_eq!(profile[1], profile[2]);
        assert!(profile[1] > 0.0);
    }

    #[test]
    fn infinite_radius_is_flat() {
        assert!(build_profile(64, f32::INFINITY).unwrap().iter().all(|&v| v == 0.0));
        let map = build_map(8, 5, f32::INFINITY).unwrap();
        for y in 0..5 {
            for x in 0..8 {
                assert_eq!(map.source(x, y), (x as f32, y as f32));
                assert_eq!(map.displacement(x, y), (0.0, 0.0));
            }
        }
    }

    #[test]
    fn rejects_bad_radius_and_size() {
        for r in [0.0, -1.0, f32::NAN] {
            assert!(matches!(build_profile(10, r), Err(CalibError::InvalidParameter(_))));
            assert!(matches!(build_map(10, 10, r), Err(CalibError::InvalidParameter(_))));
            assert!(build_inverse_map(10, 10, r).is_err());
        }
        assert!(build_map(0, 10, 100.0).is_err());
        assert!(build_profile(0, 100.0).is_err());
    }

    #[test]
    fn builds_are_bit_identical() {
        let a = build_map(97, 31, 321.5).unwrap();
        let b = build_map(97, 31, 321.5).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_eq!(build_profile(97, 321.5).unwrap(), build_profile(97, 321.5).unwrap());
    }

    #[test]
    fn flat_map_reads_below_and_inverse_reads_above() {
        let flat = build_map(50, 20, 40.0).unwrap();
        let curved = build_inverse_map(50, 20, 40.0).unwrap();
        assert_eq!(flat.direction(), WarpDirection::ToFlat);
        assert_eq!(curved.direction(), WarpDirection::ToCurved);
        let profile = build_profile(50, 40.0).unwrap();
        for y in 0..20 {
            for x in 0..50 {
                let (_, fy) = flat.source(x, y);
                let (_, cy) = curved.source(x, y);
                assert!(fy >= y as f32);
                assert!(cy <= y as f32);
                assert_abs_diff_eq!(fy - y as f32, profile[x as usize], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn maps_are_mutual_inverses() {
        let (w, h, r) = (200u32, 60u32, 350.0f32);
        let flat = build_map(w, h, r).unwrap();
        let curved = build_inverse_map(w, h, r).unwrap();
        // a curved pixel's flat source, pushed through the flat map, lands back on it
        for &(x, y) in &[(0u32, 30u32), (37, 10), (100, 59), (199, 45)] {
            let (fx, fy) = curved.source(x, y);
            let theta = (fx as f64 - 99.5) / r as f64;
            let back_x = 99.5 + r as f64 * theta.sin();
            let back_y = fy as f64 + r as f64 * (1.0 - theta.cos());
            assert_abs_diff_eq!(back_x, x as f64, epsilon = 1e-3);
            assert_abs_diff_eq!(back_y, y as f64, epsilon = 1e-3);
        }
        assert_eq!(flat.width(), w);
        assert_eq!(flat.height(), h);
        assert_eq!(flat.radius(), r);
    }

    #[test]
    fn bytes_round_trip_and_reject_garbage() {
        let map = build_inverse_map(13, 7, 25.0).unwrap();
        let bytes = map.to_bytes();
        assert_eq!(CurvatureMap::from_bytes(&bytes).unwrap(), map);

        assert!(CurvatureMap::from_bytes(&bytes[..10]).is_err());
        assert!(CurvatureMap::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        let mut bad_tag = bytes.clone();
        bad_tag[20] = 9;
        assert!(matches!(
            CurvatureMap::from_bytes(&bad_tag),
            Err(CalibError::InvalidParameter(_))
        ));

        // a header claiming u32::MAX x u32::MAX pixels
        let mut huge = Vec::new();
        huge.extend_from_slice(&(u32::MAX as u64).to_le_bytes());
        huge.extend_from_slice(&(u32::MAX as u64).to_le_bytes());
        huge.extend_from_slice(&25.0f32.to_le_bytes());
        huge.extend_from_slice(&0u32.to_le_bytes());
        huge.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            CurvatureMap::from_bytes(&huge),
            Err(CalibError::InvalidParameter(_))
        ));
    }

    /// Byte offset of the source `y` of output pixel `(x, y)` in a serialised map.
    fn source_y_offset(width: u32, x: u32, y: u32) -> usize {
        HEADER_LEN + ((y * width + x) as usize * 2 + 1) * 4
    }

    #[test]
    fn decoding_rejects_sources_on_rewritten_rows() {
        // to-flat rows are rewritten top-down, so row 3 may not read row 1
        let flat = build_map(13, 7, 25.0).unwrap();
        let mut bytes = flat.to_bytes();
        let at = source_y_offset(13, 0, 3);
        bytes[at..at + 4].copy_from_slice(&1.0f32.to_le_bytes());
        assert!(matches!(
            CurvatureMap::from_bytes(&bytes),
            Err(CalibError::InvalidParameter(_))
        ));

        // to-curved rows are rewritten bottom-up, so row 2 may not read row 5
        let curved = build_inverse_map(13, 7, 25.0).unwrap();
        let mut bytes = curved.to_bytes();
        let at = source_y_offset(13, 6, 2);
        bytes[at..at + 4].copy_from_slice(&5.0f32.to_le_bytes());
        assert!(CurvatureMap::from_bytes(&bytes).is_err());

        let mut bytes = curved.to_bytes();
        bytes[at..at + 4].copy_from_slice(&f32::NAN.to_le_bytes());
        assert!(CurvatureMap::from_bytes(&bytes).is_err());

        // the same source on the allowed side decodes
        let mut bytes = curved.to_bytes();
        bytes[at..at + 4].copy_from_slice(&0.5f32.to_le_bytes());
        assert_eq!(CurvatureMap::from_bytes(&bytes).unwrap().source(6, 2).1, 0.5);
    }
}
