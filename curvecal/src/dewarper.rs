//! Resampling of images through a [`CurvatureMap`].
//!
//! Sampling is bilinear with edge replication: source coordinates outside the
//! image are clamped to the nearest valid pixel. The in-place variants give
//! exactly the same bytes as the copying ones. A to-flat map only reads rows at
//! or below the row being written, so rows are rewritten top-down; a to-curved
//! map only reads rows at or above, so rows are rewritten bottom-up. Either way
//! a single scratch row is enough.

use std::sync::Arc;

use tracing::debug;

use crate::curvature_map_cache::CurvatureMapCache;
use crate::curvature_profile::{build_inverse_map, build_map, CurvatureMap, WarpDirection};
use crate::error::{check_radius, CalibError, Result};
use crate::image_buffer::{ImageBuffer, ImageView, ImageViewMut, CHANNELS};

/// Bilinear sample of `image` at `(sx, sy)`, rounded to the nearest `u8`.
///
/// Neighbours with zero weight are never read, which keeps the in-place row
/// order valid when a source lies exactly on a row.
pub(crate) fn sample_bilinear(image: &ImageView, sx: f32, sy: f32) -> [u8; 3] {
    let x = sx.clamp(0.0, (image.width() - 1) as f32);
    let y = sy.clamp(0.0, (image.height() - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_rgb(x0, y0);
    let (top, bottom) = if fx > 0.0 {
        let p10 = image.get_rgb(x0 + 1, y0);
        let top = lerp(p00, p10, fx);
        let bottom = if fy > 0.0 {
            Some(lerp(image.get_rgb(x0, y0 + 1), image.get_rgb(x0 + 1, y0 + 1), fx))
        } else {
            None
        };
        (top, bottom)
    } else {
        let top = p00.map(|c| c as f32);
        let bottom = if fy > 0.0 {
            Some(image.get_rgb(x0, y0 + 1).map(|c| c as f32))
        } else {
            None
        };
        (top, bottom)
    };

    let mut out = [0u8; 3];
    for c in 0..CHANNELS {
        let v = match bottom {
            Some(b) => top[c] + (b[c] - top[c]) * fy,
            None => top[c],
        };
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[inline]
fn lerp(a: [u8; 3], b: [u8; 3], t: f32) -> [f32; 3] {
    let mut out = [0.0; 3];
    for c in 0..CHANNELS {
        out[c] = a[c] as f32 + (b[c] as f32 - a[c] as f32) * t;
    }
    out
}

fn check_map_fits(map: &CurvatureMap, width: u32, height: u32) -> Result<()> {
    if map.width() != width || map.height() != height {
        return Err(CalibError::invalid(format!(
            "a {}x{} curvature map cannot warp a {width}x{height} image",
            map.width(),
            map.height()
        )));
    }
    Ok(())
}

/// Fills `out` with output row `y` of `map` sampled from `src`.
fn remap_row(src: &ImageView, map: &CurvatureMap, y: u32, out: &mut [u8]) {
    let sources = map.row(y);
    for (pixel, s) in out.chunks_exact_mut(CHANNELS).zip(sources.chunks_exact(2)) {
        pixel.copy_from_slice(&sample_bilinear(src, s[0], s[1]));
    }
}

/// Warps `image` through `map` into a new buffer.
pub fn remap(image: &ImageView, map: &CurvatureMap) -> Result<ImageBuffer> {
    check_map_fits(map, image.width(), image.height())?;
    let mut out = ImageBuffer::new(image.width(), image.height(), [0, 0, 0])?;
    let row_len = image.width() as usize * CHANNELS;
    let mut target = out.view_mut();
    for (y, row) in target.as_raw_mut().chunks_exact_mut(row_len).enumerate() {
        remap_row(image, map, y as u32, row);
    }
    drop(target);
    Ok(out)
}

/// Warps `image` through `map`, overwriting it.
pub fn remap_in_place(image: &mut ImageViewMut, map: &CurvatureMap) -> Result<()> {
    check_map_fits(map, image.width(), image.height())?;
    let mut scratch = vec![0u8; image.width() as usize * CHANNELS];
    let rows: Box<dyn Iterator<Item = u32>> = match map.direction() {
        WarpDirection::ToFlat => Box::new(0..image.height()),
        WarpDirection::ToCurved => Box::new((0..image.height()).rev()),
    };
    for y in rows {
        remap_row(&image.as_view(), map, y, &mut scratch);
        let range = image.row_range(y);
        image.as_raw_mut()[range].copy_from_slice(&scratch);
    }
    Ok(())
}

/// Flattens a curved capture taken at `radius`.
pub fn warp_to_flat(image: &ImageView, radius: f32) -> Result<ImageBuffer> {
    check_radius(radius)?;
    if radius.is_infinite() {
        return Ok(image.to_owned_buffer());
    }
    remap(image, &build_map(image.width(), image.height(), radius)?)
}

pub fn warp_to_flat_in_place(image: &mut ImageViewMut, radius: f32) -> Result<()> {
    check_radius(radius)?;
    if radius.is_infinite() {
        return Ok(());
    }
    let map = build_map(image.width(), image.height(), radius)?;
    remap_in_place(image, &map)
}

/// Bends a flat image to look like it was shown on a surface of `radius`.
pub fn warp_to_curved(image: &ImageView, radius: f32) -> Result<ImageBuffer> {
    check_radius(radius)?;
    if radius.is_infinite() {
        return Ok(image.to_owned_buffer());
    }
    remap(image, &build_inverse_map(image.width(), image.height(), radius)?)
}

pub fn warp_to_curved_in_place(image: &mut ImageViewMut, radius: f32) -> Result<()> {
    check_radius(radius)?;
    if radius.is_infinite() {
        return Ok(());
    }
    let map = build_inverse_map(image.width(), image.height(), radius)?;
    remap_in_place(image, &map)
}

/// Warps with maps kept in a [`CurvatureMapCache`], for callers that
/// dewarp many frames of the same size and radius.
#[derive(Debug, Default)]
pub struct Dewarper {
    cache: CurvatureMapCache,
}

impl Dewarper {
    pub fn new(cache: CurvatureMapCache) -> Self {
        Dewarper { cache }
    }

    pub fn cache(&self) -> &CurvatureMapCache {
        &self.cache
    }

    /// The cached map for an image of this size, built on first use.
    pub fn map_for(
        &mut self,
        width: u32,
        height: u32,
        radius: f32,
        direction: WarpDirection,
    ) -> Result<Arc<CurvatureMap>> {
        self.cache.get_or_build(width, height, radius, direction)
    }

    pub fn warp(
        &mut self,
        image: &ImageView,
        radius: f32,
        direction: WarpDirection,
    ) -> Result<ImageBuffer> {
        check_radius(radius)?;
        if radius.is_infinite() {
            return Ok(image.to_owned_buffer());
        }
        let map = self.map_for(image.width(), image.height(), radius, direction)?;
        remap(image, &map)
    }

    pub fn warp_in_place(
        &mut self,
        image: &mut ImageViewMut,
        radius: f32,
        direction: WarpDirection,
    ) -> Result<()> {
        check_radius(radius)?;
        if radius.is_infinite() {
            return Ok(());
        }
        let map = self.map_for(image.width(), image.height(), radius, direction)?;
        debug!("warping {}x{} image {:?} in place", image.width(), image.height(), direction);
        remap_in_place(image, &map)
    }

    pub fn warp_to_flat(&mut self, image: &ImageView, radius: f32) -> Result<ImageBuffer> {
        self.warp(image, radius, WarpDirection::ToFlat)
    }

    pub fn warp_to_curved(&mut self, image: &ImageView, radius: f32) -> Result<ImageBuffer> {
        self.warp(image, radius, WarpDirection::ToCurved)
    }
}
