use std::sync::{Arc, Mutex, PoisonError};

use crate::curvature_estimator::CurvatureEstimator;
use crate::curvature_profile::{self, CurvatureMap, WarpDirection};
use crate::dewarper::Dewarper;
use crate::detector_config::DetectorConfig;
use crate::error::Result;
use crate::image_buffer::{ImageBuffer, ImageView, ImageViewMut};
use crate::pattern_generator;
use crate::unit_converter;

/// The calibration operations as seen by a host application.
///
/// Hosts hold a `dyn CalibrationBackend` so the native implementation can be
/// swapped for another one, e.g. a GPU remapper, without touching callers.
pub trait CalibrationBackend: Send + Sync {
    fn generate_chess_board(
        &self,
        width: u32,
        height: u32,
        cols: u32,
        rows: u32,
        start_x: u32,
        start_y: u32,
    ) -> Result<ImageBuffer>;

    #[allow(clippy::too_many_arguments)]
    fn generate_chess_board_group(
        &self,
        total_width: u32,
        total_height: u32,
        group_x_offset: u32,
        group_width: u32,
        group_height: u32,
        cols: u32,
        rows: u32,
    ) -> Result<ImageBuffer>;

    #[allow(clippy::too_many_arguments)]
    fn generate_chess_board_group_with_black_pad(
        &self,
        total_width: u32,
        total_height: u32,
        group_x_offset: u32,
        group_y_offset: u32,
        group_width: u32,
        group_height: u32,
        active_x_offset: u32,
        active_y_offset: u32,
        active_width: u32,
        active_height: u32,
        cols: u32,
        rows: u32,
    ) -> Result<ImageBuffer>;

    fn detect_curvature(&self, image: &ImageView, cols: u32, rows: u32, debug: bool)
        -> Result<f32>;

    fn build_profile(&self, width: u32, radius: f32) -> Result<Vec<f32>>;

    fn build_map(&self, width: u32, height: u32, radius: f32) -> Result<Arc<CurvatureMap>>;

    fn warp_to_flat(&self, image: &ImageView, radius: f32) -> Result<ImageBuffer>;

    fn warp_to_flat_in_place(&self, image: &mut ImageViewMut, radius: f32) -> Result<()>;

    fn warp_to_curved(&self, image: &ImageView, radius: f32) -> Result<ImageBuffer>;

    fn warp_to_curved_in_place(&self, image: &mut ImageViewMut, radius: f32) -> Result<()>;

    fn pixel_radius_to_meters(&self, radius_px: f32, pixel_pitch_mm: f32) -> Result<f32>;
}

/// Native implementation. Maps are cached across calls.
#[derive(Debug, Default)]
pub struct CpuBackend {
    estimator: CurvatureEstimator,
    dewarper: Mutex<Dewarper>,
}

impl CpuBackend {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        Ok(CpuBackend {
            estimator: CurvatureEstimator::new(config)?,
            dewarper: Mutex::new(Dewarper::default()),
        })
    }

    fn with_dewarper<T>(&self, f: impl FnOnce(&mut Dewarper) -> Result<T>) -> Result<T> {
        let mut dewarper = self.dewarper.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut dewarper)
    }
}

impl CalibrationBackend for CpuBackend {
    fn generate_chess_board(
        &self,
        width: u32,
        height: u32,
        cols: u32,
        rows: u32,
        start_x: u32,
        start_y: u32,
    ) -> Result<ImageBuffer> {
        pattern_generator::generate_chess_board(width, height, cols, rows, start_x, start_y)
    }

    fn generate_chess_board_group(
        &self,
        total_width: u32,
        total_height: u32,
        group_x_offset: u32,
        group_width: u32,
        group_height: u32,
        cols: u32,
        rows: u32,
    ) -> Result<ImageBuffer> {
        pattern_generator::generate_chess_board_group(
            total_width,
            total_height,
            group_x_offset,
            group_width,
            group_height,
            cols,
            rows,
        )
    }

    fn generate_chess_board_group_with_black_pad(
        &self,
        total_width: u32,
        total_height: u32,
        group_x_offset: u32,
        group_y_offset: u32,
        group_width: u32,
        group_height: u32,
        active_x_offset: u32,
        active_y_offset: u32,
        active_width: u32,
        active_height: u32,
        cols: u32,
        rows: u32,
    ) -> Result<ImageBuffer> {
        pattern_generator::generate_chess_board_group_with_black_pad(
            total_width,
            total_height,
            group_x_offset,
            group_y_offset,
            group_width,
            group_height,
            active_x_offset,
            active_y_offset,
            active_width,
            active_height,
            cols,
            rows,
        )
    }

    fn detect_curvature(
        &self,
        image: &ImageView,
        cols: u32,
        rows: u32,
        debug: bool,
    ) -> Result<f32> {
        self.estimator
            .estimate(image, cols, rows, debug)
            .map(|estimate| estimate.radius)
    }

    fn build_profile(&self, width: u32, radius: f32) -> Result<Vec<f32>> {
        curvature_profile::build_profile(width, radius)
    }

    fn build_map(&self, width: u32, height: u32, radius: f32) -> Result<Arc<CurvatureMap>> {
        self.with_dewarper(|d| d.map_for(width, height, radius, WarpDirection::ToFlat))
    }

    fn warp_to_flat(&self, image: &ImageView, radius: f32) -> Result<ImageBuffer> {
        self.with_dewarper(|d| d.warp_to_flat(image, radius))
    }

    fn warp_to_flat_in_place(&self, image: &mut ImageViewMut, radius: f32) -> Result<()> {
        self.with_dewarper(|d| d.warp_in_place(image, radius, WarpDirection::ToFlat))
    }

    fn warp_to_curved(&self, image: &ImageView, radius: f32) -> Result<ImageBuffer> {
        self.with_dewarper(|d| d.warp_to_curved(image, radius))
    }

    fn warp_to_curved_in_place(&self, image: &mut ImageViewMut, radius: f32) -> Result<()> {
        self.with_dewarper(|d| d.warp_in_place(image, radius, WarpDirection::ToCurved))
    }

    fn pixel_radius_to_meters(&self, radius_px: f32, pixel_pitch_mm: f32) -> Result<f32> {
        unit_converter::pixel_radius_to_meters(radius_px, pixel_pitch_mm)
    }
}
