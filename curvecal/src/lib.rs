//! # curvecal
//!
//! The `curvecal` library calibrates curved displays with a camera. It draws
//! chessboard test patterns for one or several physical outputs, measures the
//! radius of curvature of the board as seen in a captured image, and
//! resamples images between the flat and the curved geometry.
//!
//! ## Overview of Modules
//!
//! - **`pattern_generator`**: Renders chessboards into RGB canvases, either
//!   covering a whole output or confined to an active area padded with black.
//!   Also renders per-output slices of one board spanning a display wall.
//!
//! - **`curvature_estimator`**: Finds the inner intersections of a captured
//!   board and fits a circle through every row of them. Built on
//!   `corner_detector` (ChESS response, suppression, sub-pixel refinement),
//!   `grid_lattice` (kd-tree based lattice assembly) and `circle_fit`.
//!
//! - **`curvature_profile`**: Computes the per-column displacement profile and
//!   the dense per-pixel `CurvatureMap` for a given radius.
//!
//! - **`dewarper`**: Bilinear remapping through a `CurvatureMap`, copying or
//!   in place, with maps optionally kept in a `CurvatureMapCache`.
//!
//! - **`unit_converter`**: Converts radii between pixels and metres.
//!
//! - **`backend`**: The `CalibrationBackend` trait that host applications
//!   depend on, and its native implementation `CpuBackend`.
//!
//! - **`rect`** and **`image_buffer`**: Shared geometry and the owned and
//!   borrowed RGB image types.
//!
//! All fallible operations return [`Result`] with a [`CalibError`].

pub mod backend;
pub mod circle_fit;
pub mod corner_detector;
pub mod curvature_estimator;
pub mod curvature_map_cache;
pub mod curvature_profile;
pub mod detector_config;
pub mod dewarper;
pub mod error;
pub mod grid_lattice;
pub mod image_buffer;
pub mod pattern_generator;
pub mod rect;
pub mod unit_converter;

mod debug_overlay;

pub use backend::{CalibrationBackend, CpuBackend};
pub use curvature_estimator::{detect_curvature, CurvatureEstimate, CurvatureEstimator};
pub use curvature_profile::{build_inverse_map, build_map, build_profile, CurvatureMap, WarpDirection};
pub use detector_config::DetectorConfig;
pub use dewarper::{
    remap, remap_in_place, warp_to_curved, warp_to_curved_in_place, warp_to_flat,
    warp_to_flat_in_place, Dewarper,
};
pub use error::{CalibError, Result};
pub use image_buffer::{ImageBuffer, ImageView, ImageViewMut};
pub use pattern_generator::{
    compose_layout, generate_chess_board, generate_chess_board_group,
    generate_chess_board_group_with_black_pad, generate_layout_slice, ChessBoardLayout,
};
pub use rect::{GridSpec, Rect};
pub use unit_converter::{meters_to_pixel_radius, pixel_radius_to_meters};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
