use curvecal::{
    detect_curvature, generate_chess_board, pixel_radius_to_meters, warp_to_curved, warp_to_flat,
    CalibError, CurvatureEstimator, DetectorConfig, ImageBuffer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A 10x8 cell board (9x7 inner intersections) as seen on a surface of `radius`.
fn curved_board(width: u32, height: u32, radius: f32) -> ImageBuffer {
    let flat = generate_chess_board(width, height, 10, 8, 0, 0).unwrap();
    warp_to_curved(&flat.view(), radius).unwrap()
}

fn assert_close(measured: f32, expected: f32, tolerance: f32) {
    let rel = (measured - expected).abs() / expected;
    assert!(
        rel < tolerance,
        "measured {measured}, expected {expected} (relative error {rel})"
    );
}

#[test]
fn recovers_radius_of_synthetic_capture() {
    let capture = curved_board(800, 600, 1500.0);
    let radius = detect_curvature(&capture.view(), 9, 7, false).unwrap();
    assert_close(radius, 1500.0, 0.05);
}

#[test]
fn full_screen_wide_board() {
    // 8x8 cells on 1920x1080 are 240x135 pixels
    let flat = generate_chess_board(1920, 1080, 8, 8, 0, 0).unwrap();
    let capture = warp_to_curved(&flat.view(), 3000.0).unwrap();
    let radius = detect_curvature(&capture.view(), 7, 7, false).unwrap();
    assert_close(radius, 3000.0, 0.05);
}

#[test]
fn portrait_board() {
    // 10x8 cells on 600x800 are 60x100 pixels
    let capture = curved_board(600, 800, 1500.0);
    let estimate = CurvatureEstimator::default()
        .estimate(&capture.view(), 9, 7, false)
        .unwrap();
    assert_eq!(estimate.intersections.len(), 63);
    assert_close(estimate.radius, 1500.0, 0.05);
}

#[test]
fn estimate_reports_lattice_and_rows() {
    let capture = curved_board(800, 600, 1200.0);
    let estimator = CurvatureEstimator::default();
    let estimate = estimator.estimate(&capture.view(), 9, 7, false).unwrap();
    assert_eq!(estimate.intersections.len(), 63);
    assert_eq!(estimate.row_radii.len(), 7);
    assert!(!estimate.inverted);
    assert!(estimate.rms < 1.0);
    assert!(estimate.debug_image.is_none());
    for r in &estimate.row_radii {
        assert_close(*r, 1200.0, 0.1);
    }
    // row-major: x grows along a row, y grows down the centre column
    assert!(estimate.intersections[1][0] > estimate.intersections[0][0]);
    assert!(estimate.intersections[9 * 3 + 4][1] > estimate.intersections[4][1]);
}

#[test]
fn debug_mode_does_not_change_the_result() {
    let capture = curved_board(800, 600, 1500.0);
    let before = capture.clone();
    let estimator = CurvatureEstimator::default();
    let plain = estimator.estimate(&capture.view(), 9, 7, false).unwrap();
    let debug = estimator.estimate(&capture.view(), 9, 7, true).unwrap();
    assert_eq!(plain.radius, debug.radius);
    assert_eq!(plain.intersections, debug.intersections);
    let overlay = debug.debug_image.unwrap();
    assert_eq!((overlay.width(), overlay.height()), (800, 600));
    assert_ne!(overlay, capture);
    assert_eq!(capture, before);
}

#[test]
fn noisy_capture_still_measures() {
    let mut capture = curved_board(800, 600, 1500.0);
    let mut rng = StdRng::seed_from_u64(7);
    let noisy: Vec<u8> = capture
        .as_raw()
        .iter()
        .map(|&v| (v as i32 + rng.random_range(-12..=12)).clamp(0, 255) as u8)
        .collect();
    capture = ImageBuffer::from_raw(800, 600, noisy).unwrap();
    let radius = detect_curvature(&capture.view(), 9, 7, false).unwrap();
    assert_close(radius, 1500.0, 0.05);
}

#[test]
fn large_capture_is_downscaled_for_detection() {
    let capture = curved_board(1600, 1200, 3000.0);
    let config = DetectorConfig {
        max_detection_width: 800,
        ..Default::default()
    };
    let estimate = CurvatureEstimator::new(config)
        .unwrap()
        .estimate(&capture.view(), 9, 7, false)
        .unwrap();
    assert_close(estimate.radius, 3000.0, 0.05);
    // intersections are reported in full-resolution pixels
    assert!(estimate.intersections.iter().any(|p| p[0] > 1200.0));
}

#[test]
fn blank_capture_is_detection_failure() {
    let blank = ImageBuffer::new(800, 600, [255, 255, 255]).unwrap();
    assert!(matches!(
        detect_curvature(&blank.view(), 9, 7, false),
        Err(CalibError::DetectionFailure(_))
    ));
}

#[test]
fn flat_board_is_fit_failure() {
    let flat = generate_chess_board(800, 600, 10, 8, 0, 0).unwrap();
    assert!(matches!(
        detect_curvature(&flat.view(), 9, 7, false),
        Err(CalibError::FitFailure(_))
    ));
}

#[test]
fn asking_for_more_intersections_than_shown_fails() {
    let capture = curved_board(800, 600, 1500.0);
    assert!(matches!(
        detect_curvature(&capture.view(), 12, 9, false),
        Err(CalibError::DetectionFailure(_))
    ));
}

#[test]
fn flatten_undoes_curving() {
    // exact linear ramps survive bilinear resampling up to rounding
    let (w, h) = (256u32, 200u32);
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            data.extend_from_slice(&[x as u8, y as u8, 128]);
        }
    }
    let img = ImageBuffer::from_raw(w, h, data).unwrap();
    let curved = warp_to_curved(&img.view(), 600.0).unwrap();
    let restored = warp_to_flat(&curved.view(), 600.0).unwrap();

    let mut worst = 0i32;
    for y in 4..180 {
        for x in 8..248 {
            let a = img.get_rgb(x, y);
            let b = restored.get_rgb(x, y);
            for c in 0..3 {
                worst = worst.max((a[c] as i32 - b[c] as i32).abs());
            }
        }
    }
    assert!(worst <= 2, "max channel difference {worst}");
}

#[test]
fn measured_radius_in_meters() {
    let capture = curved_board(800, 600, 1500.0);
    let radius = detect_curvature(&capture.view(), 9, 7, false).unwrap();
    let meters = pixel_radius_to_meters(radius, 0.25).unwrap();
    assert_close(meters, 0.375, 0.05);
}
