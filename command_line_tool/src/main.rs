use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use curvecal::curvature_profile::build_profile;
use curvecal::{
    pixel_radius_to_meters, CurvatureEstimator, DetectorConfig, Dewarper, ImageBuffer, Rect,
    WarpDirection,
};
use image::open;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chessboard patterns, curvature measurement and dewarping for curved displays.")]
struct Cli {
    /// Log pipeline details (same as RUST_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw a chessboard covering the canvas from (start-x, start-y)
    Chessboard {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[command(flatten)]
        grid: GridArgs,
        #[arg(long, default_value_t = 0)]
        start_x: u32,
        #[arg(long, default_value_t = 0)]
        start_y: u32,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Draw a chessboard confined to one group of a wider canvas
    Group {
        #[command(flatten)]
        canvas: CanvasArgs,
        #[arg(long)]
        group_x: u32,
        #[arg(long)]
        group_width: u32,
        #[arg(long)]
        group_height: u32,
        #[command(flatten)]
        grid: GridArgs,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Draw a chessboard in the active area of a group, padding the rest of the group with black
    PaddedGroup {
        #[command(flatten)]
        canvas: CanvasArgs,
        #[command(flatten)]
        group: GroupArgs,
        #[command(flatten)]
        active: ActiveArgs,
        #[command(flatten)]
        grid: GridArgs,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Render one group of a display wall as its own image, cells laid out over the whole wall
    LayoutSlice {
        #[command(flatten)]
        canvas: CanvasArgs,
        #[command(flatten)]
        group: GroupArgs,
        #[command(flatten)]
        active: ActiveArgs,
        #[command(flatten)]
        grid: GridArgs,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Measure the curvature radius of a captured chessboard
    Detect {
        /// Captured photo of the displayed board
        image: PathBuf,
        /// Inner intersections per row
        #[arg(long, default_value_t = 8)]
        cols: u32,
        /// Inner intersections per column
        #[arg(long, default_value_t = 10)]
        rows: u32,
        /// Physical pixel pitch in millimetres, to also report metres
        #[arg(long)]
        pitch_mm: Option<f32>,
        /// Write an annotated copy of the capture here
        #[arg(long)]
        debug_out: Option<PathBuf>,
        /// Detector settings as JSON; missing fields keep their defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Flatten a curved image
    Dewarp(WarpArgs),
    /// Bend a flat image, e.g. to synthesise a curved capture
    Curve(WarpArgs),
    /// Print the per-column displacement profile as CSV
    Profile {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        radius: f32,
    },
}

#[derive(Args, Debug)]
struct GridArgs {
    #[arg(long, default_value_t = 8)]
    cols: u32,
    #[arg(long, default_value_t = 8)]
    rows: u32,
}

#[derive(Args, Debug)]
struct CanvasArgs {
    #[arg(long)]
    total_width: u32,
    #[arg(long)]
    total_height: u32,
}

#[derive(Args, Debug)]
struct GroupArgs {
    #[arg(long)]
    group_x: u32,
    #[arg(long, default_value_t = 0)]
    group_y: u32,
    #[arg(long)]
    group_width: u32,
    #[arg(long)]
    group_height: u32,
}

impl GroupArgs {
    fn rect(&self) -> Rect {
        Rect::new(self.group_x, self.group_y, self.group_width, self.group_height)
    }
}

/// Active area, relative to the group origin.
#[derive(Args, Debug)]
struct ActiveArgs {
    #[arg(long, default_value_t = 0)]
    active_x: u32,
    #[arg(long, default_value_t = 0)]
    active_y: u32,
    #[arg(long)]
    active_width: u32,
    #[arg(long)]
    active_height: u32,
}

impl ActiveArgs {
    fn rect(&self) -> Rect {
        Rect::new(self.active_x, self.active_y, self.active_width, self.active_height)
    }
}

#[derive(Args, Debug)]
struct WarpArgs {
    input: PathBuf,
    /// Curvature radius in pixels
    #[arg(long)]
    radius: f32,
    #[arg(long, short)]
    output: PathBuf,
    /// Rewrite the decoded buffer instead of allocating a second one
    #[arg(long)]
    in_place: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Chessboard {
            width,
            height,
            grid,
            start_x,
            start_y,
            output,
        } => {
            let board = curvecal::generate_chess_board(
                width, height, grid.cols, grid.rows, start_x, start_y,
            )
            .context("Could not draw chessboard")?;
            save_image(&board, &output)
        }
        Command::Group {
            canvas,
            group_x,
            group_width,
            group_height,
            grid,
            output,
        } => {
            let board = curvecal::generate_chess_board_group(
                canvas.total_width,
                canvas.total_height,
                group_x,
                group_width,
                group_height,
                grid.cols,
                grid.rows,
            )
            .context("Could not draw group chessboard")?;
            save_image(&board, &output)
        }
        Command::PaddedGroup {
            canvas,
            group,
            active,
            grid,
            output,
        } => {
            let board = curvecal::generate_chess_board_group_with_black_pad(
                canvas.total_width,
                canvas.total_height,
                group.group_x,
                group.group_y,
                group.group_width,
                group.group_height,
                active.active_x,
                active.active_y,
                active.active_width,
                active.active_height,
                grid.cols,
                grid.rows,
            )
            .context("Could not draw padded chessboard")?;
            save_image(&board, &output)
        }
        Command::LayoutSlice {
            canvas,
            group,
            active,
            grid,
            output,
        } => {
            let slice = curvecal::generate_layout_slice(
                canvas.total_width,
                canvas.total_height,
                group.rect(),
                active.rect(),
                grid.cols,
                grid.rows,
            )
            .context("Could not render layout slice")?;
            save_image(&slice, &output)
        }
        Command::Detect {
            image,
            cols,
            rows,
            pitch_mm,
            debug_out,
            config,
        } => detect(&image, cols, rows, pitch_mm, debug_out.as_deref(), config.as_deref()),
        Command::Dewarp(args) => warp(&args, WarpDirection::ToFlat),
        Command::Curve(args) => warp(&args, WarpDirection::ToCurved),
        Command::Profile { width, radius } => {
            let profile = build_profile(width, radius).context("Could not build profile")?;
            println!("x,displacement");
            for (x, d) in profile.iter().enumerate() {
                println!("{x},{d:.4}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DetectorConfig> {
    let Some(path) = path else {
        return Ok(DetectorConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read config {}", path.display()))?;
    let config: DetectorConfig = serde_json::from_str(&text)
        .with_context(|| format!("Invalid detector config {}", path.display()))?;
    debug!("loaded detector config {:?}", config);
    Ok(config)
}

fn detect(
    image: &Path,
    cols: u32,
    rows: u32,
    pitch_mm: Option<f32>,
    debug_out: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    let estimator = CurvatureEstimator::new(load_config(config)?)?;
    let capture = read_image(image)?;
    let estimate = estimator
        .estimate(&capture.view(), cols, rows, debug_out.is_some())
        .with_context(|| format!("Could not measure curvature in {}", image.display()))?;

    println!("radius_px {:.2}", estimate.radius);
    println!("rms_px {:.4}", estimate.rms);
    if let Some(pitch) = pitch_mm {
        let meters = pixel_radius_to_meters(estimate.radius, pitch)?;
        println!("radius_m {:.4}", meters);
    }
    if let (Some(path), Some(overlay)) = (debug_out, estimate.debug_image.as_ref()) {
        save_image(overlay, path)?;
    }
    Ok(())
}

fn warp(args: &WarpArgs, direction: WarpDirection) -> Result<()> {
    let mut img = read_image(&args.input)?;
    let mut dewarper = Dewarper::default();
    if args.in_place {
        dewarper
            .warp_in_place(&mut img.view_mut(), args.radius, direction)
            .context("Could not warp image")?;
        save_image(&img, &args.output)
    } else {
        let out = dewarper
            .warp(&img.view(), args.radius, direction)
            .context("Could not warp image")?;
        save_image(&out, &args.output)
    }
}

fn save_image(img: &ImageBuffer, filename: &Path) -> Result<()> {
    info!("Writing image {}", filename.display());
    let rgb = image::RgbImage::from_raw(img.width(), img.height(), img.as_raw().to_vec())
        .ok_or_else(|| anyhow!("image buffer does not match its dimensions"))?;
    rgb.save(filename)
        .with_context(|| format!("Could not write {}", filename.display()))
}

fn read_image(filename: &Path) -> Result<ImageBuffer> {
    info!("Reading image file: {}", filename.display());
    let img = open(filename)
        .with_context(|| format!("Could not load image {}", filename.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(ImageBuffer::from_raw(width, height, img.into_raw())?)
}
