//! distmap CLI - distance-to-feature maps for large rasters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use distmap_algorithms::binarize::binarize;
use distmap_algorithms::distance::{distance_map, DistanceParams, ProgressObserver, RunState, Stage};
use distmap_core::io::{BlockReader, GeoTiffReader, GeoTiffWriter};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "distmap")]
#[command(author, version, about = "Euclidean distance maps for large feature rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Distance from every cell to the nearest feature cell (value 1)
    Distance {
        /// Input feature raster (1 = feature)
        input: PathBuf,
        /// Output distance raster (float32, NaN = NoData)
        output: PathBuf,
        /// Tile edge in pixels; 0 computes over the whole grid
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        tile_size: i64,
        /// Pixels read around each tile; bounds the exact search radius
        #[arg(short = 'p', long, default_value_t = 512, allow_negative_numbers = true)]
        tile_padding: i64,
        /// Columns/rows per strip in whole-grid runs
        #[arg(long, default_value_t = 256)]
        strip_size: usize,
        /// Directory for scratch files (default: system temp dir)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },
    /// Show dimensions, block layout, spacing, NoData and CRS of a raster
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Normalize rasters to 0/1 (1 where valid and > 0)
    Binarize {
        /// Input raster file, or a directory of .tif/.tiff files
        input: PathBuf,
        /// Output raster (uint8), or a directory created if missing
        output: PathBuf,
        /// Directory for scratch files (default: system temp dir)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg:<10} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Progress bars per stage of a run
#[derive(Default)]
struct BarObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver for BarObserver {
    fn begin(&mut self, stage: Stage, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(bar_style());
        pb.set_message(stage.label());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        self.bar = Some(pb);
    }

    fn advance(&mut self, _stage: Stage, steps: usize) {
        if let Some(pb) = &self.bar {
            pb.inc(steps as u64);
        }
    }

    fn finish(&mut self, _stage: Stage) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }

    fn state_changed(&mut self, state: RunState) {
        if state.is_terminal() {
            if let Some(pb) = self.bar.take() {
                pb.abandon();
            }
        }
    }
}

fn open(path: &Path) -> Result<GeoTiffReader<f64>> {
    let reader = GeoTiffReader::<f64>::open(path)
        .with_context(|| format!("Failed to open raster {}", path.display()))?;
    let meta = reader.meta();
    info!("Input: {} x {}", meta.cols, meta.rows);
    Ok(reader)
}

/// Input/output pairs for `binarize`.
///
/// A directory input maps every `.tif`/`.tiff` file in it (sorted, not
/// recursive) to the same file name under `output`, which is created.
fn binarize_jobs(input: &Path, output: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    if !input.is_dir() {
        return Ok(vec![(input.to_path_buf(), output.to_path_buf())]);
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(input).with_context(|| format!("Failed to list {}", input.display()))? {
        let path = entry?.path();
        let is_tiff = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
        if path.is_file() && is_tiff {
            sources.push(path);
        }
    }
    sources.sort();
    if sources.is_empty() {
        anyhow::bail!("No .tif/.tiff files in {}", input.display());
    }

    Ok(sources
        .into_iter()
        .filter_map(|src| {
            let name = src.file_name()?.to_owned();
            Some((src, output.join(name)))
        })
        .collect())
}

fn binarize_file(input: &Path, output: &Path, scratch_dir: Option<&Path>) -> Result<()> {
    let mut reader = open(input)?;
    let meta = reader.meta().retyped::<u8>();
    let mut writer =
        GeoTiffWriter::<u8>::create(output, meta, scratch_dir).context("Failed to prepare output")?;
    binarize(&mut reader, &mut writer, &mut BarObserver::default())
        .with_context(|| format!("Binarization of {} failed", input.display()))?;
    writer.finish().context("Failed to write output")
}

/// Negative sizes disable the feature they control
fn clamp_pixels(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Distance {
            input,
            output,
            tile_size,
            tile_padding,
            strip_size,
            scratch_dir,
        } => {
            let params = DistanceParams {
                tile_size: clamp_pixels(tile_size),
                tile_padding: clamp_pixels(tile_padding),
                strip_size,
                scratch_dir,
            };
            let mut reader = open(&input)?;

            let mut meta = reader.meta().retyped::<f32>();
            meta.nodata = Some(f32::NAN);
            let mut writer = GeoTiffWriter::<f32>::create(&output, meta, params.scratch_dir.as_deref())
                .context("Failed to prepare output")?;

            let start = Instant::now();
            let summary = distance_map(&mut reader, &mut writer, &params, &mut BarObserver::default())
                .context("Distance computation failed")?;

            let pb = ProgressBar::new_spinner();
            pb.set_message("Writing output...");
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            writer.finish().context("Failed to write output")?;
            pb.finish_and_clear();

            info!(
                "{}: {} feature cells, {} valid cells, {} windows written",
                summary.strategy, summary.feature_cells, summary.valid_cells, summary.windows_written
            );
            done("Distance map", &output, start.elapsed());
        }

        Commands::Info { input } => {
            let reader = open(&input)?;
            let meta = reader.meta();
            let (block_rows, block_cols) = reader.block_shape();
            let spacing = meta.pixel_spacing();
            let bounds = meta.transform.bounds(meta.cols, meta.rows);

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", meta.cols, meta.rows, meta.rows * meta.cols);
            println!("Block size: {} x {}", block_cols, block_rows);
            println!("Pixel spacing: {} x {}", spacing.dx, spacing.dy);
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            match &meta.crs {
                Some(crs) => {
                    println!("CRS: {} ({:?})", crs, crs.kind());
                    println!("Projected: {}", crs.is_projected());
                }
                None => println!("CRS: none"),
            }
            match meta.nodata {
                Some(nodata) => println!("NoData: {}", nodata),
                None => println!("NoData: none"),
            }
        }

        Commands::Binarize {
            input,
            output,
            scratch_dir,
        } => {
            let start = Instant::now();
            for (src, dst) in binarize_jobs(&input, &output)? {
                binarize_file(&src, &dst, scratch_dir.as_deref())?;
                done("Binary raster", &dst, start.elapsed());
            }
        }
    }

    Ok(())
}
