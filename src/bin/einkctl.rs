//! einkctl
//!
//! Drive an e-ink panel from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Check whether the panel node exists
//! einkctl probe
//!
//! # Full refresh with the A2 waveform
//! einkctl --mode a2 full
//!
//! # Show an image with a partial refresh
//! einkctl --width 1404 --height 1872 show cover.png --partial
//!
//! # Filter an image for e-ink without touching the panel
//! einkctl optimize photo.jpg photo-eink.png
//! ```

#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::imageops::{self, FilterType};

use eink_controller::config::{DEFAULT_DEVICE_PATH, FALLBACK_DEVICE_PATH};
use eink_controller::preprocess::optimize_bitmap;
use eink_controller::{
    Builder, BusyPolicy, Dimensions, PixelDepth, RefreshKind, RefreshMode, RefreshScheduler,
};

/// E-ink panel control
#[derive(Parser)]
#[command(name = "einkctl")]
#[command(version)]
#[command(about = "Refresh, clear and draw on an e-ink panel device node")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Device node to open (repeat to give fallbacks)
    #[arg(short, long = "device", global = true)]
    devices: Vec<PathBuf>,

    /// Panel width in pixels
    #[arg(long, global = true, default_value_t = 1404)]
    width: u16,

    /// Panel height in pixels
    #[arg(long, global = true, default_value_t = 1872)]
    height: u16,

    /// Waveform to switch to before refreshing (INIT, DU, GC16, GL16, A2, FULL, PARTIAL)
    #[arg(short, long, global = true)]
    mode: Option<String>,

    /// Bits per pixel for uploaded frames
    #[arg(long, global = true, value_enum, default_value = "4")]
    bpp: Bpp,

    /// Busy-wait timeout in milliseconds (0 waits forever)
    #[arg(long, global = true, default_value_t = eink_controller::DEFAULT_BUSY_TIMEOUT_MS)]
    timeout: u32,

    /// Fail instead of waiting when the panel is busy
    #[arg(long, global = true)]
    no_wait: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the panel can be found
    Probe,
    /// List the available waveforms
    Modes,
    /// Full refresh
    Full,
    /// Partial refresh
    Partial,
    /// Clear the panel to white
    Clear,
    /// Display the gray-ramp test pattern
    Pattern,
    /// Display an image file
    Show {
        /// PNG or JPEG file
        file: PathBuf,

        /// Use a partial refresh
        #[arg(long)]
        partial: bool,
    },
    /// Filter an image for e-ink and save it as PNG
    Optimize {
        /// Source image
        input: PathBuf,
        /// Destination PNG
        output: PathBuf,
    },
}

/// Frame depths the panel accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Bpp {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
    #[value(name = "4")]
    Four,
    #[value(name = "8")]
    Eight,
}

impl From<Bpp> for PixelDepth {
    fn from(bpp: Bpp) -> Self {
        match bpp {
            Bpp::One => Self::Bpp1,
            Bpp::Two => Self::Bpp2,
            Bpp::Four => Self::Bpp4,
            Bpp::Eight => Self::Bpp8,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let devices = if cli.devices.is_empty() {
        vec![
            PathBuf::from(DEFAULT_DEVICE_PATH),
            PathBuf::from(FALLBACK_DEVICE_PATH),
        ]
    } else {
        cli.devices.clone()
    };

    let config = Builder::new()
        .dimensions(Dimensions::new(cli.width, cli.height)?)
        .device_paths(devices)
        .busy_timeout_ms(cli.timeout)
        .busy_policy(if cli.no_wait {
            BusyPolicy::Reject
        } else {
            BusyPolicy::Block
        })
        .frame_depth(cli.bpp.into())
        .build()?;
    let scheduler = RefreshScheduler::from_config(config);

    match &cli.command {
        Commands::Probe => {
            let available = scheduler.is_device_available();
            println!(
                "{}",
                if available {
                    "panel found"
                } else {
                    "panel not found"
                }
            );
            return Ok(());
        }
        Commands::Modes => {
            for mode in RefreshMode::ALL {
                println!(
                    "{:>2}  {:<8} {:>2} levels{}",
                    mode.waveform_id(),
                    mode.name(),
                    mode.grayscale_levels(),
                    if mode.clears_ghosting() {
                        "  clears ghosting"
                    } else {
                        ""
                    }
                );
            }
            return Ok(());
        }
        Commands::Optimize { input, output } => {
            let source = image::open(input)
                .with_context(|| format!("Failed to read {}", input.display()))?
                .to_rgba8();
            optimize_bitmap(&source)
                .save(output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            log::info!("Wrote {}", output.display());
            return Ok(());
        }
        _ => {}
    }

    scheduler.initialize().context("Failed to open panel")?;
    if let Some(name) = &cli.mode {
        let mode: RefreshMode = name.parse()?;
        scheduler
            .set_refresh_mode(mode)
            .with_context(|| format!("Panel refused mode {mode}"))?;
    }

    let result = match &cli.command {
        Commands::Full => scheduler.full_refresh(),
        Commands::Partial => scheduler.partial_refresh(),
        Commands::Clear => scheduler.clear_screen(),
        Commands::Pattern => scheduler.show_test_pattern(),
        Commands::Show { file, partial } => {
            let mut source = image::open(file)
                .with_context(|| format!("Failed to read {}", file.display()))?
                .to_rgba8();
            let (width, height) = (u32::from(cli.width), u32::from(cli.height));
            if source.dimensions() != (width, height) {
                log::info!(
                    "Scaling {}x{} image to {width}x{height}",
                    source.width(),
                    source.height()
                );
                source = imageops::resize(&source, width, height, FilterType::Triangle);
            }
            let kind = if *partial {
                RefreshKind::Partial
            } else {
                RefreshKind::Full
            };
            scheduler.show_image(&source, kind)
        }
        Commands::Probe | Commands::Modes | Commands::Optimize { .. } => Ok(()),
    };
    result.context("Refresh failed")?;

    println!("refreshes this session: {}", scheduler.refresh_count());
    scheduler.release();
    Ok(())
}
