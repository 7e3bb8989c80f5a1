use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use winshot::{EventKind, Region, ScreenshotFormat};

#[derive(Parser)]
#[command(name = "winshot")]
#[command(about = "Track X11 windows, watch their events and take screenshots")]
#[command(version)]
pub struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// X11 display to connect to (overrides the config file and $DISPLAY)
    #[arg(long, global = true)]
    pub display: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List screens or tracked windows
    List {
        #[arg(value_enum)]
        target: ListTarget,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print window events as JSON lines until interrupted
    Listen {
        /// Event kinds to subscribe to (default: all)
        #[arg(long = "kind", value_parser = parse_kind)]
        kinds: Vec<EventKind>,

        /// Only report events for this window
        #[arg(long, value_parser = parse_window_id)]
        window: Option<u32>,
    },

    /// Capture a window or screen region to a file
    Screenshot {
        /// Window ID to capture (decimal or 0x-prefixed hex)
        #[arg(long, conflicts_with = "region", value_parser = parse_window_id)]
        window: Option<u32>,

        /// Root region as X,Y,WIDTHxHEIGHT
        #[arg(long, conflicts_with = "window", value_parser = parse_region)]
        region: Option<Region>,

        /// Image format (png, jpeg, ppm)
        #[arg(short, long, default_value = "png")]
        format: ScreenshotFormat,

        /// JPEG quality (1-100)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ListTarget {
    Screens,
    Windows,
}

fn parse_kind(s: &str) -> Result<EventKind, String> {
    serde_json::from_value(serde_json::Value::String(s.replace('-', "_")))
        .map_err(|_| format!("unknown event kind '{}'", s))
}

fn parse_window_id(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid window id '{}': {}", s, e))
}

fn parse_region(s: &str) -> Result<Region, String> {
    let invalid = || format!("invalid region '{}', expected X,Y,WIDTHxHEIGHT", s);
    let mut parts = s.splitn(3, ',');
    let (Some(x), Some(y), Some(size)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let (width, height) = size.split_once(['x', 'X']).ok_or_else(invalid)?;
    let region = Region::new(
        x.trim().parse().map_err(|_| invalid())?,
        y.trim().parse().map_err(|_| invalid())?,
        width.trim().parse().map_err(|_| invalid())?,
        height.trim().parse().map_err(|_| invalid())?,
    );
    if !region.is_valid() {
        return Err(format!("region '{}' is empty", s));
    }
    Ok(region)
}
