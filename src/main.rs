mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ListTarget};
use crossbeam_channel::{bounded, RecvTimeoutError};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use winshot::{
    Backend, BackendConfig, CaptureSource, Event, EventKind, Region, ScreenshotConfig, ScreenshotFormat,
    ScreenshotSource, Window,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => BackendConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BackendConfig::default(),
    };
    if cli.display.is_some() {
        config.display = cli.display.clone();
    }

    let backend = open_backend(config)?;
    backend.init().context("Failed to connect to the X server")?;

    match cli.command {
        Commands::List { target, json } => match target {
            ListTarget::Screens => {
                let screens = backend.screens()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&screens)?);
                } else {
                    println!("Available screens:");
                    for s in screens {
                        println!(
                            "  [{index}] root {root:#x} {width}x{height}, {monitors} monitor(s)",
                            index = s.index,
                            root = s.root,
                            width = s.width,
                            height = s.height,
                            monitors = s.monitors.len(),
                        );
                    }
                }
            }
            ListTarget::Windows => {
                let windows = backend.tracked_windows();
                if json {
                    println!("{}", serde_json::to_string_pretty(&windows)?);
                } else if windows.is_empty() {
                    println!("No windows found.");
                } else {
                    println!("Tracked windows:");
                    for w in windows {
                        println!(
                            "  [{id:#x}] {name} ({width}x{height} at {x},{y})",
                            id = w.id,
                            name = if w.name.is_empty() { "(untitled)" } else { &w.name },
                            width = w.region.width,
                            height = w.region.height,
                            x = w.region.x,
                            y = w.region.y,
                        );
                    }
                }
            }
        },
        Commands::Listen { kinds, window } => listen(&backend, kinds, window)?,
        Commands::Screenshot {
            window,
            region,
            format,
            quality,
            output,
        } => {
            let mut config = match (window, region) {
                (Some(id), _) => ScreenshotConfig::window(resolve_window(&backend, id)?),
                (None, Some(region)) => ScreenshotConfig::region(region),
                (None, None) => {
                    let screen = backend
                        .screens()?
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("X server reports no screens"))?;
                    ScreenshotConfig::region(Region::new(0, 0, screen.width, screen.height))
                }
            };
            if let Some(quality) = quality {
                config = config.with_quality(quality);
            }
            screenshot(&backend, config, format, &output)?;
        }
    }

    backend.deinit();
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "winshot=info",
        1 => "winshot=debug",
        _ => "winshot=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(target_os = "linux")]
fn open_backend(config: BackendConfig) -> Result<Backend> {
    Ok(Backend::new(config))
}

#[cfg(not(target_os = "linux"))]
fn open_backend(_config: BackendConfig) -> Result<Backend> {
    anyhow::bail!("winshot needs an X11 display server and only runs on Linux")
}

/// Tracked windows are used as-is; anything else is looked up once
fn resolve_window(backend: &Backend, id: u32) -> Result<Arc<dyn Window>> {
    if let Some(window) = backend.window(id) {
        return Ok(window);
    }
    let snapshot = backend
        .describe_window(id)
        .with_context(|| format!("Window {:#x} not found", id))?;
    Ok(Arc::new(snapshot))
}

fn listen(backend: &Backend, kinds: Vec<EventKind>, window: Option<u32>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let kinds = if kinds.is_empty() { EventKind::ALL.to_vec() } else { kinds };
    let print = |event: &Event| match serde_json::to_string(event) {
        Ok(line) => {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", line);
        }
        Err(e) => tracing::warn!("Failed to serialize {} event: {}", event.kind(), e),
    };
    let _handles: Vec<_> = kinds
        .into_iter()
        .map(|kind| match window {
            Some(id) => backend.listen_window(kind, id, print),
            None => backend.listen(kind, print),
        })
        .collect();

    eprintln!("Listening for window events, press Ctrl+C to stop...");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}

fn screenshot(backend: &Backend, config: ScreenshotConfig, format: ScreenshotFormat, output: &Path) -> Result<()> {
    let (tx, rx) = bounded(1);
    backend.capture_screenshot(config, format, move |source| {
        let _ = tx.send(source);
    })?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Capturing... {elapsed_precise}")?,
    );
    let source = loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(source) => break source,
            Err(RecvTimeoutError::Timeout) => pb.tick(),
            Err(RecvTimeoutError::Disconnected) => {
                pb.finish_and_clear();
                anyhow::bail!("Capture worker exited without a result");
            }
        }
    };
    pb.finish_and_clear();

    save(&source, format, output)?;
    println!(
        "Saved {}x{} {} screenshot to {}",
        source.width(),
        source.height(),
        format,
        output.display()
    );
    Ok(())
}

/// Encoded bytes of a finished capture. Failed captures and raw fallbacks
/// are reported instead.
fn encoded(source: &ScreenshotSource, format: ScreenshotFormat) -> Result<&[u8]> {
    if let Some(reason) = source.error() {
        anyhow::bail!("Screenshot failed: {}", reason);
    }
    if source.encoding() != Some(format) {
        anyhow::bail!("{} encoding is not available, nothing written", format);
    }
    Ok(source.data())
}

fn save(source: &ScreenshotSource, format: ScreenshotFormat, output: &Path) -> Result<()> {
    let bytes = encoded(source, format)?;
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(output, bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}
