//! Aura Reader - capture a still from the camera and receive a mystical reading
//!
//! Drives the start -> camera -> processing -> readout flow in the terminal,
//! sending the mirrored still to a generative model for a structured reading.

mod app;
mod capture;
mod config;
mod reading;
mod render;
mod session;
mod storage;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{AppError, AuraApp};
use crate::capture::still::StillImageCamera;
use crate::capture::CameraDevice;
use crate::config::{AppConfig, API_KEY_ENV_VARS};
use crate::reading::GeminiClient;
use crate::session::SessionState;

/// Aura Reader - mystical readings from a single camera still
#[derive(Parser, Debug)]
#[command(name = "aura-reader")]
#[command(about = "Capture a photo and reveal the colors of your aura")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one reading: start, camera, processing, readout
    Read {
        /// Use an image file instead of a live camera
        #[arg(long)]
        image: Option<PathBuf>,

        /// Webcam index (overrides capture.device_index)
        #[arg(long)]
        device: Option<u32>,

        /// Print the reading as JSON instead of the readout screen
        #[arg(long)]
        json: bool,

        /// Include the captured still as a data URI in the JSON output
        #[arg(long, requires = "json")]
        embed_image: bool,

        /// Write the captured still to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the configuration file location
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::default_config_path()?,
    };

    match args.command {
        Command::Config { action } => run_config(action, &config_path),
        Command::Read {
            image,
            device,
            json,
            embed_image,
            save,
        } => {
            let config = load_or_default_config(&config_path, args.config.is_some())?;
            let options = ReadOptions {
                image,
                device,
                json,
                embed_image,
                save,
            };
            run_read(&config, options).await
        }
    }
}

/// Initialize logging to stderr; `RUST_LOG` overrides the default level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file, or defaults when the default file is absent
fn load_or_default_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if explicit || path.exists() {
        let config = config::load_config(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn run_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let mut config = load_or_default_config(path, false)?;
            if config.reading.api_key.is_some() {
                config.reading.api_key = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", path);
            }
            config::save_config(&AppConfig::default(), path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

struct ReadOptions {
    image: Option<PathBuf>,
    device: Option<u32>,
    json: bool,
    embed_image: bool,
    save: Option<PathBuf>,
}

/// Pick the camera device for this run
fn select_camera(config: &AppConfig, options: &ReadOptions) -> Arc<dyn CameraDevice> {
    if let Some(path) = &options.image {
        info!("Using {:?} as the camera feed", path);
        return Arc::new(StillImageCamera::new(path.clone()));
    }
    live_camera(options.device.unwrap_or(config.capture.device_index))
}

#[cfg(feature = "webcam")]
fn live_camera(index: u32) -> Arc<dyn CameraDevice> {
    info!("Using webcam {}", index);
    Arc::new(capture::webcam::WebcamCamera::new(index))
}

#[cfg(not(feature = "webcam"))]
fn live_camera(index: u32) -> Arc<dyn CameraDevice> {
    warn!("Built without webcam support; webcam {} unavailable", index);
    Arc::new(capture::NoCamera)
}

async fn run_read(config: &AppConfig, options: ReadOptions) -> Result<()> {
    let api_key = config.reading.resolve_api_key().ok_or_else(|| {
        anyhow!(
            "No API key configured: set reading.api_key or one of {}",
            API_KEY_ENV_VARS.join(", ")
        )
    })?;
    let reader = Arc::new(GeminiClient::new(&config.reading, api_key)?);
    let camera = select_camera(config, &options);
    let mut app = AuraApp::new(config, camera, reader);
    let show = |app: &AuraApp| {
        if !options.json {
            println!("{}", render::render(&app.state()));
        }
    };

    show(&app);
    app.begin()?;
    show(&app);

    let image = match app.capture().await {
        Ok(image) => image,
        Err(AppError::Capture(err)) => {
            // Stays on the camera screen with the cause-specific message
            if options.json {
                eprintln!("{}", err.user_message());
            } else {
                show(&app);
            }
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(path) = &options.save {
        storage::save_image(&image, path)?;
        info!("Saved capture to {:?}", path);
    }
    if config.storage.keep_captures {
        storage::archive_capture(&image, &storage::get_data_dir()?)?;
    }

    let job = app.reading_job(image)?;
    show(&app);

    tokio::select! {
        commit = job => {
            debug!("Reading committed: {:?}", commit);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted while processing; resetting session");
            app.reset();
            show(&app);
            return Ok(());
        }
    }

    let state = app.state();
    match &state {
        SessionState::Readout { image, reading } if options.json => {
            let output = if options.embed_image {
                serde_json::json!({ "reading": reading, "image": image.to_data_uri() })
            } else {
                serde_json::to_value(reading)?
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        SessionState::Readout { .. } => show(&app),
        _ => {
            if options.json {
                eprintln!("{}", state.error().unwrap_or_default());
            } else {
                show(&app);
            }
            bail!("No reading was produced");
        }
    }

    app.reset();
    Ok(())
}
