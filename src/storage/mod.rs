//! Storage Layer
//!
//! Platform directories and persistence of captured stills.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::capture::CapturedImage;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "aurareader", "AuraReader")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Default location of the configuration file (not created)
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Write a captured still to `path`
pub fn save_image(image: &CapturedImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, image.jpeg_bytes())
        .with_context(|| format!("Failed to write image to {:?}", path))?;
    Ok(())
}

/// Keep a captured still under `<dir>/captures/<uuid>.jpg`
pub fn archive_capture(image: &CapturedImage, dir: &Path) -> Result<PathBuf> {
    let path = dir
        .join("captures")
        .join(format!("{}.jpg", Uuid::new_v4()));
    save_image(image, &path)?;
    info!("Archived capture to {:?}", path);
    Ok(path)
}
