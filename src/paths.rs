//! Where the bridge keeps its config, mapping file and logs.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): `config.yaml` in the current directory.
//! - **Portable mode**: a `.portable` marker next to the executable keeps everything in
//!   the executable's directory.
//! - **Installed mode** (default): the platform data directory, e.g.
//!   `%APPDATA%\MIDI DMX Bridge` or `~/.local/share/MIDI DMX Bridge`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "MIDI DMX Bridge";

/// Shared JSON document holding `midiMappings` next to other subsystems' settings
const MAPPINGS_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the YAML configuration file
    pub config: PathBuf,
    /// Directory holding the mapping document
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the paths for this run.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] Running in DEV mode ({})", cwd.display());
                return Self::rooted_at(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::rooted_at(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform data directory, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode ({})", app_data.display());

        Self::rooted_at(&app_data, false)
    }

    /// Every path under a single base directory
    pub fn rooted_at(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            data_dir: base.join("data"),
            logs_dir: base.join("logs"),
            is_portable,
        }
    }

    /// Directory of the YAML config, used to resolve relative paths in it
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Default mapping document
    pub fn mappings_file(&self) -> PathBuf {
        self.data_dir.join(MAPPINGS_FILE)
    }

    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.data_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
