//! Application configuration and well-known paths
//!
//! Settings are loaded from walltasks.toml:
//! ```toml
//! [wallpaper]
//! area = [0.5, 0.15, 0.95, 0.95]
//! font_size = 24
//!
//! [diagrams]
//! browser = "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::overlay::OverlayArea;

/// Name of the per-user data directory (shared with earlier releases)
pub const APP_DIR_NAME: &str = "WallpaperTasks";
/// Name of the temp subdirectory holding the composited wallpaper
pub const TEMP_DIR_NAME: &str = "wallpaper_tasks";
/// Name of the temp subdirectory holding cached diagram renders
pub const DIAGRAM_CACHE_DIR_NAME: &str = "wallpaper_tasks_mermaid";
/// File name of the composited wallpaper
pub const OUTPUT_FILE_NAME: &str = "wallpaper_with_tasks.jpg";
/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "walltasks.toml";

pub const MIN_FONT_SIZE: u32 = 8;
pub const MAX_FONT_SIZE: u32 = 72;

// ============================================================================
// SETTINGS (walltasks.toml)
// ============================================================================

/// Root configuration loaded from walltasks.toml
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub wallpaper: WallpaperSettings,
    #[serde(default)]
    pub fonts: FontSettings,
    #[serde(default)]
    pub diagrams: DiagramSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Overlay placement and text settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WallpaperSettings {
    /// Relative overlay rectangle x1, y1, x2, y2
    #[serde(default = "default_area")]
    pub area: Vec<f32>,
    /// Body font size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Heading drawn at the top of the panel
    #[serde(default = "default_title")]
    pub title: String,
    /// Wallpaper to composite onto instead of the one detected at startup
    #[serde(default)]
    pub original: Option<PathBuf>,
    /// Panel fill as #RRGGBBAA
    #[serde(default)]
    pub panel_color: Option<String>,
    /// Separator colour as #RRGGBB
    #[serde(default)]
    pub accent_color: Option<String>,
}

fn default_area() -> Vec<f32> {
    let area = OverlayArea::default();
    vec![area.x1, area.y1, area.x2, area.y2]
}

fn default_font_size() -> u32 {
    24
}

fn default_title() -> String {
    "Today's Tasks".to_string()
}

impl Default for WallpaperSettings {
    fn default() -> Self {
        Self {
            area: default_area(),
            font_size: default_font_size(),
            title: default_title(),
            original: None,
            panel_color: None,
            accent_color: None,
        }
    }
}

impl WallpaperSettings {
    /// Overlay rectangle, falling back to the default when malformed
    pub fn overlay_area(&self) -> OverlayArea {
        OverlayArea::from_slice(&self.area)
    }

    /// Font size clamped to a drawable range
    pub fn clamped_font_size(&self) -> u32 {
        self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    }
}

/// Font face override
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FontSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Headless browser diagram rendering
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagramSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Chrome or Edge executable
    #[serde(default)]
    pub browser: Option<PathBuf>,
}

impl Default for DiagramSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            browser: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Task list location override
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub tasks_path: Option<PathBuf>,
}

/// Log verbosity
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl Settings {
    /// Find walltasks.toml in standard locations
    pub fn find_config_path() -> Option<PathBuf> {
        // Check in order: %APPDATA%/walltasks, exe dir, cwd
        let candidates = [
            dirs::config_dir().map(|p| p.join("walltasks").join(CONFIG_FILE_NAME)),
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(CONFIG_FILE_NAME))),
            Some(PathBuf::from(CONFIG_FILE_NAME)),
        ];

        candidates.into_iter().flatten().find(|c| c.exists())
    }

    /// Load configuration from the standard locations.
    ///
    /// Defaults when no file exists; an unreadable or invalid file is an
    /// error so the caller can report it once logging is up.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

// ============================================================================
// PATHS
// ============================================================================

/// Well-known per-user locations
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// %LOCALAPPDATA%\WallpaperTasks
    pub data_dir: PathBuf,
    /// %TEMP%\wallpaper_tasks
    pub temp_dir: PathBuf,
    /// %TEMP%\wallpaper_tasks_mermaid
    pub diagram_cache_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the default locations for the current user
    pub fn resolve() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        let temp = std::env::temp_dir();
        Self {
            data_dir,
            temp_dir: temp.join(TEMP_DIR_NAME),
            diagram_cache_dir: temp.join(DIAGRAM_CACHE_DIR_NAME),
        }
    }

    /// Locations rooted under a single directory
    pub fn rooted(root: &Path) -> Self {
        Self {
            data_dir: root.join(APP_DIR_NAME),
            temp_dir: root.join(TEMP_DIR_NAME),
            diagram_cache_dir: root.join(DIAGRAM_CACHE_DIR_NAME),
        }
    }

    /// Task list file, honoring the storage override
    pub fn tasks_file(&self, storage: &StorageSettings) -> PathBuf {
        storage
            .tasks_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tasks.json"))
    }

    /// Composited wallpaper output file
    pub fn output_file(&self) -> PathBuf {
        self.temp_dir.join(OUTPUT_FILE_NAME)
    }
}
