//! OS wallpaper access
//!
//! Windows reads and applies the desktop wallpaper through Win32. Other
//! platforms get [`UnsupportedWallpaper`], which lets images be composed
//! to disk but cannot apply them.

#[cfg(windows)]
mod win32;

#[cfg(windows)]
pub use win32::Win32Wallpaper;

use std::path::{Path, PathBuf};

use crate::error::PlatformError;

/// Read and apply the desktop wallpaper
pub trait WallpaperApi {
    /// Path of the wallpaper currently shown, if it can be determined
    fn current_wallpaper(&self) -> Option<PathBuf>;

    /// Make `path` the desktop wallpaper
    fn set_wallpaper(&self, path: &Path) -> Result<(), PlatformError>;
}

/// Backend for platforms without wallpaper support
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedWallpaper;

impl WallpaperApi for UnsupportedWallpaper {
    fn current_wallpaper(&self) -> Option<PathBuf> {
        None
    }

    fn set_wallpaper(&self, path: &Path) -> Result<(), PlatformError> {
        tracing::warn!(path = %path.display(), "Cannot apply wallpaper on this platform");
        Err(PlatformError::Unsupported)
    }
}

/// The backend for the running platform
pub fn native() -> Box<dyn WallpaperApi> {
    #[cfg(windows)]
    {
        Box::new(Win32Wallpaper)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedWallpaper)
    }
}
