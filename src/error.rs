//! Error types
//!
//! One enum per concern, aggregated by [`AppError`] for the front end.

use std::path::PathBuf;

use thiserror::Error;

/// Task store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// File could not be read or written
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not a valid task list
    #[error("Invalid task file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Import source does not exist
    #[error("File not found: {0:?}")]
    Missing(PathBuf),

    /// No task matches the given id or prefix
    #[error("Task not found: {0}")]
    NotFound(String),

    /// More than one task matches the given prefix
    #[error("Ambiguous task id prefix: {0}")]
    Ambiguous(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Offscreen rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// No usable font face was found
    #[error("No font available")]
    NoFont,

    /// A font file could not be parsed
    #[error("Invalid font file {0:?}")]
    InvalidFont(PathBuf),

    /// A pixmap of the requested size could not be allocated
    #[error("Invalid canvas size {width}x{height}")]
    CanvasSize { width: u32, height: u32 },

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error (wrapped)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagram rasterization errors
#[derive(Error, Debug)]
pub enum DiagramError {
    /// No Chrome or Edge binary could be located
    #[error("No compatible browser found")]
    BrowserNotFound,

    /// An earlier launch failed; not retried this session
    #[error("Browser unavailable after an earlier failure")]
    BrowserUnavailable,

    /// The browser process ran but reported failure
    #[error("Browser failed: {0}")]
    BrowserFailed(String),

    /// The screenshot contained no visible pixels
    #[error("Diagram produced an empty image")]
    EmptyRender,

    /// Screenshot could not be decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error (wrapped)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// OS wallpaper API errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Setting the wallpaper is not supported on this platform
    #[error("Wallpaper API not supported on this platform")]
    Unsupported,

    /// The OS call failed
    #[error("Wallpaper API failed: {0}")]
    Api(String),

    /// IO error (wrapped)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level error for front-end operations
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No original wallpaper was captured")]
    NoOriginalWallpaper,

    /// Bad command-line input
    #[error("{0}")]
    Usage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_includes_path() {
        let err = StoreError::io(
            "tasks.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("tasks.json"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_app_error_is_transparent() {
        let err: AppError = StoreError::NotFound("abc".into()).into();
        assert_eq!(err.to_string(), "Task not found: abc");
    }
}
