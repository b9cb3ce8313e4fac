//! walltasks library
//!
//! Keeps a to-do list on the desktop wallpaper. The binary in main.rs is a
//! thin command-line front end over [`app::App`]; everything else is
//! exposed here so it can be tested without a desktop.

pub mod app;
pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod markdown;
pub mod overlay;
pub mod platform;
pub mod render;
pub mod task;
pub mod watcher;

pub use app::App;
pub use error::AppError;
