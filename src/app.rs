//! Application wiring
//!
//! Owns the task store and the compositor, keeps the wallpaper in sync with
//! the list, and remembers which wallpaper was showing before ours.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compositor::{ComposeReport, CompositorContext, ContentRenderer, PanelStyle, WallpaperCompositor};
use crate::config::{AppPaths, Settings};
use crate::error::AppError;
use crate::platform::WallpaperApi;
use crate::render::FontSet;
use crate::task::{ListenerId, TaskStore};
use crate::watcher::PollingFileWatcher;

/// Remembers the original wallpaper between runs
pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedState {
    #[serde(default)]
    original_wallpaper: Option<PathBuf>,
}

fn load_state(path: &Path) -> SavedState {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unreadable state file: {}", e);
                None
            }
        })
        .unwrap_or_default()
}

fn save_state(path: &Path, state: &SavedState) {
    let result = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| {
            let json = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;
            fs::write(path, json)
        });
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), "Failed to save state: {}", e);
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    a == b
        || a.to_string_lossy().replace('/', "\\")
            .eq_ignore_ascii_case(&b.to_string_lossy().replace('/', "\\"))
}

/// Work out which wallpaper to composite onto.
///
/// A configured override wins. Otherwise the wallpaper showing now is used,
/// unless it is our own output, in which case the one saved by an earlier
/// run is.
pub fn capture_original(
    configured: Option<&Path>,
    api: &dyn WallpaperApi,
    output: &Path,
    state_path: &Path,
) -> Option<PathBuf> {
    if let Some(path) = configured {
        tracing::info!(path = %path.display(), "Using configured original wallpaper");
        return Some(path.to_path_buf());
    }

    match api.current_wallpaper() {
        Some(current) if !same_path(&current, output) => {
            tracing::info!(path = %current.display(), "Captured original wallpaper");
            save_state(
                state_path,
                &SavedState {
                    original_wallpaper: Some(current.clone()),
                },
            );
            Some(current)
        }
        _ => {
            let saved = load_state(state_path).original_wallpaper;
            match &saved {
                Some(path) => tracing::info!(path = %path.display(), "Using saved original wallpaper"),
                None => tracing::warn!("Original wallpaper unknown"),
            }
            saved
        }
    }
}

#[cfg(feature = "markdown")]
fn content_renderer(settings: &Settings, paths: &AppPaths) -> Option<Box<dyn ContentRenderer>> {
    use crate::markdown::diagram::HeadlessBrowserRenderer;
    use crate::markdown::MarkdownRenderer;

    let renderer = if settings.diagrams.enabled {
        MarkdownRenderer::with_diagrams(Box::new(HeadlessBrowserRenderer::new(
            settings.diagrams.browser.as_deref(),
            paths.diagram_cache_dir.clone(),
        )))
    } else {
        MarkdownRenderer::new()
    };
    Some(Box::new(renderer))
}

#[cfg(not(feature = "markdown"))]
fn content_renderer(_settings: &Settings, _paths: &AppPaths) -> Option<Box<dyn ContentRenderer>> {
    None
}

/// Application state
pub struct App {
    paths: AppPaths,
    store: TaskStore,
    compositor: Rc<RefCell<WallpaperCompositor>>,
    api: Rc<dyn WallpaperApi>,
    /// Picks up edits made to the task file by other programs
    watcher: PollingFileWatcher,
    /// Listener that refreshes the wallpaper on every change
    refresh_listener: Option<ListenerId>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("paths", &self.paths)
            .field("store", &self.store)
            .field("auto_refresh", &self.refresh_listener.is_some())
            .finish()
    }
}

impl App {
    /// Create the application, discovering fonts on the system
    pub fn new(settings: &Settings, paths: AppPaths, api: Rc<dyn WallpaperApi>) -> Self {
        let fonts = FontSet::discover(settings.fonts.path.as_deref());
        Self::with_fonts(settings, paths, api, fonts)
    }

    pub fn with_fonts(settings: &Settings, paths: AppPaths, api: Rc<dyn WallpaperApi>, fonts: FontSet) -> Self {
        tracing::debug!("App::with_fonts() starting");

        let tasks_file = paths.tasks_file(&settings.storage);
        let store = TaskStore::open(&tasks_file);

        let output = paths.output_file();
        let mut context = CompositorContext::from_settings(&settings.wallpaper, output.clone());
        context.original = capture_original(
            settings.wallpaper.original.as_deref(),
            api.as_ref(),
            &output,
            &paths.data_dir.join(STATE_FILE_NAME),
        );

        let mut compositor = WallpaperCompositor::new(context, fonts)
            .with_style(PanelStyle::from_settings(&settings.wallpaper));
        if let Some(renderer) = content_renderer(settings, &paths) {
            compositor = compositor.with_content_renderer(renderer);
        }

        let watcher = PollingFileWatcher::new(store.path());
        tracing::debug!("App::with_fonts() completed");

        Self {
            paths,
            store,
            compositor: Rc::new(RefCell::new(compositor)),
            api,
            watcher,
            refresh_listener: None,
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Original wallpaper the panel is drawn onto
    pub fn original_wallpaper(&self) -> Option<PathBuf> {
        self.compositor.borrow().context().original.clone()
    }

    /// Refresh the wallpaper after every store change
    pub fn enable_auto_refresh(&mut self) {
        if self.refresh_listener.is_some() {
            return;
        }
        let compositor = Rc::clone(&self.compositor);
        let api = Rc::clone(&self.api);
        let id = self.store.add_listener(move |event, tasks| {
            tracing::debug!(?event, "Task list changed, refreshing wallpaper");
            match compositor.borrow_mut().refresh(tasks, api.as_ref()) {
                Ok(report) => tracing::info!(drawn = report.drawn, "Wallpaper refreshed"),
                Err(e) => tracing::error!("Failed to refresh wallpaper: {}", e),
            }
        });
        self.refresh_listener = Some(id);
    }

    pub fn disable_auto_refresh(&mut self) {
        if let Some(id) = self.refresh_listener.take() {
            self.store.remove_listener(id);
        }
    }

    /// Change the store; our own write does not count as an external edit
    pub fn mutate<R>(&mut self, f: impl FnOnce(&mut TaskStore) -> R) -> R {
        let result = f(&mut self.store);
        self.watcher.reset();
        result
    }

    /// Compose and apply the wallpaper now
    pub fn refresh(&mut self) -> Result<ComposeReport, AppError> {
        let report = self
            .compositor
            .borrow_mut()
            .refresh(self.store.tasks(), self.api.as_ref())?;
        tracing::info!(drawn = report.drawn, overflow = report.overflow, "Wallpaper refreshed");
        Ok(report)
    }

    /// Compose into `path` without applying it
    pub fn render_to(&mut self, path: &Path) -> Result<ComposeReport, AppError> {
        Ok(self
            .compositor
            .borrow_mut()
            .render_to(self.store.tasks(), path)?)
    }

    /// Put the original wallpaper back
    pub fn restore(&self) -> Result<(), AppError> {
        self.compositor.borrow().restore_original(self.api.as_ref())
    }

    /// Relocate the task file
    pub fn move_data(&mut self, path: &Path) -> Result<(), AppError> {
        self.store.set_data_path(path)?;
        self.watcher.set_path(self.store.path());
        Ok(())
    }

    /// Reload the store when the task file changed on disk.
    ///
    /// Returns true when a reload happened.
    pub fn poll_task_file(&mut self) -> bool {
        if !self.watcher.check_modified() {
            return false;
        }
        tracing::info!(path = %self.store.path().display(), "Task file modified, reloading");
        match self.store.reload() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to reload tasks: {}", e);
                false
            }
        }
    }

    /// Poll the task file every `interval` while `keep_running` says so
    pub fn watch(&mut self, interval: Duration, mut keep_running: impl FnMut() -> bool) {
        tracing::info!(path = %self.store.path().display(), "Watching task file");
        while keep_running() {
            self.poll_task_file();
            std::thread::sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::task::Task;
    use image::{Rgba, RgbaImage};
    use std::fs::File;
    use std::time::SystemTime;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeDesktop {
        current: RefCell<Option<PathBuf>>,
        applied: RefCell<Vec<PathBuf>>,
    }

    impl WallpaperApi for FakeDesktop {
        fn current_wallpaper(&self) -> Option<PathBuf> {
            self.current.borrow().clone()
        }

        fn set_wallpaper(&self, path: &Path) -> Result<(), PlatformError> {
            self.applied.borrow_mut().push(path.to_path_buf());
            *self.current.borrow_mut() = Some(path.to_path_buf());
            Ok(())
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.diagrams.enabled = false;
        settings
    }

    fn wallpaper(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("photo.png");
        RgbaImage::from_pixel(320, 200, Rgba([20, 120, 60, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn app(dir: &TempDir, desktop: &Rc<FakeDesktop>) -> App {
        let api: Rc<dyn WallpaperApi> = desktop.clone();
        App::with_fonts(&settings(), AppPaths::rooted(dir.path()), api, FontSet::empty())
    }

    #[test]
    fn test_original_survives_our_own_wallpaper() {
        let dir = TempDir::new().unwrap();
        let photo = wallpaper(&dir);
        let desktop = Rc::new(FakeDesktop::default());
        *desktop.current.borrow_mut() = Some(photo.clone());

        let mut first = app(&dir, &desktop);
        assert_eq!(first.original_wallpaper(), Some(photo.clone()));
        first.refresh().unwrap();

        // The desktop now shows our output; the next run must not adopt it
        let output = first.paths().output_file();
        assert_eq!(desktop.current_wallpaper(), Some(output));
        let second = app(&dir, &desktop);
        assert_eq!(second.original_wallpaper(), Some(photo));
    }

    #[test]
    fn test_configured_original_wins() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        *desktop.current.borrow_mut() = Some(dir.path().join("other.jpg"));

        let mut settings = settings();
        settings.wallpaper.original = Some(PathBuf::from("/pictures/mine.jpg"));
        let api: Rc<dyn WallpaperApi> = desktop.clone();
        let app = App::with_fonts(&settings, AppPaths::rooted(dir.path()), api, FontSet::empty());
        assert_eq!(app.original_wallpaper(), Some(PathBuf::from("/pictures/mine.jpg")));
    }

    #[test]
    fn test_auto_refresh_on_change() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        *desktop.current.borrow_mut() = Some(wallpaper(&dir));

        let mut app = app(&dir, &desktop);
        app.enable_auto_refresh();
        app.mutate(|store| store.add("Write report", "draft **intro**"));

        let output = app.paths().output_file();
        assert_eq!(*desktop.applied.borrow(), vec![output.clone()]);
        assert!(output.exists());

        app.disable_auto_refresh();
        app.mutate(|store| store.add("Another", ""));
        assert_eq!(desktop.applied.borrow().len(), 1);
    }

    #[test]
    fn test_hidden_add_refreshes_once_without_drawing() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        *desktop.current.borrow_mut() = Some(wallpaper(&dir));

        let mut app = app(&dir, &desktop);
        app.enable_auto_refresh();
        let hidden = Task::new("Private", "").with_visibility(false);
        app.mutate(|store| store.add_task(hidden));

        assert_eq!(desktop.applied.borrow().len(), 1);
        assert_eq!(app.refresh().unwrap().drawn, 0);
    }

    #[test]
    fn test_restore() {
        let dir = TempDir::new().unwrap();
        let photo = wallpaper(&dir);
        let desktop = Rc::new(FakeDesktop::default());
        *desktop.current.borrow_mut() = Some(photo.clone());

        let mut app = app(&dir, &desktop);
        app.refresh().unwrap();
        app.restore().unwrap();
        assert_eq!(desktop.current_wallpaper(), Some(photo));
    }

    #[test]
    fn test_restore_without_original() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        let app = app(&dir, &desktop);
        assert!(matches!(app.restore(), Err(AppError::NoOriginalWallpaper)));
    }

    #[test]
    fn test_external_edit_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        let mut app = app(&dir, &desktop);
        app.mutate(|store| store.add("ours", ""));
        assert!(!app.poll_task_file());

        let path = app.store().path().to_path_buf();
        let tasks = vec![Task::new("from sync", ""), Task::new("second", "")];
        fs::write(&path, serde_json::to_string(&tasks).unwrap()).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        assert!(app.poll_task_file());
        let titles: Vec<&str> = app.store().tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["from sync", "second"]);
    }

    #[test]
    fn test_move_data() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        let mut app = app(&dir, &desktop);
        app.mutate(|store| store.add("keep me", ""));

        let target = dir.path().join("sync").join("tasks.json");
        app.move_data(&target).unwrap();
        assert_eq!(app.store().path(), target.as_path());
        assert!(target.exists());
        assert!(!app.poll_task_file());
    }

    #[test]
    fn test_watch_stops() {
        let dir = TempDir::new().unwrap();
        let desktop = Rc::new(FakeDesktop::default());
        let mut app = app(&dir, &desktop);

        let mut rounds = 0;
        app.watch(Duration::from_millis(1), || {
            rounds += 1;
            rounds <= 3
        });
        assert_eq!(rounds, 4);
    }

    #[test]
    fn test_same_path_ignores_case_and_separators() {
        assert!(same_path(
            Path::new("C:/Users/Me/AppData/x.jpg"),
            Path::new(r"c:\users\me\appdata\X.JPG")
        ));
        assert!(!same_path(Path::new("a.jpg"), Path::new("b.jpg")));
    }
}
