//! Diagram rasterization through a headless Chromium browser
//!
//! A diagram block is written into a small HTML page that loads Mermaid,
//! the browser screenshots it with a transparent background, and the
//! screenshot is cropped to its visible pixels. Results are cached on disk
//! by a SHA-256 of the diagram source, so unchanged diagrams never launch
//! the browser again.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use image::RgbaImage;
use sha2::{Digest, Sha256};
use tiny_skia::Pixmap;

use crate::error::DiagramError;
use crate::render::canvas;

const MERMAID_SCRIPT: &str = "https://cdn.jsdelivr.net/npm/mermaid/dist/mermaid.min.js";
/// Milliseconds the page gets to load the script and draw
const VIRTUAL_TIME_BUDGET: u32 = 10_000;
const WINDOW_SIZE: &str = "1600,1200";
/// Wall-clock limit for one browser run before it is killed
pub const BROWSER_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Turns diagram source into a bitmap
pub trait DiagramRenderer {
    fn render(&mut self, source: &str) -> Result<Pixmap, DiagramError>;
}

/// Renders diagrams with a Chrome or Edge binary
#[derive(Debug)]
pub struct HeadlessBrowserRenderer {
    browser: Option<PathBuf>,
    cache_dir: PathBuf,
    timeout: Duration,
    /// Set after a failed launch; the browser is not retried this session
    failed: bool,
}

impl HeadlessBrowserRenderer {
    /// Locate a browser, preferring `configured`
    pub fn new(configured: Option<&Path>, cache_dir: PathBuf) -> Self {
        let browser = find_browser(configured);
        match &browser {
            Some(path) => tracing::info!(browser = %path.display(), "Diagram browser found"),
            None => tracing::warn!("No Chrome or Edge found, diagrams will show a placeholder"),
        }
        Self::with_browser(browser, cache_dir)
    }

    pub fn with_browser(browser: Option<PathBuf>, cache_dir: PathBuf) -> Self {
        Self {
            browser,
            cache_dir,
            timeout: BROWSER_TIMEOUT,
            failed: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn browser(&self) -> Option<&Path> {
        self.browser.as_deref()
    }

    /// Cache file for a diagram source
    pub fn cache_path(&self, source: &str) -> PathBuf {
        self.cache_dir
            .join(format!("mermaid_{}.png", cache_key(source)))
    }

    fn screenshot(&self, browser: &Path, source: &str, key: &str) -> Result<RgbaImage, DiagramError> {
        let page = self.cache_dir.join(format!("mermaid_{}.html", key));
        let shot = self.cache_dir.join(format!("mermaid_{}.raw.png", key));
        fs::write(&page, diagram_page(source))?;

        let mut command = Command::new(browser);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--no-first-run")
            .arg("--default-background-color=00000000")
            .arg(format!("--virtual-time-budget={}", VIRTUAL_TIME_BUDGET))
            .arg(format!("--window-size={}", WINDOW_SIZE))
            .arg(format!("--user-data-dir={}", self.cache_dir.join("profile").display()))
            .arg(format!("--screenshot={}", shot.display()))
            .arg(file_url(&page));
        let output = output_with_timeout(command, self.timeout);

        let _ = fs::remove_file(&page);
        let output = output?;
        if !output.status.success() || !shot.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiagramError::BrowserFailed(format!(
                "exit status {}: {}",
                output.status,
                stderr.lines().last().unwrap_or("").trim()
            )));
        }

        let image = image::open(&shot)?.to_rgba8();
        let _ = fs::remove_file(&shot);
        Ok(image)
    }
}

impl DiagramRenderer for HeadlessBrowserRenderer {
    fn render(&mut self, source: &str) -> Result<Pixmap, DiagramError> {
        let cached = self.cache_path(source);
        if cached.exists() {
            match image::open(&cached) {
                Ok(image) => {
                    tracing::debug!(path = %cached.display(), "Diagram cache hit");
                    return to_pixmap(&image.to_rgba8());
                }
                Err(e) => {
                    tracing::warn!(path = %cached.display(), "Discarding unreadable cached diagram: {}", e);
                    let _ = fs::remove_file(&cached);
                }
            }
        }

        if self.failed {
            return Err(DiagramError::BrowserUnavailable);
        }
        let browser = self.browser.clone().ok_or(DiagramError::BrowserNotFound)?;

        fs::create_dir_all(&self.cache_dir)?;
        let image = match self.screenshot(&browser, source, &cache_key(source)) {
            Ok(image) => image,
            Err(e) => {
                tracing::error!("Diagram rendering failed, disabling browser: {}", e);
                self.failed = true;
                return Err(e);
            }
        };

        let cropped = crop_to_content(&image).ok_or(DiagramError::EmptyRender)?;
        if let Err(e) = cropped.save(&cached) {
            tracing::warn!(path = %cached.display(), "Failed to cache diagram: {}", e);
        }
        to_pixmap(&cropped)
    }
}

fn to_pixmap(image: &RgbaImage) -> Result<Pixmap, DiagramError> {
    canvas::pixmap_from_rgba(image).map_err(|_| DiagramError::EmptyRender)
}

/// Run `command`, killing it once `timeout` has passed
fn output_with_timeout(mut command: Command, timeout: Duration) -> Result<Output, DiagramError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .map_err(|e| DiagramError::BrowserFailed(e.to_string()))?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| DiagramError::BrowserFailed(e.to_string()));
            }
            Ok(None) if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DiagramError::BrowserFailed(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(DiagramError::BrowserFailed(e.to_string()));
            }
        }
    }
}

/// Hex SHA-256 of the diagram source; stable across builds
pub fn cache_key(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Smallest sub-image holding every non-transparent pixel
pub fn crop_to_content(image: &RgbaImage) -> Option<RgbaImage> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    let (x0, y0, x1, y1) = bounds?;
    Some(image::imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Page that draws one diagram on a transparent background
pub fn diagram_page(source: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<script src="{script}"></script>
<script>
mermaid.initialize({{ startOnLoad: true, theme: 'dark', securityLevel: 'loose', fontFamily: 'Microsoft YaHei, sans-serif' }});
</script>
<style>
html, body {{ margin: 0; padding: 0; background: transparent; }}
.mermaid {{ display: inline-block; color: white; background: transparent; }}
</style>
</head>
<body>
<div class="mermaid">
{source}
</div>
</body>
</html>
"#,
        script = MERMAID_SCRIPT,
        source = escape_html(source)
    )
}

/// `file://` URL for a local path
pub fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{}", s)
    } else {
        format!("file:///{}", s)
    }
}

/// Browser install locations, in search order
pub fn browser_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = configured.map(Path::to_path_buf).into_iter().collect();

    let roots = [
        std::env::var_os("ProgramFiles"),
        std::env::var_os("ProgramFiles(x86)"),
        std::env::var_os("LOCALAPPDATA"),
    ];
    for root in roots.iter().flatten().map(PathBuf::from) {
        candidates.push(root.join(r"Google\Chrome\Application\chrome.exe"));
    }
    for root in roots.iter().flatten().map(PathBuf::from) {
        candidates.push(root.join(r"Microsoft\Edge\Application\msedge.exe"));
    }

    candidates.extend(
        [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/microsoft-edge",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates
}

pub fn find_browser(configured: Option<&Path>) -> Option<PathBuf> {
    find_browser_in(browser_candidates(configured))
}

/// First candidate that exists
pub fn find_browser_in(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn test_crop_to_content() {
        let mut image = RgbaImage::new(20, 10);
        image.put_pixel(3, 2, Rgba([255, 0, 0, 255]));
        image.put_pixel(7, 5, Rgba([0, 255, 0, 128]));

        let cropped = crop_to_content(&image).unwrap();
        assert_eq!(cropped.dimensions(), (5, 4));
        assert_eq!(cropped.get_pixel(0, 0).0, [255, 0, 0, 255]);

        assert!(crop_to_content(&RgbaImage::new(4, 4)).is_none());
    }

    #[test]
    fn test_cache_path_is_stable() {
        let renderer = HeadlessBrowserRenderer::with_browser(None, PathBuf::from("cache"));
        let a = renderer.cache_path("graph TD\nA-->B");
        assert_eq!(a, renderer.cache_path("graph TD\nA-->B"));
        assert_ne!(a, renderer.cache_path("graph LR\nA-->B"));
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mermaid_") && name.ends_with(".png"));
    }

    #[test]
    fn test_cache_key_is_sha256() {
        assert_eq!(
            cache_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_browser_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let browser = dir.path().join("hang.sh");
        fs::write(&browser, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&browser, fs::Permissions::from_mode(0o755)).unwrap();

        let mut renderer =
            HeadlessBrowserRenderer::with_browser(Some(browser), dir.path().join("cache"))
                .with_timeout(Duration::from_millis(300));

        let start = Instant::now();
        match renderer.render("graph TD") {
            Err(DiagramError::BrowserFailed(message)) => assert!(message.contains("timed out")),
            other => panic!("unexpected {:?}", other.map(|p| p.width())),
        }
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(matches!(
            renderer.render("graph LR"),
            Err(DiagramError::BrowserUnavailable)
        ));
    }

    #[test]
    fn test_missing_browser() {
        let dir = TempDir::new().unwrap();
        let mut renderer = HeadlessBrowserRenderer::with_browser(None, dir.path().to_path_buf());
        assert!(matches!(
            renderer.render("graph TD"),
            Err(DiagramError::BrowserNotFound)
        ));
    }

    #[test]
    fn test_launch_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut renderer = HeadlessBrowserRenderer::with_browser(
            Some(dir.path().join("no-such-browser")),
            dir.path().join("cache"),
        );

        assert!(matches!(
            renderer.render("graph TD"),
            Err(DiagramError::BrowserFailed(_))
        ));
        assert!(matches!(
            renderer.render("graph LR"),
            Err(DiagramError::BrowserUnavailable)
        ));
    }

    #[test]
    fn test_cached_diagram_skips_browser() {
        let dir = TempDir::new().unwrap();
        let mut renderer = HeadlessBrowserRenderer::with_browser(None, dir.path().to_path_buf());

        let source = "graph TD\nA-->B";
        RgbaImage::from_pixel(30, 12, Rgba([200, 200, 255, 255]))
            .save(renderer.cache_path(source))
            .unwrap();

        let pixmap = renderer.render(source).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (30, 12));
    }

    #[test]
    fn test_page_escapes_source() {
        let page = diagram_page("A-->B<script>");
        assert!(page.contains("A--&gt;B&lt;script&gt;"));
        assert!(page.contains(MERMAID_SCRIPT));
    }

    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/a.html")), "file:///tmp/a.html");
        assert_eq!(
            file_url(Path::new(r"C:\Temp\a.html")),
            "file:///C:/Temp/a.html"
        );
    }

    #[test]
    fn test_find_browser_in() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("chrome.exe");
        fs::write(&present, b"").unwrap();

        let found = find_browser_in(vec![dir.path().join("missing.exe"), present.clone()]);
        assert_eq!(found, Some(present));
        assert_eq!(find_browser_in(Vec::new()), None);
    }
}
