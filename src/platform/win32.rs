//! Windows wallpaper detection and setting
//!
//! Detects the current desktop wallpaper path using:
//! 1. SystemParametersInfoW
//! 2. The `Control Panel\Desktop` registry value
//! 3. The `TranscodedWallpaper` cache file

use std::os::windows::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use windows::core::w;
use windows::Win32::Foundation::MAX_PATH;
use windows::Win32::System::Registry::{RegGetValueW, HKEY_CURRENT_USER, RRF_RT_REG_SZ};
use windows::Win32::UI::WindowsAndMessaging::{
    SystemParametersInfoW, SPIF_SENDWININICHANGE, SPIF_UPDATEINIFILE, SPI_GETDESKWALLPAPER,
    SPI_SETDESKWALLPAPER, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS,
};

use super::WallpaperApi;
use crate::error::PlatformError;

const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Win32 wallpaper backend
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Wallpaper;

impl WallpaperApi for Win32Wallpaper {
    fn current_wallpaper(&self) -> Option<PathBuf> {
        let found = get_wallpaper_via_spi()
            .or_else(get_wallpaper_via_registry)
            .or_else(get_transcoded_wallpaper);
        if found.is_none() {
            tracing::warn!("Could not determine the current wallpaper");
        }
        found
    }

    fn set_wallpaper(&self, path: &Path) -> Result<(), PlatformError> {
        let normalized = normalize(path)?;
        tracing::debug!(path = %normalized, "Setting wallpaper");

        let wide_path: Vec<u16> = normalized.encode_utf16().chain(std::iter::once(0)).collect();
        let result = unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                Some(wide_path.as_ptr() as *mut std::ffi::c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(SPIF_UPDATEINIFILE.0 | SPIF_SENDWININICHANGE.0),
            )
        };

        match result {
            Ok(()) => {
                tracing::info!(path = %normalized, "Wallpaper set via Win32 API");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("SystemParametersInfoW failed ({}), falling back to PowerShell", e);
                set_wallpaper_powershell(&normalized)
            }
        }
    }
}

/// Absolute path without the `\\?\` prefix that canonicalize adds
fn normalize(path: &Path) -> Result<String, PlatformError> {
    let canonical = path.canonicalize()?;
    let s = canonical.to_string_lossy();
    Ok(s.strip_prefix(r"\\?\").unwrap_or(&*s).to_string())
}

fn from_wide(buffer: &[u16]) -> Option<PathBuf> {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    let path = String::from_utf16_lossy(&buffer[..len]);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

fn get_wallpaper_via_spi() -> Option<PathBuf> {
    let mut buffer = [0u16; MAX_PATH as usize];
    let result = unsafe {
        SystemParametersInfoW(
            SPI_GETDESKWALLPAPER,
            buffer.len() as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
        )
    };
    let path = result.ok().and_then(|_| from_wide(&buffer))?;
    tracing::debug!(path = %path.display(), "Wallpaper via SPI");
    Some(path)
}

fn get_wallpaper_via_registry() -> Option<PathBuf> {
    let mut buffer = [0u16; MAX_PATH as usize];
    let mut size = (buffer.len() * 2) as u32;

    let result = unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            w!("Control Panel\\Desktop"),
            w!("Wallpaper"),
            RRF_RT_REG_SZ,
            None,
            Some(buffer.as_mut_ptr() as *mut _),
            Some(&mut size),
        )
    };
    if !result.is_ok() {
        return None;
    }
    let path = from_wide(&buffer)?;
    tracing::debug!(path = %path.display(), "Wallpaper via registry");
    Some(path)
}

/// Windows keeps a re-encoded copy of the active wallpaper here
fn get_transcoded_wallpaper() -> Option<PathBuf> {
    let path = dirs::config_dir()?
        .join("Microsoft")
        .join("Windows")
        .join("Themes")
        .join("TranscodedWallpaper");
    path.exists().then_some(path)
}

fn set_wallpaper_powershell(path: &str) -> Result<(), PlatformError> {
    let escaped_path = path.replace('\'', "''");
    let ps_script = format!(
        r#"Add-Type -TypeDefinition @"
using System;
using System.Runtime.InteropServices;
public class Wallpaper {{
    [DllImport("user32.dll", CharSet = CharSet.Unicode)]
    public static extern int SystemParametersInfo(int uAction, int uParam, string lpvParam, int fuWinIni);
}}
"@
[Wallpaper]::SystemParametersInfo(0x0014, 0, '{}', 0x01 -bor 0x02)"#,
        escaped_path
    );

    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &ps_script])
        .creation_flags(CREATE_NO_WINDOW)
        .output()?;

    if output.status.success() {
        tracing::info!("Wallpaper set via PowerShell");
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PlatformError::Api(stderr.trim().to_string()))
    }
}
