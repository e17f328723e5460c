//! Launch configuration for the Chromium-backed driver.

use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};
use which::which;

/// Configuration for launching and tuning the driver.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Browser binary; detected from the environment when unset.
    pub executable: Option<PathBuf>,
    /// Profile directory; chromiumoxide uses a temporary one when unset.
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    /// Disable the Chromium sandbox (needed in most containers).
    pub no_sandbox: bool,
    pub launch_timeout_ms: u64,
    /// Upper bound on any single CDP request.
    pub request_timeout_ms: u64,
    /// Interval between element lookups while waiting for a selector.
    pub poll_interval_ms: u64,
    pub window_size: Option<(u32, u32)>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable(),
            user_data_dir: default_profile_dir(),
            headless: resolve_headless_default(),
            no_sandbox: false,
            launch_timeout_ms: 20_000,
            request_timeout_ms: 30_000,
            poll_interval_ms: 100,
            window_size: None,
        }
    }
}

impl DriverConfig {
    /// Re-apply environment overrides on top of a file-provided config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("WEBJOB_HEADLESS") {
            self.headless = parse_flag(&value);
        }
        if let Some(path) = chrome_from_env() {
            self.executable = Some(path);
        }
        if let Ok(path) = env::var("WEBJOB_PROFILE_DIR") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                self.user_data_dir = Some(PathBuf::from(trimmed));
            }
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    !matches!(lower.as_str(), "0" | "false" | "no" | "off")
}

fn resolve_headless_default() -> bool {
    // "0", "false", "no", "off" means headful
    env::var("WEBJOB_HEADLESS")
        .map(|value| parse_flag(&value))
        .unwrap_or(true)
}

fn default_profile_dir() -> Option<PathBuf> {
    env::var("WEBJOB_PROFILE_DIR")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn chrome_from_env() -> Option<PathBuf> {
    let raw = env::var("WEBJOB_CHROME").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = PathBuf::from(trimmed);
    candidate.exists().then_some(candidate)
}

/// Locate a Chrome/Chromium binary: env override, then `PATH`, then well-known
/// install locations.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Some(path) = chrome_from_env() {
        return Some(path);
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| Path::new(candidate).exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "freebsd")))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_treats_off_values_as_false() {
        for value in ["0", "false", "No", " off "] {
            assert!(!parse_flag(value), "{value} should disable");
        }
        for value in ["1", "true", "yes", "anything"] {
            assert!(parse_flag(value), "{value} should enable");
        }
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let cfg: DriverConfig = serde_json::from_str(r#"{ "no_sandbox": true }"#).unwrap();
        assert!(cfg.no_sandbox);
        assert_eq!(cfg.launch_timeout_ms, 20_000);
        assert_eq!(cfg.poll_interval_ms, 100);
    }

    #[test]
    fn detects_executable_from_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        env::set_var("WEBJOB_CHROME", &fake);
        let detected = detect_chrome_executable();
        env::remove_var("WEBJOB_CHROME");
        assert_eq!(detected, Some(fake));
    }
}
