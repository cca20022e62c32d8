//! Boot-time configuration, stored as JSON in `<config_dir>/atari-core/config.json`.
//!
//! Same `Default` + `load`/`save` shape as the reference `Config`,
//! except parsing goes through `serde_json` rather than the
//! reference's hand-rolled line scanner — three fields don't justify
//! reinventing a JSON parser, and `serde` is already the ecosystem's
//! answer for exactly this.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::gtia::TvSystem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtariConfig {
    pub tv_system: TvSystem,
    pub sample_rate: u32,
    pub rom_dir_override: Option<PathBuf>,
}

impl Default for AtariConfig {
    fn default() -> Self {
        Self {
            tv_system: TvSystem::Ntsc,
            sample_rate: 44_100,
            rom_dir_override: None,
        }
    }
}

impl AtariConfig {
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::error!("cannot parse config at {}: {e}", path.display());
                Self::default()
            }),
            Err(e) => {
                log::error!("cannot read config at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).expect("AtariConfig always serializes");
        std::fs::write(&path, json)?;
        log::info!("config saved to {}", path.display());
        Ok(())
    }
}

/// Get the application config directory.
fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/atari-core/
    // Linux:   ~/.config/atari-core/
    // Windows: %APPDATA%/atari-core/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join("Library").join("Application Support").join("atari-core"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("atari-core"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("atari-core"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ntsc_44100() {
        let config = AtariConfig::default();
        assert_eq!(config.tv_system, TvSystem::Ntsc);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn round_trips_through_json() {
        let config = AtariConfig {
            tv_system: TvSystem::Pal,
            sample_rate: 48_000,
            rom_dir_override: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AtariConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tv_system, TvSystem::Pal);
        assert_eq!(back.sample_rate, 48_000);
    }
}
