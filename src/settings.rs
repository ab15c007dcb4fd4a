//! Persistent user selections: last port parameters, log directory and
//! display preferences. Stored as TOML, loaded once at startup, written back
//! after every successful start of logging.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DisplayMode, FormattingPolicy, LineEndingKind, LineEndingRule, Separator};
use crate::error::SessionError;
use crate::port_discovery::{NO_PORTS, PortCatalog};

pub const APP_DIR: &str = "serlogger";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_DATA_BITS: u8 = 8;
pub const DEFAULT_BASE_FILENAME: &str = "serial.log";
pub const DEFAULT_TAIL_INTERVAL_MS: u64 = 25;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub serial: SerialSelection,
    pub log: LogSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSelection {
    pub last_port: String,
    pub last_baud: u32,
    pub last_parity: String,
    pub last_data_bits: u8,
    pub last_stop_bits: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub last_directory: String,
    pub base_filename: String,
    pub tail_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_mode: Option<DisplayMode>,
    pub separator: Separator,
    pub include_line_ending_bytes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_ending: Option<LineEndingKind>,
    pub line_ending_value: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            display_mode: Some(DisplayMode::Ascii),
            separator: Separator::None,
            include_line_ending_bytes: false,
            line_ending: Some(LineEndingKind::Newline),
            line_ending_value: String::new(),
        }
    }
}

impl SerialSelection {
    pub fn defaults(catalog: &PortCatalog) -> Self {
        let mut selection = Self::default();
        selection.fill_defaults(catalog);
        selection
    }

    fn fill_defaults(&mut self, catalog: &PortCatalog) {
        if self.last_port.trim().is_empty() || self.last_port == NO_PORTS {
            self.last_port = catalog.first_port();
        }
        if self.last_baud == 0 {
            self.last_baud = DEFAULT_BAUD;
        }
        if self.last_parity.trim().is_empty() {
            self.last_parity = "None".to_string();
        }
        if self.last_data_bits == 0 {
            self.last_data_bits = DEFAULT_DATA_BITS;
        }
        if self.last_stop_bits.trim().is_empty() {
            self.last_stop_bits = "1".to_string();
        }
    }
}

impl LogSettings {
    pub fn tail_interval(&self) -> Duration {
        Duration::from_millis(self.tail_interval_ms)
    }

    pub fn directory(&self) -> PathBuf {
        PathBuf::from(&self.last_directory)
    }
}

impl DisplaySettings {
    pub fn formatting_policy(&self) -> Result<FormattingPolicy, SessionError> {
        let line_ending = self
            .line_ending
            .map(|kind| LineEndingRule::from_kind(kind, &self.line_ending_value))
            .transpose()?;

        Ok(FormattingPolicy {
            display_mode: self.display_mode,
            separator: self.separator,
            include_line_ending_bytes: self.include_line_ending_bytes,
            line_ending,
        })
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.toml")
    }

    pub fn default_log_directory() -> PathBuf {
        app_data_dir().join("Serial Data Logs")
    }

    /// Load from `path`; a missing file yields blank settings that
    /// [`Settings::fill_defaults`] completes.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No settings at {}, starting from defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse settings {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, text).with_context(|| format!("Failed to write settings {}", path.display()))
    }

    /// Load `path`, filling blanks. A missing file is created from the defaults.
    pub fn load_or_init(path: &Path, catalog: &PortCatalog) -> Result<Self> {
        Self::load_or_init_in(path, catalog, &Self::default_log_directory())
    }

    fn load_or_init_in(path: &Path, catalog: &PortCatalog, log_directory: &Path) -> Result<Self> {
        let existed = path.exists();
        let mut settings = Self::load(path)?;
        settings.fill_defaults_in(catalog, log_directory)?;
        if !existed {
            settings.save(path)?;
            log::info!("Wrote default settings to {}", path.display());
        }
        Ok(settings)
    }

    /// Replace blank values with defaults. Runs once at startup.
    pub fn fill_defaults(&mut self, catalog: &PortCatalog) -> Result<()> {
        self.fill_defaults_in(catalog, &Self::default_log_directory())
    }

    fn fill_defaults_in(&mut self, catalog: &PortCatalog, log_directory: &Path) -> Result<()> {
        self.serial.fill_defaults(catalog);

        if self.log.last_directory.trim().is_empty() {
            self.log.last_directory = log_directory.to_string_lossy().into_owned();
        }
        if self.log.base_filename.trim().is_empty() {
            self.log.base_filename = DEFAULT_BASE_FILENAME.to_string();
        }
        if self.log.tail_interval_ms == 0 {
            self.log.tail_interval_ms = DEFAULT_TAIL_INTERVAL_MS;
        }

        fs::create_dir_all(&self.log.last_directory)
            .with_context(|| format!("Failed to create log directory {}", self.log.last_directory))?;
        Ok(())
    }
}

pub fn app_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

pub fn app_log_path() -> PathBuf {
    app_data_dir().join("Application.log")
}
