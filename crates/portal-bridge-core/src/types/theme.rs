//! Theme state published by the host shell.

use crate::types::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Theme preference chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Always light
    #[default]
    Light,
    /// Always dark
    Dark,
    /// Follow the operating system preference
    System,
}

/// Theme actually applied to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light palette
    #[default]
    Light,
    /// Dark palette
    Dark,
}

impl Theme {
    /// Value written to the `data-theme` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// The opposite palette
    pub fn flipped(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(Error::invalid_input(format!("unknown theme '{}'", other))),
        }
    }
}

impl FromStr for ThemeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "system" => Ok(ThemeMode::System),
            other => Err(Error::invalid_input(format!("unknown theme mode '{}'", other))),
        }
    }
}

impl ThemeMode {
    /// Resolve the preference against the system setting
    pub fn resolve(self, system_prefers_dark: bool) -> Theme {
        match self {
            ThemeMode::Light => Theme::Light,
            ThemeMode::Dark => Theme::Dark,
            ThemeMode::System if system_prefers_dark => Theme::Dark,
            ThemeMode::System => Theme::Light,
        }
    }
}

impl From<Theme> for ThemeMode {
    fn from(theme: Theme) -> Self {
        match theme {
            Theme::Light => ThemeMode::Light,
            Theme::Dark => ThemeMode::Dark,
        }
    }
}

/// Snapshot of the canonical theme state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeState {
    /// User preference
    pub mode: ThemeMode,
    /// Palette in effect
    pub resolved_mode: Theme,
    /// Service currently in front, if any
    pub service: Option<String>,
}

impl ThemeState {
    /// Build a snapshot for the given preference and system setting
    pub fn new(mode: ThemeMode, system_prefers_dark: bool) -> Self {
        Self {
            mode,
            resolved_mode: mode.resolve(system_prefers_dark),
            service: None,
        }
    }

    /// Whether the dark palette is in effect
    pub fn is_dark(&self) -> bool {
        self.resolved_mode == Theme::Dark
    }
}

impl Default for ThemeState {
    fn default() -> Self {
        Self::new(ThemeMode::default(), false)
    }
}
