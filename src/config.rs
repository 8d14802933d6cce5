//! Engine configuration.
//!
//! Plain structs with sensible defaults. They can also be loaded from TOML,
//! where every duration is given in milliseconds:
//!
//! ```toml
//! alternate_screen = true
//! enable_mouse = true
//! kitty_keyboard = 1
//!
//! [palette]
//! mode = "auto"
//! probe_timeout_ms = 100
//! ```

use crate::buffer::Rgb;
use crate::error::Result;
use crate::terminal::KeyboardFlags;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// How the engine learns the terminal's colour palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteMode {
    /// Send a single probe first, interrogate only if it is answered.
    #[default]
    Auto,
    /// Interrogate unconditionally.
    Query,
    /// Never query; use the built-in 16-colour palette.
    Off,
}

/// Timing and scope of palette interrogation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    /// Detection strategy.
    pub mode: PaletteMode,
    /// Number of palette indices to query (16 or 256 in practice).
    pub size: u16,
    /// Also query the default foreground and background (OSC 10/11).
    pub query_defaults: bool,
    /// Timeout for the single auto-detection probe.
    #[serde(rename = "probe_timeout_ms", deserialize_with = "millis")]
    pub probe_timeout: Duration,
    /// Stop waiting once no byte arrived for this long.
    #[serde(rename = "quiet_period_ms", deserialize_with = "millis")]
    pub quiet_period: Duration,
    /// Hard upper bound on the whole interrogation.
    #[serde(rename = "overall_timeout_ms", deserialize_with = "millis")]
    pub overall_timeout: Duration,
    /// Window during which late bytes are drained after the exchange.
    #[serde(rename = "grace_period_ms", deserialize_with = "millis")]
    pub grace_period: Duration,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            mode: PaletteMode::Auto,
            size: 16,
            query_defaults: true,
            probe_timeout: Duration::from_millis(100),
            quiet_period: Duration::from_millis(50),
            overall_timeout: Duration::from_millis(1000),
            grace_period: Duration::from_millis(20),
        }
    }
}

/// Configuration for the [`Engine`](crate::Engine).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether to use the alternate screen buffer.
    pub alternate_screen: bool,
    /// Whether to enable SGR mouse reporting.
    pub enable_mouse: bool,
    /// Whether to enable bracketed paste.
    pub bracketed_paste: bool,
    /// Colour the back buffer is cleared to every frame.
    #[serde(deserialize_with = "hex_rgb")]
    pub background: Rgb,
    /// Columns a tab expands to when text is painted.
    pub tab_width: u8,
    /// How long a lone ESC waits before it is reported as a key.
    #[serde(rename = "escape_timeout_ms", deserialize_with = "millis")]
    pub escape_timeout: Duration,
    /// Kitty keyboard flags pushed on startup; empty leaves the protocol off.
    #[serde(deserialize_with = "keyboard_flags")]
    pub kitty_keyboard: KeyboardFlags,
    /// Ask the terminal which features it supports on startup.
    pub query_capabilities: bool,
    /// Palette interrogation settings.
    pub palette: PaletteConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alternate_screen: true,
            enable_mouse: true,
            bracketed_paste: true,
            background: Rgb::DEFAULT_BG,
            tab_width: 4,
            escape_timeout: Duration::from_millis(10),
            kitty_keyboard: KeyboardFlags::empty(),
            query_capabilities: true,
            palette: PaletteConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn keyboard_flags<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<KeyboardFlags, D::Error> {
    let bits = u8::deserialize(deserializer)?;
    KeyboardFlags::from_bits(bits)
        .ok_or_else(|| serde::de::Error::custom("kitty keyboard flags must be below 32"))
}

fn hex_rgb<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Rgb, D::Error> {
    let text = String::deserialize(deserializer)?;
    let digits = text.trim_start_matches('#');
    if digits.len() != 6 {
        return Err(serde::de::Error::custom("expected #RRGGBB"));
    }
    u32::from_str_radix(digits, 16)
        .map(Rgb::from_u32)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert!(config.alternate_screen);
        assert_eq!(config.palette.mode, PaletteMode::Auto);
        assert_eq!(config.palette.size, 16);
        assert!(config.kitty_keyboard.is_empty());
        assert!(config.query_capabilities);
    }

    #[test]
    fn test_kitty_keyboard_flags() {
        let config = EngineConfig::from_toml_str("kitty_keyboard = 3").unwrap();
        assert_eq!(
            config.kitty_keyboard,
            KeyboardFlags::DISAMBIGUATE_ESCAPE_CODES | KeyboardFlags::REPORT_EVENT_TYPES
        );
        assert!(EngineConfig::from_toml_str("kitty_keyboard = 64").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_toml_str(
            r##"
            enable_mouse = false
            background = "#102030"
            escape_timeout_ms = 25

            [palette]
            mode = "off"
            size = 256
            probe_timeout_ms = 5
            "##,
        )
        .unwrap();
        assert!(!config.enable_mouse);
        assert_eq!(config.background, Rgb::new(0x10, 0x20, 0x30));
        assert_eq!(config.escape_timeout, Duration::from_millis(25));
        assert_eq!(config.palette.mode, PaletteMode::Off);
        assert_eq!(config.palette.size, 256);
        assert_eq!(config.palette.probe_timeout, Duration::from_millis(5));
        // untouched keys keep defaults
        assert_eq!(config.palette.overall_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_bad_config_is_reported() {
        let err = EngineConfig::from_toml_str("background = \"blue\"").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
