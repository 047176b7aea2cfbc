//! TOML-based settings persistence.
//!
//! Reads and writes [`Settings`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KMShare\config.toml`
//! - Linux:    `~/.config/kmshare/config.toml`
//! - macOS:    `~/Library/Application Support/KMShare/config.toml`
//!
//! Every field has a `#[serde(default = "fn")]` so a first run (no file) and
//! an upgrade from an older file both work; absent fields take their
//! defaults.
//!
//! The session layer does not consume [`Settings`] directly – it takes the
//! validated [`SessionSettings`] snapshot produced by
//! [`Settings::session_settings`].  Validation failure there is the only
//! error that refuses a session start; everything else in the system
//! degrades instead of failing.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use kmshare_core::{GeometryError, Layout, ScreenGeometry, ScreenPosition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::session::SessionSettings;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A screen geometry in the config is unusable.
    #[error("invalid {side} screen geometry: {source}")]
    Geometry {
        side: &'static str,
        #[source]
        source: GeometryError,
    },

    /// `remote.ip` is set but not a parseable IP address.
    #[error("invalid remote IP address: {0:?}")]
    InvalidRemoteIp(String),
}

// ── Settings schema ───────────────────────────────────────────────────────────

/// Top-level settings stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub local: LocalSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub features: FeatureSettings,
    #[serde(default)]
    pub network: NetworkSettings,
}

/// This host's identity and screen geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalSettings {
    /// Name broadcast in discovery beacons.
    #[serde(default = "default_local_name")]
    pub name: String,
    /// Operating system identifier broadcast in beacons.
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
}

/// The peer to dial and its screen geometry for coordinate remapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSettings {
    /// Dial target.  Empty string means listen-only: wait for the peer to
    /// connect to us.
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_session_port")]
    pub port: u16,
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
}

/// Where the remote screen sits relative to the local one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutSettings {
    #[serde(default = "default_position")]
    pub position: ScreenPosition,
}

/// Feature switches.  `hide_cursor` and `share_clipboard` are reserved:
/// parsed and carried, not yet wired to behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSettings {
    /// When `false`, this side never initiates a handover (it can still
    /// receive one).
    #[serde(default = "default_true")]
    pub edge_detection: bool,
    #[serde(default = "default_true")]
    pub hide_cursor: bool,
    #[serde(default)]
    pub share_clipboard: bool,
}

/// Listening ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSettings {
    /// TCP port the session listener binds.
    #[serde(default = "default_session_port")]
    pub port: u16,
    /// UDP port for discovery beacons.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_local_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "kmshare".to_string())
}
fn default_os() -> String {
    std::env::consts::OS.to_string()
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}
fn default_session_port() -> u16 {
    12345
}
fn default_discovery_port() -> u16 {
    kmshare_core::DEFAULT_DISCOVERY_PORT
}
fn default_position() -> ScreenPosition {
    ScreenPosition::Right
}
fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local: LocalSettings::default(),
            remote: RemoteSettings::default(),
            layout: LayoutSettings::default(),
            features: FeatureSettings::default(),
            network: NetworkSettings::default(),
        }
    }
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            name: default_local_name(),
            os: default_os(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: default_session_port(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self { position: default_position() }
    }
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            edge_detection: true,
            hide_cursor: true,
            share_clipboard: false,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: default_session_port(),
            discovery_port: default_discovery_port(),
            discovery_enabled: true,
        }
    }
}

// ── Validation into the session snapshot ──────────────────────────────────────

impl Settings {
    /// Validates the raw settings into the typed snapshot the session layer
    /// consumes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Geometry`] for zero-sized screens and
    /// [`ConfigError::InvalidRemoteIp`] for an unparseable dial target.
    /// This is the only error class that refuses a session start.
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let local_geometry = ScreenGeometry::new(self.local.screen_width, self.local.screen_height)
            .map_err(|source| ConfigError::Geometry { side: "local", source })?;
        let remote_geometry =
            ScreenGeometry::new(self.remote.screen_width, self.remote.screen_height)
                .map_err(|source| ConfigError::Geometry { side: "remote", source })?;

        let remote_addr = if self.remote.ip.is_empty() {
            None
        } else {
            let ip: IpAddr = self
                .remote
                .ip
                .parse()
                .map_err(|_| ConfigError::InvalidRemoteIp(self.remote.ip.clone()))?;
            Some(SocketAddr::new(ip, self.remote.port))
        };

        Ok(SessionSettings {
            local_geometry,
            remote_geometry,
            layout: Layout::new(self.layout.position),
            edge_detection: self.features.edge_detection,
            hide_cursor: self.features.hide_cursor,
            listen_port: self.network.port,
            remote_addr,
        })
    }
}

// ── Settings repository ───────────────────────────────────────────────────────

/// Resolves the config directory for this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Propagates [`ConfigError::NoPlatformConfigDir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads settings from the default location, or defaults when no file
/// exists yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than
/// "not found" and [`ConfigError::Parse`] for malformed TOML.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&config_file_path()?)
}

/// Loads settings from an explicit path (used by the `--config` flag).
///
/// # Errors
///
/// Same as [`load_settings`].
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
    }
}

/// Persists settings to the default location, creating directories as
/// needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_settings(settings: &Settings) -> Result<(), ConfigError> {
    save_settings_to(settings, &config_file_path()?)
}

/// Persists settings to an explicit path.
///
/// # Errors
///
/// Same as [`save_settings`].
pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app folder.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KMShare"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("kmshare"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KMShare")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
