//! Decoder Configuration
//!
//! Persistent settings for the OpenNow decoder.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::Result;

/// Decoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Codec used when the input does not name one
    pub codec: VideoCodec,

    /// Explicit decoder name (e.g. "h264_cuvid"), overrides `codec`
    pub decoder_name: Option<String>,

    /// Initial picture size hint
    pub width: u32,
    pub height: u32,

    /// Decoder threads (0 = let FFmpeg decide)
    pub threads: u32,

    /// Mirror log lines to stdout
    pub console_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            decoder_name: None,
            width: 1920,
            height: 1080,
            threads: 4,
            console_log: false,
        }
    }
}

impl Settings {
    /// Get settings file path
    fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("opennow-decoder").join("settings.json"))
    }

    /// Load settings from disk
    pub fn load() -> Result<Self> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        Self::load_from(&path)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        self.save_to(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Decoder name to look up: the explicit override, else the codec's software decoder
    pub fn resolved_decoder_name(&self) -> &str {
        self.decoder_name.as_deref().unwrap_or_else(|| self.codec.decoder_name())
    }
}

/// Video codec options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264/AVC
    #[default]
    H264,
    /// H.265/HEVC
    H265,
    AV1,
    VP9,
}

impl VideoCodec {
    /// FFmpeg decoder name
    pub fn decoder_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "hevc",
            VideoCodec::AV1 => "libdav1d",
            VideoCodec::VP9 => "vp9",
        }
    }
}
