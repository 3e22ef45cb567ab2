//! Playback configuration
//!
//! Everything the session consumes at construction: where the capture
//! lives, whether it loops, how fast it plays, what the provider should
//! decode, and which views are bound to a display.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::color::ColorCorrection;
use crate::provider::{OpenParams, ViewId};

/// Lowest playback speed the pacer will ever be asked to run at
pub const MIN_PLAYBACK_SPEED: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Capture source path is empty")]
    MissingSource,
    #[error("Playback speed must be a finite number, got {0}")]
    InvalidSpeed(f64),
    #[error("View {0} is bound more than once")]
    DuplicateView(ViewId),
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-eye output resolution requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep whatever the capture was recorded at
    Native,
    HD2K,
    HD1080,
    #[default]
    HD720,
    VGA,
}

impl Resolution {
    /// Per-eye dimensions, `None` for [`Resolution::Native`]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Resolution::Native => None,
            Resolution::HD2K => Some((2208, 1242)),
            Resolution::HD1080 => Some((1920, 1080)),
            Resolution::HD720 => Some((1280, 720)),
            Resolution::VGA => Some((672, 376)),
        }
    }
}

/// Depth computation mode forwarded untouched to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepthMode {
    None,
    Performance,
    Quality,
    Ultra,
    #[default]
    Neural,
}

/// A view that should be shown, and how its pixels are corrected on the way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewBinding {
    pub view: ViewId,
    #[serde(default)]
    pub color_correction: ColorCorrection,
}

impl ViewBinding {
    pub fn new(view: ViewId) -> Self {
        Self {
            view,
            color_correction: ColorCorrection::default(),
        }
    }

    pub fn with_correction(mut self, correction: ColorCorrection) -> Self {
        self.color_correction = correction;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub source: PathBuf,
    pub loop_enabled: bool,
    /// 1.0 plays at the base rate
    pub playback_speed: f64,
    pub resolution: Resolution,
    pub depth_mode: DepthMode,
    pub views: Vec<ViewBinding>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            loop_enabled: true,
            playback_speed: 1.0,
            resolution: Resolution::default(),
            depth_mode: DepthMode::default(),
            views: vec![ViewBinding::new(ViewId::Left)],
        }
    }
}

impl PlaybackConfig {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::MissingSource);
        }
        if !self.playback_speed.is_finite() {
            return Err(ConfigError::InvalidSpeed(self.playback_speed));
        }
        let mut seen = Vec::with_capacity(self.views.len());
        for binding in &self.views {
            if seen.contains(&binding.view) {
                return Err(ConfigError::DuplicateView(binding.view));
            }
            seen.push(binding.view);
        }
        Ok(())
    }

    /// Speed the pacer runs at, never below [`MIN_PLAYBACK_SPEED`]
    pub fn effective_speed(&self) -> f64 {
        if self.playback_speed.is_finite() && self.playback_speed >= MIN_PLAYBACK_SPEED {
            self.playback_speed
        } else {
            MIN_PLAYBACK_SPEED
        }
    }

    pub fn binding(&self, view: ViewId) -> Option<&ViewBinding> {
        self.views.iter().find(|b| b.view == view)
    }

    pub fn open_params(&self) -> OpenParams {
        OpenParams {
            source: self.source.clone(),
            resolution: self.resolution,
            depth_mode: self.depth_mode,
            real_time: false,
        }
    }
}
