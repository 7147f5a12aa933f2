use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::pose::PoseConfig;
use crate::session::{HistoryPolicy, SessionConfig};
use crate::sink::OutputFormat;

const DEFAULT_SOURCE_URI: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT_SIZE: u32 = 192;
const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;
const DEFAULT_MIN_VISIBILITY: f32 = 0.3;
const DEFAULT_SMOOTHING: f32 = 0.5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    source: Option<SourceConfigFile>,
    session: Option<SessionConfigFile>,
    pose: Option<PoseConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    frame_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    max_frames: Option<u64>,
    skip_insufficient_history: Option<bool>,
    abort_on_sink_error: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PoseConfigFile {
    model_path: Option<PathBuf>,
    model_input_size: Option<u32>,
    min_detection_confidence: Option<f32>,
    min_visibility: Option<f32>,
    smooth_landmarks: Option<bool>,
    smoothing: Option<f32>,
    static_image_mode: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    format: Option<String>,
}

/// Settings for every binary that runs a frame loop.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: SourceSettings,
    pub session: SessionSettings,
    pub pose: PoseSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// End of stream after this many frames (synthetic sources only).
    pub frame_limit: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_SOURCE_URI.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub max_frames: Option<u64>,
    pub skip_insufficient_history: bool,
    pub abort_on_sink_error: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_frames: None,
            skip_insufficient_history: true,
            abort_on_sink_error: false,
        }
    }
}

impl SessionSettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            history_policy: if self.skip_insufficient_history {
                HistoryPolicy::Skip
            } else {
                HistoryPolicy::Abort
            },
            abort_on_sink_error: self.abort_on_sink_error,
            max_frames: self.max_frames,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseSettings {
    pub model_path: Option<PathBuf>,
    pub model_input_size: u32,
    pub min_detection_confidence: f32,
    pub min_visibility: f32,
    pub smooth_landmarks: bool,
    pub smoothing: f32,
    pub static_image_mode: bool,
}

impl Default for PoseSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            model_input_size: DEFAULT_MODEL_INPUT_SIZE,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_visibility: DEFAULT_MIN_VISIBILITY,
            smooth_landmarks: true,
            smoothing: DEFAULT_SMOOTHING,
            static_image_mode: false,
        }
    }
}

impl PoseSettings {
    pub fn pose_config(&self) -> PoseConfig {
        PoseConfig {
            static_image_mode: self.static_image_mode,
            smooth_landmarks: self.smooth_landmarks,
            smoothing: self.smoothing,
            min_detection_confidence: self.min_detection_confidence,
            min_visibility: self.min_visibility,
            model_input_size: self.model_input_size,
            model_path: self.model_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSettings {
    pub dir: Option<PathBuf>,
    pub format: OutputFormat,
}

impl PipelineConfig {
    /// Load from `FRAMEPIPE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAMEPIPE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a single config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let source_defaults = SourceSettings::default();
        let source = SourceSettings {
            uri: source_file.uri.unwrap_or(source_defaults.uri),
            target_fps: source_file.target_fps.unwrap_or(source_defaults.target_fps),
            width: source_file.width.unwrap_or(source_defaults.width),
            height: source_file.height.unwrap_or(source_defaults.height),
            frame_limit: source_file.frame_limit,
        };

        let session_file = file.session.unwrap_or_default();
        let session_defaults = SessionSettings::default();
        let session = SessionSettings {
            max_frames: session_file.max_frames,
            skip_insufficient_history: session_file
                .skip_insufficient_history
                .unwrap_or(session_defaults.skip_insufficient_history),
            abort_on_sink_error: session_file
                .abort_on_sink_error
                .unwrap_or(session_defaults.abort_on_sink_error),
        };

        let pose_file = file.pose.unwrap_or_default();
        let pose_defaults = PoseSettings::default();
        let pose = PoseSettings {
            model_path: pose_file.model_path,
            model_input_size: pose_file
                .model_input_size
                .unwrap_or(pose_defaults.model_input_size),
            min_detection_confidence: pose_file
                .min_detection_confidence
                .unwrap_or(pose_defaults.min_detection_confidence),
            min_visibility: pose_file
                .min_visibility
                .unwrap_or(pose_defaults.min_visibility),
            smooth_landmarks: pose_file
                .smooth_landmarks
                .unwrap_or(pose_defaults.smooth_landmarks),
            smoothing: pose_file.smoothing.unwrap_or(pose_defaults.smoothing),
            static_image_mode: pose_file
                .static_image_mode
                .unwrap_or(pose_defaults.static_image_mode),
        };

        let output_file = file.output.unwrap_or_default();
        let output = OutputSettings {
            dir: output_file.dir,
            format: match output_file.format.as_deref() {
                Some(name) => OutputFormat::parse(name)?,
                None => OutputFormat::default(),
            },
        };

        Ok(Self {
            source,
            session,
            pose,
            output,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("FRAMEPIPE_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(max_frames) = std::env::var("FRAMEPIPE_MAX_FRAMES") {
            let frames: u64 = max_frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("FRAMEPIPE_MAX_FRAMES must be a non-negative integer"))?;
            self.session.max_frames = Some(frames);
        }
        if let Ok(dir) = std::env::var("FRAMEPIPE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output.dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(model) = std::env::var("FRAMEPIPE_POSE_MODEL") {
            if !model.trim().is_empty() {
                self.pose.model_path = Some(PathBuf::from(model));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.uri.trim().is_empty() {
            return Err(anyhow!("source uri must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "source dimensions must be non-zero (got {}x{})",
                self.source.width,
                self.source.height
            ));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.pose.min_detection_confidence) {
            return Err(anyhow!("pose min_detection_confidence must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.pose.min_visibility) {
            return Err(anyhow!("pose min_visibility must be within [0, 1]"));
        }
        if !(self.pose.smoothing > 0.0 && self.pose.smoothing <= 1.0) {
            return Err(anyhow!("pose smoothing must be within (0, 1]"));
        }
        if self.pose.model_input_size < 32 {
            return Err(anyhow!("pose model_input_size must be at least 32"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            session: SessionSettings::default(),
            pose: PoseSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let cfg = PipelineConfig::from_file(PipelineConfigFile::default())?;
        cfg.validate()?;
        assert_eq!(cfg.source.uri, DEFAULT_SOURCE_URI);
        assert_eq!(cfg.session.session_config().history_policy, HistoryPolicy::Skip);
        assert_eq!(cfg.output.format, OutputFormat::Png);
        Ok(())
    }

    #[test]
    fn toml_sections_are_parsed() -> Result<()> {
        let file: PipelineConfigFile = toml::from_str(
            r#"
            [source]
            uri = "/dev/video1"
            width = 320
            height = 240

            [session]
            skip_insufficient_history = false

            [output]
            format = "jpg"
            "#,
        )?;
        let cfg = PipelineConfig::from_file(file)?;
        assert_eq!(cfg.source.uri, "/dev/video1");
        assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
        assert_eq!(cfg.session.session_config().history_policy, HistoryPolicy::Abort);
        assert_eq!(cfg.output.format, OutputFormat::Jpeg);
        Ok(())
    }

    #[test]
    fn out_of_range_confidence_is_rejected() -> Result<()> {
        let mut cfg = PipelineConfig::default();
        cfg.pose.min_detection_confidence = 1.5;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: std::result::Result<PipelineConfigFile, _> = toml::from_str("[source]\nurl = \"x\"\n");
        assert!(parsed.is_err());
    }
}
