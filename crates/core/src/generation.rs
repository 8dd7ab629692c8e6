//! Generation request types and admission validation.
//!
//! A [`GenerationRequest`] carries exactly the parameters that influence the
//! produced video, which is why its JSON form doubles as the cache
//! fingerprint input. Uploaded inputs travel separately in [`Uploads`] and
//! never take part in caching.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::UserId;

// ---------------------------------------------------------------------------
// Enumerated parameters
// ---------------------------------------------------------------------------

/// Which generation pipeline a job runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineKind {
    #[default]
    #[serde(rename = "idea2video")]
    Idea2Video,
    #[serde(rename = "script2video")]
    Script2Video,
    /// Personalised idea2video run; shares the idea2video pipeline.
    #[serde(rename = "cameo")]
    Cameo,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [Self::Idea2Video, Self::Script2Video, Self::Cameo];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idea2Video => "idea2video",
            Self::Script2Video => "script2video",
            Self::Cameo => "cameo",
        }
    }

    /// The pipeline implementation that actually serves this kind.
    pub fn backing(self) -> PipelineKind {
        match self {
            Self::Cameo => Self::Idea2Video,
            other => other,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Pipeline type must be one of: idea2video, script2video, cameo (got '{s}')"
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Standard,
    High,
    Ultra,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd,
    #[default]
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    Uhd,
}

/// Container format of the produced video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
}

impl VideoFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Default visual style when the caller does not pick one.
pub const DEFAULT_STYLE: &str = "Realistic";

/// Default image and video generator backend.
pub const DEFAULT_GENERATOR: &str = "google";

/// The full set of output-affecting parameters of a generation job.
///
/// Every field has a default, so partial JSON bodies are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub pipeline_type: PipelineKind,
    pub idea: String,
    pub script: String,
    pub user_requirement: String,
    pub style: String,
    pub image_generator: String,
    pub video_generator: String,
    pub quality: Quality,
    pub resolution: Resolution,
    pub format: VideoFormat,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            pipeline_type: PipelineKind::default(),
            idea: String::new(),
            script: String::new(),
            user_requirement: String::new(),
            style: DEFAULT_STYLE.to_string(),
            image_generator: DEFAULT_GENERATOR.to_string(),
            video_generator: DEFAULT_GENERATOR.to_string(),
            quality: Quality::default(),
            resolution: Resolution::default(),
            format: VideoFormat::default(),
        }
    }
}

impl GenerationRequest {
    /// Convenience constructor for an idea-driven request.
    pub fn idea2video(idea: impl Into<String>) -> Self {
        Self {
            pipeline_type: PipelineKind::Idea2Video,
            idea: idea.into(),
            ..Self::default()
        }
    }

    /// The parameter set fed to the cache fingerprint.
    pub fn cache_params(&self) -> serde_json::Value {
        serde_json::json!({
            "pipeline_type": self.pipeline_type,
            "idea": self.idea,
            "script": self.script,
            "user_requirement": self.user_requirement,
            "style": self.style,
            "image_generator": self.image_generator,
            "video_generator": self.video_generator,
            "quality": self.quality,
            "resolution": self.resolution,
            "format": self.format,
        })
    }
}

/// Pre-validated local paths of uploaded inputs.
///
/// Size and type checks happen upstream; the core only sees paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uploads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novel_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<PathBuf>,
}

impl Uploads {
    pub fn is_empty(&self) -> bool {
        self.script_path.is_none() && self.novel_path.is_none() && self.photo_path.is_none()
    }
}

// ---------------------------------------------------------------------------
// Job specification
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs to run one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub user_id: Option<UserId>,
    pub request: GenerationRequest,
    pub uploads: Uploads,
}

impl JobSpec {
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            user_id: None,
            request,
            uploads: Uploads::default(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_uploads(mut self, uploads: Uploads) -> Self {
        self.uploads = uploads;
        self
    }

    /// Jobs with uploaded inputs are never looked up in or written to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.uploads.is_empty()
    }

    /// Validate the request shape before admission.
    pub fn validate(&self) -> Result<(), CoreError> {
        let request = &self.request;

        match request.pipeline_type {
            PipelineKind::Idea2Video | PipelineKind::Cameo => {
                if request.idea.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "An idea is required for the {} pipeline",
                        request.pipeline_type
                    )));
                }
            }
            PipelineKind::Script2Video => {
                if request.script.trim().is_empty() && self.uploads.script_path.is_none() {
                    return Err(CoreError::Validation(
                        "A script or script file is required for the script2video pipeline"
                            .to_string(),
                    ));
                }
            }
        }

        require_non_empty("style", &request.style)?;
        require_non_empty("image_generator", &request.image_generator)?;
        require_non_empty("video_generator", &request.video_generator)?;

        if let Some(user_id) = &self.user_id {
            require_non_empty("user_id", user_id)?;
        }

        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::Validation(format!("'{field}' must not be empty")))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
