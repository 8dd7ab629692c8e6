//! Job status record and the fixed five-step progress machine.
//!
//! Every job moves through the same [`PIPELINE_STEPS`] in order. A record is
//! `processing` until it reaches `completed` or `failed`; terminal records
//! refuse further transitions.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::generation::Uploads;
use crate::types::{JobId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Step table
// ---------------------------------------------------------------------------

/// Static definition of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    pub name: &'static str,
    /// Rough duration shown to clients, in seconds.
    pub estimated_duration_secs: u32,
    /// Overall progress reported when the step begins.
    pub progress: u8,
    pub message: &'static str,
}

pub const TOTAL_STEPS: usize = 5;

pub const STEP_STORY: usize = 0;
pub const STEP_CHARACTERS: usize = 1;
pub const STEP_IMAGES: usize = 2;
pub const STEP_ASSEMBLY: usize = 3;
pub const STEP_FINALIZE: usize = 4;

pub const PIPELINE_STEPS: [StepDefinition; TOTAL_STEPS] = [
    StepDefinition {
        name: "Story Generation",
        estimated_duration_secs: 30,
        progress: 10,
        message: "Generating story from your idea...",
    },
    StepDefinition {
        name: "Character Extraction",
        estimated_duration_secs: 20,
        progress: 25,
        message: "Extracting characters and setting the scene...",
    },
    StepDefinition {
        name: "Image Generation",
        estimated_duration_secs: 120,
        progress: 40,
        message: "Creating visual assets and images...",
    },
    StepDefinition {
        name: "Video Assembly",
        estimated_duration_secs: 60,
        progress: 75,
        message: "Assembling video from generated images...",
    },
    StepDefinition {
        name: "Final Processing",
        estimated_duration_secs: 15,
        progress: 90,
        message: "Finalizing video and adding finishing touches...",
    },
];

pub const MSG_STARTING: &str = "Starting video generation...";
pub const MSG_COMPLETED: &str = "Video generation completed successfully!";
pub const MSG_FROM_CACHE: &str = "Video retrieved from cache";

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 3] = [Self::Processing, Self::Completed, Self::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStep {
    pub name: String,
    pub status: StepState,
    /// Estimated duration in seconds.
    pub estimated_duration: u32,
}

fn fresh_steps(state: StepState) -> Vec<JobStep> {
    PIPELINE_STEPS
        .iter()
        .map(|def| JobStep {
            name: def.name.to_string(),
            status: state,
            estimated_duration: def.estimated_duration_secs,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Authoritative per-job status snapshot, as stored and as pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub job_id: JobId,
    pub status: JobState,
    /// Overall progress, 0..=100. Never decreases.
    pub progress: u8,
    pub message: String,
    /// Name of the step currently in progress, if any.
    pub current_step: Option<String>,
    /// Share of completed steps, 0..=100.
    pub step_progress: u8,
    pub total_steps: usize,
    pub steps: Vec<JobStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub uploads: Uploads,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobStatusRecord {
    /// Initial record of a freshly admitted job: all steps pending.
    pub fn new_processing(job_id: impl Into<JobId>, user_id: Option<UserId>, uploads: Uploads) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: JobState::Processing,
            progress: 0,
            message: MSG_STARTING.to_string(),
            current_step: None,
            step_progress: 0,
            total_steps: TOTAL_STEPS,
            steps: fresh_steps(StepState::Pending),
            user_id,
            cached: false,
            video_url: None,
            error: None,
            uploads,
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal record of a job served straight from the cache.
    pub fn completed_from_cache(
        job_id: impl Into<JobId>,
        user_id: Option<UserId>,
        video_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: JobState::Completed,
            progress: 100,
            message: MSG_FROM_CACHE.to_string(),
            current_step: None,
            step_progress: 100,
            total_steps: TOTAL_STEPS,
            steps: fresh_steps(StepState::Completed),
            user_id,
            cached: true,
            video_url: Some(video_url.into()),
            error: None,
            uploads: Uploads::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Index of the step currently in progress.
    pub fn in_progress_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.status == StepState::InProgress)
    }

    /// Move step `index` to in-progress. All earlier steps must be completed.
    pub fn begin_step(&mut self, index: usize) -> Result<(), CoreError> {
        self.ensure_processing()?;
        let def = step_definition(index)?;

        if let Some(pos) = self.steps[..index]
            .iter()
            .position(|step| step.status != StepState::Completed)
        {
            return Err(CoreError::Conflict(format!(
                "Cannot begin step '{}' of job {} before step '{}' completes",
                def.name, self.job_id, self.steps[pos].name
            )));
        }
        if self.steps[index].status != StepState::Pending {
            return Err(CoreError::Conflict(format!(
                "Step '{}' of job {} has already started",
                def.name, self.job_id
            )));
        }

        self.steps[index].status = StepState::InProgress;
        self.progress = self.progress.max(def.progress);
        self.message = def.message.to_string();
        self.touch();
        Ok(())
    }

    /// Mark the in-progress step `index` as completed.
    pub fn complete_step(&mut self, index: usize) -> Result<(), CoreError> {
        self.ensure_processing()?;
        let def = step_definition(index)?;

        if self.steps[index].status != StepState::InProgress {
            return Err(CoreError::Conflict(format!(
                "Step '{}' of job {} is not in progress",
                def.name, self.job_id
            )));
        }

        self.steps[index].status = StepState::Completed;
        self.touch();
        Ok(())
    }

    /// Finish the job successfully.
    pub fn complete(&mut self, video_url: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_processing()?;

        for step in &mut self.steps {
            step.status = StepState::Completed;
        }
        self.status = JobState::Completed;
        self.progress = 100;
        self.message = MSG_COMPLETED.to_string();
        self.video_url = Some(video_url.into());
        self.touch();
        Ok(())
    }

    /// Fail the job. The step that was running stays in progress so clients
    /// can see where it stopped.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_processing()?;

        let error = error.into();
        self.status = JobState::Failed;
        self.message = format!("Error: {error}");
        self.error = Some(error);
        self.touch();
        Ok(())
    }

    fn ensure_processing(&self) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                self.job_id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Recompute derived fields after any mutation.
    fn touch(&mut self) {
        let completed = self
            .steps
            .iter()
            .filter(|step| step.status == StepState::Completed)
            .count();
        self.step_progress = (completed * 100 / TOTAL_STEPS) as u8;
        self.current_step = self
            .in_progress_step()
            .map(|index| self.steps[index].name.clone());
        self.updated_at = Utc::now();
    }
}

fn step_definition(index: usize) -> Result<&'static StepDefinition, CoreError> {
    PIPELINE_STEPS
        .get(index)
        .ok_or_else(|| CoreError::Validation(format!("Step index {index} out of range")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
