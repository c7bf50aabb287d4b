//! Core types for genjob

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<JobId> for i64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Which generation feature a job belongs to
///
/// Selects the provider adapter and the type of result artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Face swap onto a target video
    FaceSwap,
    /// Garment merged onto a model image
    OutfitMerge,
    /// Music generation from a prompt
    MusicGen,
    /// Sheet music transcribed from audio
    SheetGen,
}

impl JobKind {
    /// All job kinds, in declaration order
    pub const ALL: [JobKind; 4] = [
        JobKind::FaceSwap,
        JobKind::OutfitMerge,
        JobKind::MusicGen,
        JobKind::SheetGen,
    ];

    /// Stable string form used in storage and URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::FaceSwap => "face_swap",
            JobKind::OutfitMerge => "outfit_merge",
            JobKind::MusicGen => "music_gen",
            JobKind::SheetGen => "sheet_gen",
        }
    }

    /// File extension of the stored result artifact
    pub fn result_extension(&self) -> &'static str {
        match self {
            JobKind::FaceSwap => "mp4",
            JobKind::OutfitMerge => "png",
            JobKind::MusicGen => "mp3",
            JobKind::SheetGen => "musicxml",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown job kind: {s}"))
    }
}

/// Job lifecycle status
///
/// ```text
/// Draft -> Processing -> { Completed | Failed | Cancelled }
/// Draft -> Failed            (submission rejected)
/// ```
///
/// Terminal states have no outgoing edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Record created, provider submission not yet confirmed
    Draft,
    /// Accepted by the provider, outcome pending
    Processing,
    /// Result fetched and stored
    Completed,
    /// Submission, provider, download or internal failure
    Failed,
    /// Cancelled locally before an outcome was recorded
    Cancelled,
}

impl JobStatus {
    /// Convert integer status code to JobStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => JobStatus::Draft,
            1 => JobStatus::Processing,
            2 => JobStatus::Completed,
            3 => JobStatus::Failed,
            4 => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    /// Convert JobStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            JobStatus::Draft => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed => 2,
            JobStatus::Failed => 3,
            JobStatus::Cancelled => 4,
        }
    }

    /// Whether no further transitions are permitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Draft, JobStatus::Processing)
                | (JobStatus::Draft, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Cancelled)
        )
    }

    /// Lowercase name, as used in API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(JobStatus::Draft),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Provider-reported outcome handed to finalize
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The provider finished; the result must still be fetched
    Succeeded {
        /// Where the provider serves the result
        download_url: String,
    },
    /// The job failed; no download is attempted
    Failed {
        /// Message recorded on the job
        error: String,
    },
}

impl Outcome {
    /// Shorthand for a failure outcome
    pub fn failed(error: impl Into<String>) -> Self {
        Outcome::Failed {
            error: error.into(),
        }
    }
}

/// A generation request submitted by a caller
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobRequest {
    /// Job kind, selecting the provider
    pub kind: JobKind,

    /// Ordered references to already-uploaded input artifacts
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Submitting user
    #[serde(default)]
    pub owner: Option<String>,

    /// Optional label
    #[serde(default)]
    pub title: Option<String>,
}

impl JobRequest {
    /// Request with inputs and no owner or title
    pub fn new(kind: JobKind, inputs: Vec<String>) -> Self {
        Self {
            kind,
            inputs,
            owner: None,
            title: None,
        }
    }
}

/// Caller-facing view of a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobReport {
    /// Job ID
    pub id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Current status
    pub status: JobStatus,

    /// URL of the stored result (completed jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Failure reason (failed jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Milliseconds between creation and the terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
}

impl JobReport {
    /// Report for a job whose outcome is not known yet
    pub fn processing(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Processing,
            result_url: None,
            error_message: None,
            processing_time_ms: None,
        }
    }
}

/// Full job details as listed through the API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Current status
    pub status: JobStatus,

    /// Submitting user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Optional label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Ordered input references
    pub inputs: Vec<String>,

    /// URL of the stored result (completed jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Failure reason (failed jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Unix milliseconds at creation
    pub created_at: i64,

    /// Unix milliseconds at the terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,

    /// Milliseconds between creation and the terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Provider accepted the job
    JobSubmitted {
        /// Job ID
        id: JobId,
        /// Job kind
        kind: JobKind,
        /// Provider-assigned task id
        external_task_id: String,
    },

    /// Provider rejected the job or could not be reached
    JobSubmissionFailed {
        /// Job ID
        id: JobId,
        /// Job kind
        kind: JobKind,
        /// Provider error
        error: String,
    },

    /// A poll attempt returned without a terminal status
    JobPolled {
        /// Job ID
        id: JobId,
        /// 1-based attempt number
        attempt: u32,
    },

    /// Job completed and its result is stored
    JobCompleted {
        /// Job ID
        id: JobId,
        /// Job kind
        kind: JobKind,
        /// URL of the stored result
        result_url: String,
    },

    /// Job failed after submission
    JobFailed {
        /// Job ID
        id: JobId,
        /// Job kind
        kind: JobKind,
        /// Failure reason
        error: String,
    },

    /// Job cancelled locally
    JobCancelled {
        /// Job ID
        id: JobId,
    },

    /// An outcome arrived after the job was already terminal
    LateResultDiscarded {
        /// Job ID
        id: JobId,
        /// Status the job already had
        status: JobStatus,
    },

    /// Outbound notification webhook failed
    WebhookFailed {
        /// Webhook URL
        url: String,
        /// Error message
        error: String,
    },

    /// Engine is shutting down
    Shutdown,
}

/// Payload sent to notification webhooks
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookPayload {
    /// Event type (complete, failed, cancelled)
    pub event: String,

    /// Job ID
    pub job_id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Job status
    pub status: JobStatus,

    /// Result URL (completed jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Error message (failed jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Timestamp of the event (Unix timestamp in seconds)
    pub timestamp: i64,
}

/// Current time as Unix milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
