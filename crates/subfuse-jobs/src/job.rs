//! Job records and their state machine
//!
//! Statuses progress `Pending → Running → (Completed | Failed | Cancelled |
//! Timeout)`. Terminal statuses always carry `finished_at`; progress is
//! monotonic and reaches 1.0 exactly on completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full pipeline run
    Process,
    /// Configuration lint
    Validate,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for executor capacity
    Pending,
    /// Picked up by the executor
    Running,
    /// Finished normally
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled on request
    Cancelled,
    /// Exceeded its wall-clock budget or went stale
    Timeout,
}

impl JobStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    /// Validate a transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Pending, JobStatus::Timeout) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Timeout) => true,
            _ => false,
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        }
    }
}

/// One unit of pipeline execution with a persistent lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique id
    pub id: String,
    /// Kind of work
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Lifecycle status
    pub status: JobStatus,
    /// Creation time
    #[serde(with = "flexible_time")]
    pub created_at: DateTime<Utc>,
    /// When the executor picked the job up
    #[serde(with = "flexible_time_opt", default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status
    #[serde(with = "flexible_time_opt", default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Fraction complete in [0, 1]
    pub progress: f64,
    /// Human-readable phase message
    #[serde(default)]
    pub message: String,
    /// Submission parameters
    #[serde(default)]
    pub parameters: Value,
    /// Result payload on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error description on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job
    pub fn new(job_type: JobType, parameters: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: 0.0,
            message: "queued".to_string(),
            parameters,
            result: None,
            error: None,
        }
    }

    /// Pending → Running
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.message = "running".to_string();
    }

    /// Running → Completed; progress forced to 1.0
    pub fn complete(&mut self, result: Value) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.progress = 1.0;
        self.message = "completed".to_string();
        self.result = Some(result);
    }

    /// Running → Failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.message = "failed".to_string();
        self.error = Some(error.into());
    }

    /// Pending/Running → Cancelled
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        self.message = "cancelled".to_string();
    }

    /// Pending/Running → Timeout
    pub fn timeout(&mut self) {
        self.status = JobStatus::Timeout;
        self.finished_at = Some(Utc::now());
        self.message = "timed out".to_string();
    }

    /// Advance progress; regressions are ignored and 1.0 is reserved for
    /// completion
    pub fn update_progress(&mut self, progress: f64, message: impl Into<String>) {
        let clamped = progress.clamp(0.0, 0.999);
        if clamped > self.progress {
            self.progress = clamped;
        }
        self.message = message.into();
    }

    /// The time the job last moved, for staleness checks
    pub fn age_reference(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.created_at)
    }
}

/// Timestamps serialize as ISO-8601 but deserialize from either ISO-8601
/// strings or integer epoch seconds.
pub(crate) mod flexible_time {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Iso(String),
            Epoch(i64),
            EpochFloat(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Iso(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom),
            Raw::Epoch(seconds) => Utc
                .timestamp_opt(seconds, 0)
                .single()
                .ok_or_else(|| serde::de::Error::custom("epoch out of range")),
            Raw::EpochFloat(seconds) => Utc
                .timestamp_opt(seconds as i64, 0)
                .single()
                .ok_or_else(|| serde::de::Error::custom("epoch out of range")),
        }
    }
}

pub(crate) mod flexible_time_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::flexible_time::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super::flexible_time")] DateTime<Utc>);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_sets_finished_at() {
        let mut job = Job::new(JobType::Process, json!({}));
        job.mark_running();
        job.complete(json!({"ok": true}));
        assert!(job.status.is_terminal());
        assert!(job.finished_at.is_some());
        assert_eq!(job.progress, 1.0);
    }

    #[test]
    fn test_progress_monotonic() {
        let mut job = Job::new(JobType::Process, json!({}));
        job.update_progress(0.5, "half");
        job.update_progress(0.3, "regression ignored");
        assert!((job.progress - 0.5).abs() < f64::EPSILON);
        // 1.0 is reserved for completion
        job.update_progress(1.0, "almost");
        assert!(job.progress < 1.0);
    }

    #[test]
    fn test_transition_validation() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Timeout));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_iso_timestamp_roundtrip() {
        let job = Job::new(JobType::Validate, json!({"a": 1}));
        let text = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(
            back.created_at.timestamp_millis(),
            job.created_at.timestamp_millis()
        );
    }

    #[test]
    fn test_epoch_timestamps_accepted() {
        let raw = json!({
            "id": "j1",
            "type": "process",
            "status": "running",
            "created_at": 1_700_000_000,
            "started_at": 1_700_000_060,
            "progress": 0.4,
        });
        let job: Job = serde_json::from_value(raw).unwrap();
        assert_eq!(job.created_at.timestamp(), 1_700_000_000);
        assert_eq!(job.started_at.unwrap().timestamp(), 1_700_000_060);
    }
}
