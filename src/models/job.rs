use chrono::{DateTime, Duration, Utc};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use super::engine::DocumentFormat;

/// Longest error message persisted on a failed job.
pub const ERROR_MESSAGE_CAP: usize = 500;

/// Number of random characters in a job id. 24 characters of the URL-safe
/// nanoid alphabet carry ~144 bits of entropy.
const JOB_ID_LEN: usize = 24;

/// Status of an asynchronous recognition job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Reference to the document submitted with a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDescriptor {
    pub file_name: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    /// Spool path of the stored upload, consumed by the worker.
    pub stored_path: String,
}

/// A unit of asynchronous recognition work.
///
/// Transitions are Pending -> Processing -> {Completed, Failed}, with
/// Pending -> Failed allowed for jobs rejected before a worker picks them
/// up. Completed and Failed are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub engine: String,
    pub upload: UploadDescriptor,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub page_count: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal job transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobRecord {
    pub fn new(
        engine: impl Into<String>,
        upload: UploadDescriptor,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            job_id: nanoid!(JOB_ID_LEN),
            status: JobStatus::Pending,
            engine: engine.into(),
            upload,
            params,
            created_at: Utc::now(),
            start_time: None,
            completion_time: None,
            expiration_time: None,
            error_code: None,
            error_message: None,
            page_count: None,
        }
    }

    /// A worker has picked the job up. Legal only from Pending.
    pub fn mark_processing(&mut self) -> Result<(), IllegalTransition> {
        if self.status != JobStatus::Pending {
            return Err(IllegalTransition {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        self.status = JobStatus::Processing;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// Recognition finished. Legal only from Processing.
    pub fn mark_completed(
        &mut self,
        page_count: usize,
        retention: Duration,
    ) -> Result<(), IllegalTransition> {
        if self.status != JobStatus::Processing {
            return Err(IllegalTransition {
                from: self.status,
                to: JobStatus::Completed,
            });
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.completion_time = Some(now);
        self.expiration_time = Some(now + retention);
        self.page_count = Some(page_count);
        Ok(())
    }

    /// Recognition failed. Legal from Pending or Processing; terminal.
    pub fn mark_failed(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        retention: Duration,
    ) -> Result<(), IllegalTransition> {
        if !matches!(self.status, JobStatus::Pending | JobStatus::Processing) {
            return Err(IllegalTransition {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        let now = Utc::now();
        let mut message = message.into();
        if message.len() > ERROR_MESSAGE_CAP {
            // Engine messages can carry multibyte text; back off to a char
            // boundary so the truncation never splits a code point.
            let mut cap = ERROR_MESSAGE_CAP;
            while !message.is_char_boundary(cap) {
                cap -= 1;
            }
            message.truncate(cap);
        }
        self.status = JobStatus::Failed;
        self.completion_time = Some(now);
        self.expiration_time = Some(now + retention);
        self.error_code = Some(code.into());
        self.error_message = Some(message);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}
