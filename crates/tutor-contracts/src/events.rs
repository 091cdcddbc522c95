//! Session journal: one JSON object per line, one line per lifecycle event.
//!
//! Every line carries `type`, `session_id` and `ts` next to the event's own
//! fields. Images appear only as an [`ImageSummary`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::subject::Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    Frame,
    Cancel,
    ChangeSubject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    ChangeSubject,
    Acknowledge,
    NewQuestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Camera,
    File,
    DataUrl,
}

/// What the journal records about an image instead of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub mime_type: String,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        provider: String,
    },
    SubjectSelected {
        subject: Subject,
    },
    CaptureStarted,
    CaptureReleased {
        reason: ReleaseReason,
        frame_taken: bool,
    },
    ImageAttached {
        source: ImageSource,
        #[serde(flatten)]
        image: ImageSummary,
    },
    SubmissionStarted {
        ticket: u64,
        subject: String,
        prompt_chars: usize,
        follow_up: bool,
        provider: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<ImageSummary>,
    },
    ResponseReceived {
        ticket: u64,
        elapsed_ms: u64,
    },
    SubmissionFailed {
        ticket: u64,
        code: String,
        error: String,
        elapsed_ms: u64,
    },
    StaleResponseDiscarded {
        ticket: u64,
        elapsed_ms: u64,
    },
    SessionReset {
        reason: ResetReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        abandoned_ticket: Option<u64>,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::SubjectSelected { .. } => "subject_selected",
            SessionEvent::CaptureStarted => "capture_started",
            SessionEvent::CaptureReleased { .. } => "capture_released",
            SessionEvent::ImageAttached { .. } => "image_attached",
            SessionEvent::SubmissionStarted { .. } => "submission_started",
            SessionEvent::ResponseReceived { .. } => "response_received",
            SessionEvent::SubmissionFailed { .. } => "submission_failed",
            SessionEvent::StaleResponseDiscarded { .. } => "stale_response_discarded",
            SessionEvent::SessionReset { .. } => "session_reset",
        }
    }
}

#[derive(Serialize)]
struct JournalLine<'a> {
    #[serde(flatten)]
    event: &'a SessionEvent,
    session_id: &'a str,
    ts: String,
}

/// Append-only writer for one session's `events.jsonl`. The file is opened
/// on the first record and kept open afterwards.
#[derive(Debug)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends `event` and returns the line as written.
    pub fn record(&self, event: &SessionEvent) -> Result<Value> {
        let line = serde_json::to_value(JournalLine {
            event,
            session_id: &self.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })?;
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');

        let mut slot = self
            .file
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(&encoded)
                .with_context(|| format!("failed writing {}", self.path.display()))?;
        }
        Ok(line)
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening journal {}", self.path.display()))
    }
}
