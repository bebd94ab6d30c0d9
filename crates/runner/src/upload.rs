//! Plan upload state machine
//!
//! `NotStarted -> InProgress -> {Completed | Failed}`. Both outcomes are
//! terminal for the attachment; only a fresh attach, which creates a new
//! session, starts over. There is no retry path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upload progress for the current attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadState {
    /// No upload requested yet
    #[default]
    NotStarted,
    /// Request issued, waiting for send-complete
    InProgress,
    /// Vehicle accepted the plan
    Completed,
    /// Vehicle reported a transfer failure
    Failed,
}

impl UploadState {
    /// Whether no further transition is possible within this attachment
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::NotStarted => "not-started",
            UploadState::InProgress => "in-progress",
            UploadState::Completed => "completed",
            UploadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of feeding a send-complete notification to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Upload finished successfully; start may proceed
    Completed,
    /// Upload failed; terminal for this attachment
    Failed,
    /// No upload was in flight, notification ignored
    Ignored(UploadState),
}

/// Upload state scoped to one attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSession {
    state: UploadState,
}

impl UploadSession {
    /// Fresh session in `NotStarted`
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Move to `InProgress` if nothing has been requested yet.
    ///
    /// Returns `true` when the caller should issue the upload request.
    pub fn begin(&mut self) -> bool {
        if self.state != UploadState::NotStarted {
            return false;
        }
        self.state = UploadState::InProgress;
        true
    }

    /// Apply a send-complete notification.
    pub fn complete(&mut self, error: bool) -> CompletionOutcome {
        if self.state != UploadState::InProgress {
            return CompletionOutcome::Ignored(self.state);
        }
        if error {
            self.state = UploadState::Failed;
            CompletionOutcome::Failed
        } else {
            self.state = UploadState::Completed;
            CompletionOutcome::Completed
        }
    }
}
