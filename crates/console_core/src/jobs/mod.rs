//! Background job log streams: upload, redeploy, teardown.

use std::fmt;

use chrono::Local;
use shared::domain::CompetitionId;

pub mod classifier;
pub mod monitor;

pub use classifier::{classify, ProvisionProgress, Transition};
pub use monitor::{JobLaunch, JobMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobClass {
    Upload,
    Redeploy,
    Teardown,
}

impl JobClass {
    /// Path segments preceding `<jobID>/stream`.
    pub fn stream_prefix(self) -> [&'static str; 3] {
        match self {
            Self::Upload => ["api", "competitions", "upload"],
            Self::Redeploy => ["api", "containers", "redeploy"],
            Self::Teardown => ["api", "competitions", "teardown"],
        }
    }

    /// Tag prepended to every streamed line in the visible log.
    pub fn log_tag(self) -> &'static str {
        match self {
            Self::Upload => "provisioning",
            Self::Redeploy => "redeploy",
            Self::Teardown => "teardown",
        }
    }

    pub(crate) fn idle_status(self) -> JobStatus {
        let label = match self {
            Self::Upload => "Waiting for upload",
            Self::Redeploy => "Waiting to start",
            Self::Teardown => "Awaiting confirmation",
        };
        JobStatus::new(label, StatusTone::Idle)
    }
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Redeploy => "redeploy",
            Self::Teardown => "teardown",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Connecting,
    InProgress,
    Completed,
    Failed,
    /// The transport dropped before the job reported an outcome.
    Disconnected,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Disconnected)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusTone {
    #[default]
    Idle,
    Connecting,
    Progress,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobStatus {
    pub label: String,
    pub tone: StatusTone,
}

impl JobStatus {
    pub fn new(label: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            label: label.into(),
            tone,
        }
    }
}

/// Everything the presentation layer shows for one job class.
#[derive(Debug, Clone, Default)]
pub struct JobStreamState {
    pub job_id: Option<String>,
    pub competition: Option<CompetitionId>,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub progress: Option<ProvisionProgress>,
    /// Guards the operator controls that would start another job of this class.
    pub busy: bool,
    pub log: Vec<String>,
    pub(crate) refreshed_on_progress: bool,
}

impl JobStreamState {
    pub(crate) fn idle(class: JobClass) -> Self {
        Self {
            status: class.idle_status(),
            ..Self::default()
        }
    }

    pub(crate) fn set_status(&mut self, label: impl Into<String>, tone: StatusTone) {
        self.status = JobStatus::new(label, tone);
    }

    pub(crate) fn append(&mut self, message: impl AsRef<str>) {
        let timestamp = Local::now().format("%H:%M:%S");
        self.log.push(format!("[{timestamp}] {}", message.as_ref()));
    }
}
