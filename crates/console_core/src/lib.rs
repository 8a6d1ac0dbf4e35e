use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex};

pub mod actions;
pub mod api;
pub mod dashboard;
pub mod error;
pub mod jobs;
pub mod present;
pub mod reconcile;
pub mod selection;
pub mod store;

pub use actions::{
    parse_adjust_amount, validate_package, PowerOutcome, RedeployOptions, TeamActionKind,
    TeamBatchReport, MAX_PACKAGE_BYTES,
};
pub use api::{ApiSettings, CompetitionPackage, ConsoleApi, HttpConsoleApi, LogStream};
pub use dashboard::{DashboardState, DashboardStats};
pub use error::{ConsoleError, ValidationError};
pub use jobs::{JobClass, JobLaunch, JobPhase, JobStatus, JobStreamState, StatusTone};
pub use reconcile::{ConsoleEvent, EventReconciler, NoopReconciler, Reconciler, RenderScope};
pub use store::{ContainerPanel, Feedback, FeedbackTone, TeamPanel};

use jobs::JobMonitor;
use store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleOptions {
    /// Managers get container and team panels; everyone else sees only the
    /// competition list.
    pub can_manage: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self { can_manage: true }
    }
}

/// Root handle of the reconciliation engine. All state is partitioned by
/// competition and entity kind; every mutation ends with a reconcile call.
pub struct Console {
    api: Arc<dyn ConsoleApi>,
    reconciler: Arc<dyn Reconciler>,
    options: ConsoleOptions,
    store: Mutex<EntityStore>,
    dashboard: Mutex<DashboardState>,
    jobs: JobMonitor,
}

impl Console {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        reconciler: Arc<dyn Reconciler>,
        options: ConsoleOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            reconciler,
            options,
            store: Mutex::new(EntityStore::default()),
            dashboard: Mutex::new(DashboardState::default()),
            jobs: JobMonitor::default(),
        })
    }

    /// Builds an HTTP-backed console whose reconciliation events are
    /// published on the returned receiver.
    pub fn connect(
        settings: &ApiSettings,
        options: ConsoleOptions,
    ) -> Result<(Arc<Self>, broadcast::Receiver<ConsoleEvent>)> {
        let api = HttpConsoleApi::with_settings(settings)
            .with_context(|| format!("failed to configure console api for {}", settings.server_url))?;
        let reconciler = Arc::new(EventReconciler::default());
        let events = reconciler.subscribe();
        Ok((Self::new(Arc::new(api), reconciler, options), events))
    }

    pub fn options(&self) -> ConsoleOptions {
        self.options
    }

    fn reconcile(&self, scope: RenderScope) {
        self.reconciler.reconcile(scope);
    }
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod console_tests;

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod api_tests;
