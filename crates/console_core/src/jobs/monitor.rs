use std::{collections::HashMap, sync::Arc};

use futures::StreamExt;
use shared::domain::CompetitionId;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{classify, JobClass, JobPhase, JobStreamState, StatusTone, Transition};
use crate::{reconcile::RenderScope, Console};

/// How a job-backed action continued after its initial request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobLaunch {
    Streaming { job_id: String },
    /// The backend accepted the request without handing out a job id.
    Detached,
}

pub(crate) struct JobSlot {
    pub(crate) state: JobStreamState,
    /// Bumped whenever the connection is dropped; a reader task only applies
    /// lines while its generation is current.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl JobSlot {
    fn new(class: JobClass) -> Self {
        Self {
            state: JobStreamState::idle(class),
            generation: 0,
            task: None,
        }
    }

    /// Drops the current connection, if any. Returns whether one was open.
    fn disconnect(&mut self) -> bool {
        self.generation += 1;
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Called from the reader task itself, so the handle is released rather
    /// than aborted.
    fn release(&mut self) {
        self.generation += 1;
        self.task.take();
    }
}

/// Owns at most one live log connection per job class.
pub struct JobMonitor {
    slots: Mutex<HashMap<JobClass, JobSlot>>,
}

impl Default for JobMonitor {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl JobMonitor {
    pub(crate) async fn update<R>(&self, class: JobClass, apply: impl FnOnce(&mut JobSlot) -> R) -> R {
        let mut slots = self.slots.lock().await;
        apply(slots.entry(class).or_insert_with(|| JobSlot::new(class)))
    }

    pub async fn snapshot(&self, class: JobClass) -> JobStreamState {
        self.slots
            .lock()
            .await
            .get(&class)
            .map(|slot| slot.state.clone())
            .unwrap_or_else(|| JobStreamState::idle(class))
    }

    pub async fn is_connected(&self, class: JobClass) -> bool {
        self.slots
            .lock()
            .await
            .get(&class)
            .is_some_and(|slot| slot.task.is_some())
    }
}

enum Reload {
    Dashboard,
    Containers(CompetitionId),
}

fn dependent_reload(class: JobClass, competition: Option<&CompetitionId>) -> Option<Reload> {
    match class {
        JobClass::Upload | JobClass::Teardown => Some(Reload::Dashboard),
        JobClass::Redeploy => competition.cloned().map(Reload::Containers),
    }
}

#[derive(Default)]
struct LineEffects {
    reload: Option<Reload>,
    close: bool,
}

impl Console {
    pub async fn job_state(&self, class: JobClass) -> JobStreamState {
        self.jobs.snapshot(class).await
    }

    pub async fn is_job_connected(&self, class: JobClass) -> bool {
        self.jobs.is_connected(class).await
    }

    /// Connects to a job's log stream, first closing any stream already open
    /// for `class`. `competition` is refreshed when a redeploy finishes.
    pub async fn open_job_stream(
        self: &Arc<Self>,
        class: JobClass,
        job_id: &str,
        competition: Option<CompetitionId>,
    ) {
        let generation = self
            .jobs
            .update(class, |slot| {
                if slot.disconnect() {
                    debug!(job_class = %class, "jobs: closing previous stream before reopening");
                }
                let state = &mut slot.state;
                state.job_id = Some(job_id.to_string());
                if competition.is_some() {
                    state.competition = competition;
                }
                state.phase = JobPhase::Connecting;
                state.progress = None;
                state.refreshed_on_progress = false;
                state.set_status("Connecting to log stream...", StatusTone::Connecting);
                state.append(format!("Connecting to {} log ({job_id})...", class.log_tag()));
                slot.generation
            })
            .await;
        info!(job_class = %class, job_id, "jobs: opening log stream");
        self.reconcile(RenderScope::Job(class));

        let task = tokio::spawn(Arc::clone(self).drive_job_stream(
            class,
            generation,
            job_id.to_string(),
        ));
        self.jobs
            .update(class, |slot| {
                if slot.generation == generation {
                    slot.task = Some(task);
                } else {
                    task.abort();
                }
            })
            .await;
    }

    /// Hard cancellation: nothing from the abandoned connection is applied
    /// afterwards. Safe to call with no connection open.
    pub async fn close_job(&self, class: JobClass) {
        let was_open = self
            .jobs
            .update(class, |slot| {
                let was_open = slot.disconnect();
                let state = &mut slot.state;
                if state.phase.is_active() {
                    state.phase = JobPhase::Idle;
                    state.status = class.idle_status();
                }
                state.busy = false;
                was_open
            })
            .await;
        if was_open {
            info!(job_class = %class, "jobs: stream closed by operator");
        }
        self.reconcile(RenderScope::Job(class));
    }

    /// Operator-initiated dismissal. A running teardown cannot be walked away
    /// from; every other class closes immediately.
    pub async fn dismiss_job(&self, class: JobClass) -> bool {
        if class == JobClass::Teardown && self.jobs.snapshot(class).await.busy {
            return false;
        }
        self.close_job(class).await;
        true
    }

    /// Clears the slot for a new run and takes its busy guard.
    pub(crate) async fn begin_job(
        &self,
        class: JobClass,
        competition: Option<CompetitionId>,
    ) -> Result<(), crate::ConsoleError> {
        self.jobs
            .update(class, |slot| {
                if slot.state.busy {
                    return Err(crate::ConsoleError::JobBusy(class));
                }
                slot.disconnect();
                slot.state = JobStreamState::idle(class);
                slot.state.busy = true;
                slot.state.competition = competition;
                Ok(())
            })
            .await?;
        self.reconcile(RenderScope::Job(class));
        Ok(())
    }

    pub(crate) async fn update_job(&self, class: JobClass, apply: impl FnOnce(&mut JobStreamState)) {
        self.jobs.update(class, |slot| apply(&mut slot.state)).await;
        self.reconcile(RenderScope::Job(class));
    }

    pub(crate) async fn fail_job(&self, class: JobClass, message: &str, label: &str) {
        self.jobs
            .update(class, |slot| {
                slot.disconnect();
                let state = &mut slot.state;
                state.append(message);
                state.set_status(label, StatusTone::Failure);
                state.phase = JobPhase::Failed;
                state.busy = false;
            })
            .await;
        self.reconcile(RenderScope::Job(class));
    }

    async fn drive_job_stream(self: Arc<Self>, class: JobClass, generation: u64, job_id: String) {
        let mut stream = match self.api.open_job_stream(class, &job_id).await {
            Ok(stream) => stream,
            Err(err) => {
                self.job_disconnected(class, generation, Some(err.to_string()))
                    .await;
                return;
            }
        };

        let connected = self
            .jobs
            .update(class, |slot| {
                if slot.generation != generation {
                    return false;
                }
                slot.state.phase = JobPhase::InProgress;
                true
            })
            .await;
        if !connected {
            return;
        }
        self.reconcile(RenderScope::Job(class));

        while let Some(item) = stream.next().await {
            let line = match item {
                Ok(line) => line,
                Err(err) => {
                    self.job_disconnected(class, generation, Some(err.to_string()))
                        .await;
                    return;
                }
            };
            let Some(effects) = self.apply_job_line(class, generation, &line).await else {
                debug!(job_class = %class, job_id = %job_id, "jobs: ignoring line from closed stream");
                return;
            };
            self.reconcile(RenderScope::Job(class));
            if let Some(reload) = effects.reload {
                self.spawn_reload(reload);
            }
            if effects.close {
                info!(job_class = %class, job_id = %job_id, "jobs: stream finished");
                return;
            }
        }
        self.job_disconnected(class, generation, None).await;
    }

    /// Returns `None` when the stream has been superseded or closed.
    async fn apply_job_line(
        &self,
        class: JobClass,
        generation: u64,
        line: &str,
    ) -> Option<LineEffects> {
        self.jobs
            .update(class, |slot| {
                if slot.generation != generation {
                    return None;
                }
                let state = &mut slot.state;
                state.append(format!("[{}] {line}", class.log_tag()));
                let mut effects = LineEffects::default();
                match classify(class, line) {
                    Some(Transition::Progress(progress)) => {
                        state.set_status(progress.label(), StatusTone::Progress);
                        state.progress = Some(progress);
                        if progress.is_complete() && !state.refreshed_on_progress {
                            state.refreshed_on_progress = true;
                            effects.reload = dependent_reload(class, state.competition.as_ref());
                        }
                    }
                    Some(Transition::Phase(label)) => {
                        state.set_status(label, StatusTone::Progress);
                    }
                    Some(Transition::Complete(label)) => {
                        info!(job_class = %class, "jobs: completed");
                        state.set_status(label, StatusTone::Success);
                        state.phase = JobPhase::Completed;
                        state.busy = false;
                        effects.reload = dependent_reload(class, state.competition.as_ref());
                        effects.close = true;
                    }
                    Some(Transition::Fail { label, fatal }) => {
                        state.set_status(label, StatusTone::Failure);
                        if fatal {
                            warn!(job_class = %class, "jobs: failed: {line}");
                            state.phase = JobPhase::Failed;
                            state.busy = false;
                            effects.close = class == JobClass::Teardown;
                        }
                    }
                    None => {}
                }
                if effects.close {
                    slot.release();
                }
                Some(effects)
            })
            .await
    }

    async fn job_disconnected(&self, class: JobClass, generation: u64, reason: Option<String>) {
        let applied = self
            .jobs
            .update(class, |slot| {
                if slot.generation != generation {
                    return false;
                }
                let state = &mut slot.state;
                if let Some(reason) = &reason {
                    state.append(format!("Log stream error: {reason}"));
                }
                state.append("Log stream disconnected.");
                if !state.phase.is_terminal() {
                    state.phase = JobPhase::Disconnected;
                }
                state.busy = false;
                slot.release();
                true
            })
            .await;
        if applied {
            warn!(job_class = %class, reason = ?reason, "jobs: log stream disconnected");
            self.reconcile(RenderScope::Job(class));
        }
    }

    fn spawn_reload(self: &Arc<Self>, reload: Reload) {
        let console = Arc::clone(self);
        tokio::spawn(async move {
            match reload {
                Reload::Dashboard => {
                    if let Err(err) = console.load_dashboard().await {
                        warn!("jobs: dashboard refresh failed: {err}");
                    }
                }
                Reload::Containers(competition) => console.load_containers(&competition).await,
            }
        });
    }
}
