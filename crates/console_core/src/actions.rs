//! Operator actions: container power, team scoring, scoring toggle, and the
//! job-backed redeploy, teardown and upload flows.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shared::{
    domain::{CompetitionId, ContainerId, PowerAction, TeamId},
    protocol::{PowerRequest, RedeployRequest, ScoreRequest},
};
use tracing::{info, warn};

use crate::{
    api::CompetitionPackage,
    error::{ConsoleError, ValidationError},
    jobs::{JobClass, JobLaunch, JobPhase, StatusTone},
    present::format_bytes,
    reconcile::RenderScope,
    store::Feedback,
    Console,
};

/// Upload limit enforced before a package leaves the machine.
pub const MAX_PACKAGE_BYTES: u64 = 75 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerOutcome {
    /// Nothing was selected, so no request was sent.
    Skipped,
    Queued { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamActionKind {
    Reset,
    Adjust,
}

/// Per-team outcome of a sequential score update. Updates stop at the
/// first failure; `skipped` lists the teams never attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamBatchReport {
    pub action: TeamActionKind,
    pub applied: Vec<TeamId>,
    pub failed: Option<(TeamId, String)>,
    pub skipped: Vec<TeamId>,
}

impl TeamBatchReport {
    fn new(action: TeamActionKind) -> Self {
        Self {
            action,
            applied: Vec::new(),
            failed: None,
            skipped: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    fn summary(&self) -> String {
        let count = self.applied.len();
        let verb = match self.action {
            TeamActionKind::Reset => "Scores reset",
            TeamActionKind::Adjust => "Scores updated",
        };
        let noun = if count == 1 { "team" } else { "teams" };
        format!("{verb} for {count} {noun}.")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedeployOptions {
    pub start_after: bool,
    pub enable_advanced_logging: bool,
}

/// Parses the score-adjustment input. Whole numbers written as floats
/// ("5.0") are accepted.
pub fn parse_adjust_amount(raw: &str) -> Result<i64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyAmount);
    }
    let amount = match trimmed.parse::<i64>() {
        Ok(amount) => amount,
        Err(_) => trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && value.fract() == 0.0)
            .filter(|value| value.abs() < i64::MAX as f64)
            .map(|value| value as i64)
            .ok_or(ValidationError::NotWholeNumber)?,
    };
    if amount == 0 {
        return Err(ValidationError::ZeroAmount);
    }
    Ok(amount)
}

pub fn validate_package(package: &CompetitionPackage) -> Result<(), ValidationError> {
    let name = package.file_name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingPackage);
    }
    if !name.to_ascii_lowercase().ends_with(".zip") {
        return Err(ValidationError::NotZip);
    }
    if package.size() > MAX_PACKAGE_BYTES {
        return Err(ValidationError::PackageTooLarge);
    }
    if !package.bytes.starts_with(b"PK") {
        return Err(ValidationError::MissingZipSignature);
    }
    Ok(())
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|text| !text.trim().is_empty())
}

impl Console {
    /// Sends one batched power request for the current selection, then
    /// reloads the panel so it reflects the real post-action state.
    pub async fn power_containers(
        &self,
        competition: &CompetitionId,
        action: PowerAction,
    ) -> Result<PowerOutcome, ConsoleError> {
        // The request takes the panel's load ticket so a listing fetched
        // before it cannot settle the panel while the action is pending.
        let request = self.store.lock().await.containers.update(competition, |panel| {
            if panel.selected.is_empty() {
                return None;
            }
            let ids: Vec<ContainerId> = panel.selected.iter().copied().collect();
            Some((panel.begin_load(), ids))
        });
        let Some((ticket, ids)) = request else {
            return Ok(PowerOutcome::Skipped);
        };
        self.reconcile(RenderScope::Containers(competition.clone()));
        info!(competition_id = %competition, %action, count = ids.len(), "containers: power action");

        let result = self.api.power_containers(&PowerRequest { ids, action }).await;
        match result {
            Ok(response) => {
                let message = non_blank(response.message)
                    .unwrap_or_else(|| format!("Containers queued to {action}."));
                self.reconciler.notice(&message);
                self.load_containers(competition).await;
                Ok(PowerOutcome::Queued { message })
            }
            Err(err) => {
                let message = err.display_message(&format!("Unable to {action} containers."));
                warn!(competition_id = %competition, %action, "containers: power action failed: {message}");
                if let Some(panel) = self.store.lock().await.containers.get_mut(competition) {
                    panel.fail_request(ticket, message);
                }
                self.reconcile(RenderScope::Containers(competition.clone()));
                Err(err)
            }
        }
    }

    /// Applies a reset or adjustment to every selected team, one request at
    /// a time. Returns the partial report on a mid-sequence failure; only
    /// local rejections are returned as `Err`.
    pub async fn run_team_action(
        &self,
        competition: &CompetitionId,
        kind: TeamActionKind,
    ) -> Result<TeamBatchReport, ConsoleError> {
        let prepared = self.store.lock().await.teams.update(competition, |panel| {
            if panel.extra.action_loading {
                return Err(ConsoleError::ActionInProgress(competition.to_string()));
            }
            if panel.selected.is_empty() {
                panel.extra.feedback = Feedback::error("Select at least one team.");
                return Err(ConsoleError::EmptySelection);
            }
            let request = match kind {
                TeamActionKind::Reset => ScoreRequest::reset(),
                TeamActionKind::Adjust => match parse_adjust_amount(&panel.extra.adjust_input) {
                    Ok(amount) => ScoreRequest::adjust(amount),
                    Err(err) => {
                        panel.extra.feedback = Feedback::error(err.to_string());
                        return Err(err.into());
                    }
                },
            };
            panel.extra.action_loading = true;
            panel.extra.feedback = Feedback::default();
            panel.error.clear();
            Ok((panel.selected.iter().copied().collect::<Vec<_>>(), request))
        });
        self.reconcile(RenderScope::Teams(competition.clone()));
        let (ids, request) = prepared?;
        info!(competition_id = %competition, action = %request.action, count = ids.len(), "teams: score action");

        let mut report = TeamBatchReport::new(kind);
        let mut pending = ids.into_iter();
        while let Some(team_id) = pending.next() {
            match self.api.update_team_score(competition, team_id, &request).await {
                Ok(response) => {
                    let last_updated = non_blank(response.last_updated)
                        .unwrap_or_else(|| Utc::now().to_rfc3339());
                    let mut store = self.store.lock().await;
                    if let Some(team) = store
                        .teams
                        .get_mut(competition)
                        .and_then(|panel| panel.find_mut(team_id))
                    {
                        if let Some(score) = response.score {
                            team.score = score;
                        }
                        team.last_updated = last_updated;
                    }
                    drop(store);
                    report.applied.push(team_id);
                    self.reconcile(RenderScope::Teams(competition.clone()));
                }
                Err(err) => {
                    let message = err.display_message("Unable to update team score.");
                    warn!(competition_id = %competition, team_id = %team_id, "teams: score update failed: {message}");
                    report.failed = Some((team_id, message));
                    report.skipped = pending.collect();
                    break;
                }
            }
        }

        self.store.lock().await.teams.update(competition, |panel| {
            panel.extra.action_loading = false;
            match &report.failed {
                Some((_, message)) => {
                    panel.error = message.clone();
                    panel.extra.feedback = Feedback::default();
                }
                None => {
                    panel.extra.feedback = Feedback::success(report.summary());
                    if kind == TeamActionKind::Adjust {
                        panel.extra.adjust_input.clear();
                    }
                }
            }
        });
        self.reconcile(RenderScope::Teams(competition.clone()));
        Ok(report)
    }

    /// Scoring state lives on the competition card, so success reloads the
    /// whole dashboard.
    pub async fn set_scoring(
        &self,
        competition: &CompetitionId,
        active: bool,
    ) -> Result<(), ConsoleError> {
        info!(competition_id = %competition, active, "scoring: toggling");
        if let Err(err) = self.api.set_scoring(competition, active).await {
            let message = err.display_message("Unable to update scoring state.");
            warn!(competition_id = %competition, "scoring: toggle failed: {message}");
            self.reconciler.notice(&message);
            return Err(err);
        }
        if let Err(err) = self.load_dashboard().await {
            warn!("scoring: dashboard refresh failed: {err}");
        }
        Ok(())
    }

    pub async fn redeploy_container(
        self: &Arc<Self>,
        competition: &CompetitionId,
        container: ContainerId,
        options: RedeployOptions,
    ) -> Result<JobLaunch, ConsoleError> {
        let label = self
            .store
            .lock()
            .await
            .containers
            .get(competition)
            .and_then(|panel| panel.entities.iter().find(|entry| entry.id == container))
            .map(|entry| entry.display_name())
            .unwrap_or_else(|| format!("CT-{container}"));

        self.begin_job(JobClass::Redeploy, Some(competition.clone()))
            .await?;
        self.update_job(JobClass::Redeploy, |state| {
            state.append(format!("Queued redeploy for {label}."));
            state.set_status("Redeploy in progress...", StatusTone::Progress);
        })
        .await;
        info!(competition_id = %competition, container_id = %container, "redeploy: requesting");

        let request = RedeployRequest {
            ids: vec![container],
            start_after: options.start_after,
            enable_advanced_logging: options.enable_advanced_logging,
        };
        let response = match self.api.redeploy_containers(&request).await {
            Ok(response) => response,
            Err(err) => {
                let message = err.display_message("Unable to redeploy container.");
                warn!(container_id = %container, "redeploy: request failed: {message}");
                self.fail_job(JobClass::Redeploy, &message, "Redeploy failed")
                    .await;
                self.reconciler.notice(&message);
                return Err(err);
            }
        };

        let message =
            non_blank(response.message).unwrap_or_else(|| "Container redeployed.".to_string());
        match non_blank(response.job_id) {
            Some(job_id) => {
                self.update_job(JobClass::Redeploy, |state| state.append(&message))
                    .await;
                self.open_job_stream(JobClass::Redeploy, &job_id, Some(competition.clone()))
                    .await;
                Ok(JobLaunch::Streaming { job_id })
            }
            None => {
                self.update_job(JobClass::Redeploy, |state| {
                    state.append(&message);
                    state.set_status("Redeploy in progress...", StatusTone::Progress);
                    state.busy = false;
                })
                .await;
                Ok(JobLaunch::Detached)
            }
        }
    }

    /// Destroys a competition. `confirmed` must carry the operator's
    /// explicit confirmation; nothing is sent without it.
    pub async fn teardown_competition(
        self: &Arc<Self>,
        competition: &CompetitionId,
        confirmed: bool,
    ) -> Result<JobLaunch, ConsoleError> {
        if !confirmed {
            return Err(ConsoleError::ConfirmationRequired);
        }
        let label = self
            .dashboard
            .lock()
            .await
            .find(competition)
            .map(|summary| summary.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| competition.to_string());

        self.begin_job(JobClass::Teardown, Some(competition.clone()))
            .await?;
        self.update_job(JobClass::Teardown, |state| {
            state.append(format!("Requesting teardown for {label}."));
            state.set_status("Requesting teardown...", StatusTone::Progress);
        })
        .await;
        info!(competition_id = %competition, "teardown: requesting");

        let response = match self.api.teardown_competition(competition).await {
            Ok(response) => response,
            Err(err) => {
                let message = err.display_message("Unable to tear down competition.");
                warn!(competition_id = %competition, "teardown: request failed: {message}");
                self.fail_job(JobClass::Teardown, &message, "Teardown failed")
                    .await;
                self.reconciler.notice(&message);
                return Err(err);
            }
        };

        let job_id = non_blank(response.job_id);
        let message = non_blank(response.message).unwrap_or_else(|| {
            format!("Teardown queued ({})", job_id.as_deref().unwrap_or("pending"))
        });
        match job_id {
            Some(job_id) => {
                self.update_job(JobClass::Teardown, |state| state.append(&message))
                    .await;
                self.open_job_stream(JobClass::Teardown, &job_id, Some(competition.clone()))
                    .await;
                Ok(JobLaunch::Streaming { job_id })
            }
            None => {
                self.update_job(JobClass::Teardown, |state| {
                    state.append(&message);
                    state.set_status("Teardown in progress...", StatusTone::Progress);
                    state.busy = false;
                })
                .await;
                Ok(JobLaunch::Detached)
            }
        }
    }

    /// Validates and uploads a competition package, then follows its
    /// provisioning log when the server hands back a job id.
    pub async fn upload_package(
        self: &Arc<Self>,
        package: &CompetitionPackage,
        enable_advanced_logging: bool,
    ) -> Result<JobLaunch, ConsoleError> {
        self.begin_job(JobClass::Upload, None).await?;
        self.update_job(JobClass::Upload, |state| {
            state.append(format!(
                "Selected package {} ({})",
                package.file_name,
                format_bytes(package.size())
            ));
            state.append("Validating package locally...");
        })
        .await;

        if let Err(err) = validate_package(package) {
            self.update_job(JobClass::Upload, |state| {
                state.append(format!("Validation failed: {err}"));
                state.set_status(err.to_string(), StatusTone::Failure);
                state.busy = false;
            })
            .await;
            return Err(err.into());
        }

        self.update_job(JobClass::Upload, |state| {
            state.set_status("Package looks like a valid zip", StatusTone::Progress);
            state.append("Uploading package to server...");
        })
        .await;
        info!(file = %package.file_name, bytes = package.size(), "upload: sending package");

        let response = match self.api.upload_package(package, enable_advanced_logging).await {
            Ok(response) => response,
            Err(err) => {
                let message = err.display_message("Upload failed");
                warn!(file = %package.file_name, "upload: rejected: {message}");
                self.update_job(JobClass::Upload, |state| {
                    match &err {
                        ConsoleError::Status { detail, logs, .. } => {
                            for line in logs {
                                state.append(format!("[server] {line}"));
                            }
                            state.append(format!("Server error: {message}"));
                            if let Some(detail) = detail.as_deref().filter(|d| !d.trim().is_empty()) {
                                state.append(format!("Details: {detail}"));
                            }
                        }
                        _ => state.append(format!("Error: {message}")),
                    }
                    state.set_status(message.clone(), StatusTone::Failure);
                    state.phase = JobPhase::Failed;
                    state.busy = false;
                })
                .await;
                return Err(err);
            }
        };

        let job_id = non_blank(response.job_id.clone());
        self.update_job(JobClass::Upload, |state| {
            state.append(
                non_blank(response.message.clone())
                    .unwrap_or_else(|| "Server parsed the competition package.".to_string()),
            );
            if let Some(id) = non_blank(response.competition_id.clone()) {
                state.append(format!("Parsed ID: {id}"));
                state.competition = Some(CompetitionId::new(id));
            }
            if let Some(name) = non_blank(response.competition_name.clone()) {
                state.append(format!("Parsed name: {name}"));
            }
            match &response.package_id {
                None | Some(Value::Null) => {}
                Some(Value::String(id)) => state.append(format!("Stored package ID: {id}")),
                Some(other) => state.append(format!("Stored package ID: {other}")),
            }
            state.set_status("Provisioning will begin shortly...", StatusTone::Progress);
        })
        .await;

        match job_id {
            Some(job_id) => {
                self.open_job_stream(JobClass::Upload, &job_id, None).await;
                Ok(JobLaunch::Streaming { job_id })
            }
            None => {
                self.update_job(JobClass::Upload, |state| {
                    for line in response.logs.iter().flatten() {
                        state.append(format!("[server] {line}"));
                    }
                    state.busy = false;
                })
                .await;
                if let Err(err) = self.load_dashboard().await {
                    warn!("upload: dashboard refresh failed: {err}");
                }
                Ok(JobLaunch::Detached)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_amount_validation() {
        assert_eq!(parse_adjust_amount(""), Err(ValidationError::EmptyAmount));
        assert_eq!(parse_adjust_amount("   "), Err(ValidationError::EmptyAmount));
        assert_eq!(parse_adjust_amount("abc"), Err(ValidationError::NotWholeNumber));
        assert_eq!(parse_adjust_amount("2.5"), Err(ValidationError::NotWholeNumber));
        assert_eq!(parse_adjust_amount("0"), Err(ValidationError::ZeroAmount));
        assert_eq!(parse_adjust_amount("-5"), Ok(-5));
        assert_eq!(parse_adjust_amount(" 10 "), Ok(10));
        assert_eq!(parse_adjust_amount("4.0"), Ok(4));
    }

    #[test]
    fn package_validation_order() {
        let zip = |name: &str, bytes: &[u8]| CompetitionPackage::new(name, bytes.to_vec());
        assert_eq!(
            validate_package(&zip("", b"PK\x03\x04")),
            Err(ValidationError::MissingPackage)
        );
        assert_eq!(
            validate_package(&zip("koth.tar.gz", b"PK\x03\x04")),
            Err(ValidationError::NotZip)
        );
        assert_eq!(
            validate_package(&zip("KOTH.ZIP", b"\x1f\x8b")),
            Err(ValidationError::MissingZipSignature)
        );
        assert_eq!(validate_package(&zip("koth.zip", b"PK\x03\x04")), Ok(()));

        let oversized = CompetitionPackage::new("big.zip", vec![0; MAX_PACKAGE_BYTES as usize + 1]);
        assert_eq!(validate_package(&oversized), Err(ValidationError::PackageTooLarge));
    }

    #[test]
    fn batch_summary_pluralizes() {
        let mut report = TeamBatchReport::new(TeamActionKind::Reset);
        report.applied.push(TeamId(1));
        assert_eq!(report.summary(), "Scores reset for 1 team.");
        report.action = TeamActionKind::Adjust;
        report.applied.push(TeamId(2));
        assert_eq!(report.summary(), "Scores updated for 2 teams.");
    }
}
