use chrono::Utc;
use console_core::{
    present::{describe_power_status, format_relative_time},
    selection::{container_selection_label, team_selection_label},
    ContainerPanel, DashboardState, FeedbackTone, JobStreamState, TeamPanel,
};
use shared::protocol::ContainerTeam;

pub fn print_dashboard(dashboard: &DashboardState) {
    if !dashboard.error.is_empty() {
        println!("{}", dashboard.error);
        return;
    }
    let stats = dashboard.stats;
    println!(
        "{} competitions ({} public, {} private)",
        stats.total, stats.public_count, stats.private_count
    );
    for summary in &dashboard.competitions {
        let visibility = if summary.is_private { "private" } else { "public" };
        let scoring = if summary.scoring_active { "scoring" } else { "idle" };
        println!(
            "  {:<20} {:<30} {:>3} teams {:>4} containers  {visibility:<7} {scoring}",
            summary.competition_id.as_str(), summary.name, summary.team_count, summary.container_count
        );
    }
}

pub fn print_containers(panel: &ContainerPanel) {
    if !panel.error.is_empty() {
        println!("error: {}", panel.error);
    }
    println!("{}", container_selection_label(panel));
    for entry in &panel.entities {
        let status = describe_power_status(&entry.status);
        let marker = if panel.selected.contains(&entry.id) { "*" } else { " " };
        let team = entry
            .team
            .as_ref()
            .map(ContainerTeam::label)
            .unwrap_or_else(|| "Unassigned".into());
        println!(
            " {marker} {:>6}  {:<24} {:<15} {:<14} {:<12} {}",
            entry.id.0,
            entry.display_name(),
            entry.ip_address.as_deref().unwrap_or("-"),
            status.label,
            team,
            format_relative_time(entry.last_updated.as_deref(), Utc::now()),
        );
    }
}

pub fn print_teams(panel: &TeamPanel) {
    if !panel.error.is_empty() {
        println!("error: {}", panel.error);
    } else if !panel.extra.feedback.text.is_empty() {
        let prefix = match panel.extra.feedback.tone {
            FeedbackTone::Error => "error: ",
            FeedbackTone::Success | FeedbackTone::Neutral => "",
        };
        println!("{prefix}{}", panel.extra.feedback.text);
    }
    println!("{}", team_selection_label(panel));
    for team in &panel.entities {
        let marker = if panel.selected.contains(&team.id) { "*" } else { " " };
        println!(
            " {marker} {:>4}  {:<24} {:>6}  {:<18} {}",
            team.id.0,
            team.name,
            team.score,
            team.network,
            format_relative_time(Some(&team.last_updated), Utc::now()),
        );
    }
}

/// Prints log lines from `from` onward and returns the new high-water mark.
pub fn print_job_log(state: &JobStreamState, from: usize) -> usize {
    for line in state.log.iter().skip(from) {
        println!("{line}");
    }
    state.log.len()
}

pub fn print_job_status(state: &JobStreamState) {
    let progress = state
        .progress
        .map(|p| format!(" [{}/{}]", p.done, p.total))
        .unwrap_or_default();
    println!("status: {}{progress} ({:?})", state.status.label, state.phase);
}
