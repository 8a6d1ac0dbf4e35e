use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console_core::{
    CompetitionPackage, Console, ConsoleEvent, JobClass, JobLaunch, JobStreamState,
    PowerOutcome, RedeployOptions, RenderScope, TeamActionKind,
};
use shared::domain::{CompetitionId, ContainerId, PowerAction, TeamId};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Operator console for competition infrastructure")]
struct Args {
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    session: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List competitions with public/private totals.
    Competitions,
    Containers {
        competition: String,
    },
    /// Start or stop containers; selects every container when no ids are given.
    Power {
        competition: String,
        action: PowerArg,
        ids: Vec<i64>,
    },
    Teams {
        competition: String,
    },
    /// Reset or adjust team scores; applies to every team when no --team is given.
    Score {
        competition: String,
        #[arg(long, conflicts_with = "adjust")]
        reset: bool,
        #[arg(long, allow_hyphen_values = true)]
        adjust: Option<String>,
        #[arg(long = "team")]
        teams: Vec<i64>,
    },
    Scoring {
        competition: String,
        state: ScoringArg,
    },
    Redeploy {
        competition: String,
        container: i64,
        #[arg(long)]
        start_after: bool,
        #[arg(long)]
        advanced_logging: bool,
    },
    Teardown {
        competition: String,
        /// Confirms the teardown; nothing is sent without it.
        #[arg(long)]
        yes: bool,
    },
    Upload {
        package: PathBuf,
        #[arg(long)]
        advanced_logging: bool,
    },
    /// Follow the log of a job that is already running.
    Watch {
        class: JobArg,
        job_id: String,
        competition: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PowerArg {
    Start,
    Stop,
}

impl From<PowerArg> for PowerAction {
    fn from(value: PowerArg) -> Self {
        match value {
            PowerArg::Start => PowerAction::Start,
            PowerArg::Stop => PowerAction::Stop,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScoringArg {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum JobArg {
    Upload,
    Redeploy,
    Teardown,
}

impl From<JobArg> for JobClass {
    fn from(value: JobArg) -> Self {
        match value {
            JobArg::Upload => JobClass::Upload,
            JobArg::Redeploy => JobClass::Redeploy,
            JobArg::Teardown => JobClass::Teardown,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(&args.config)?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(session) = args.session {
        settings.session_cookie = Some(session);
    }
    let api_settings = settings.api_settings()?;
    info!(server_url = %api_settings.server_url, "console: connecting");
    let (console, events) = Console::connect(&api_settings, settings.options())?;

    match args.command {
        Command::Competitions => {
            console.load_dashboard().await?;
            render::print_dashboard(&console.dashboard().await);
        }
        Command::Containers { competition } => {
            let competition = CompetitionId::new(competition);
            console.load_containers(&competition).await;
            render::print_containers(&panel_or_empty(&console, &competition).await?);
        }
        Command::Power {
            competition,
            action,
            ids,
        } => {
            let competition = CompetitionId::new(competition);
            console.load_containers(&competition).await;
            if ids.is_empty() {
                console.toggle_all_containers(&competition, true).await;
            } else {
                for id in ids {
                    console
                        .toggle_container(&competition, ContainerId(id), true)
                        .await;
                }
            }
            match console.power_containers(&competition, action.into()).await? {
                PowerOutcome::Skipped => println!("No matching containers selected."),
                PowerOutcome::Queued { message } => println!("{message}"),
            }
            render::print_containers(&panel_or_empty(&console, &competition).await?);
        }
        Command::Teams { competition } => {
            let competition = CompetitionId::new(competition);
            console.load_teams(&competition).await;
            render::print_teams(&team_panel(&console, &competition).await?);
        }
        Command::Score {
            competition,
            reset,
            adjust,
            teams,
        } => {
            let competition = CompetitionId::new(competition);
            let kind = match (reset, adjust) {
                (true, _) => TeamActionKind::Reset,
                (false, Some(amount)) => {
                    console.set_adjust_input(&competition, &amount).await;
                    TeamActionKind::Adjust
                }
                (false, None) => bail!("pass --reset or --adjust <amount>"),
            };
            console.load_teams(&competition).await;
            if teams.is_empty() {
                console.toggle_all_teams(&competition, true).await;
            } else {
                for id in teams {
                    console.toggle_team(&competition, TeamId(id), true).await;
                }
            }
            let outcome = console.run_team_action(&competition, kind).await;
            render::print_teams(&team_panel(&console, &competition).await?);
            let report = outcome?;
            if let Some((team, message)) = &report.failed {
                bail!(
                    "team {team} failed ({message}); {} applied, {} not attempted",
                    report.applied.len(),
                    report.skipped.len()
                );
            }
        }
        Command::Scoring { competition, state } => {
            let competition = CompetitionId::new(competition);
            let active = matches!(state, ScoringArg::On);
            console.set_scoring(&competition, active).await?;
            render::print_dashboard(&console.dashboard().await);
        }
        Command::Redeploy {
            competition,
            container,
            start_after,
            advanced_logging,
        } => {
            let competition = CompetitionId::new(competition);
            console.load_containers(&competition).await;
            let options = RedeployOptions {
                start_after,
                enable_advanced_logging: advanced_logging || settings.advanced_logging,
            };
            let launch = console
                .redeploy_container(&competition, ContainerId(container), options)
                .await;
            finish_job(&console, events, JobClass::Redeploy, launch).await?;
        }
        Command::Teardown { competition, yes } => {
            let competition = CompetitionId::new(competition);
            if !yes {
                bail!("teardown of {competition} is irreversible; re-run with --yes to confirm");
            }
            if let Err(err) = console.load_dashboard().await {
                warn!("console: competition list unavailable: {err}");
            }
            let launch = console.teardown_competition(&competition, true).await;
            finish_job(&console, events, JobClass::Teardown, launch).await?;
        }
        Command::Upload {
            package,
            advanced_logging,
        } => {
            let package = CompetitionPackage::read(&package).await?;
            let launch = console
                .upload_package(&package, advanced_logging || settings.advanced_logging)
                .await;
            finish_job(&console, events, JobClass::Upload, launch).await?;
        }
        Command::Watch {
            class,
            job_id,
            competition,
        } => {
            let class = JobClass::from(class);
            console
                .open_job_stream(class, &job_id, competition.map(CompetitionId::new))
                .await;
            let state = follow_job(&console, events, class).await?;
            render::print_job_status(&state);
        }
    }

    Ok(())
}

async fn panel_or_empty(
    console: &Console,
    competition: &CompetitionId,
) -> Result<console_core::ContainerPanel> {
    console
        .container_panel(competition)
        .await
        .with_context(|| format!("no container panel for {competition}"))
}

async fn team_panel(console: &Console, competition: &CompetitionId) -> Result<console_core::TeamPanel> {
    console
        .team_panel(competition)
        .await
        .with_context(|| format!("no team panel for {competition}"))
}

async fn finish_job(
    console: &Arc<Console>,
    events: broadcast::Receiver<ConsoleEvent>,
    class: JobClass,
    launch: Result<JobLaunch, console_core::ConsoleError>,
) -> Result<()> {
    let launch = match launch {
        Ok(launch) => launch,
        Err(err) => {
            render::print_job_log(&console.job_state(class).await, 0);
            return Err(err.into());
        }
    };
    if let JobLaunch::Detached = launch {
        let state = console.job_state(class).await;
        render::print_job_log(&state, 0);
        render::print_job_status(&state);
        return Ok(());
    }
    let state = follow_job(console, events, class).await?;
    render::print_job_status(&state);
    Ok(())
}

fn job_settled(state: &JobStreamState, connected: bool) -> bool {
    !connected && !state.busy && !state.phase.is_active()
}

/// Prints the job log as it grows until the stream closes. Ctrl-C closes
/// the stream instead of killing the process.
async fn follow_job(
    console: &Arc<Console>,
    events: broadcast::Receiver<ConsoleEvent>,
    class: JobClass,
) -> Result<JobStreamState> {
    let mut events = BroadcastStream::new(events);
    let mut state = console.job_state(class).await;
    let mut printed = render::print_job_log(&state, 0);

    while !job_settled(&state, console.is_job_connected(class).await) {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(ConsoleEvent::Render(RenderScope::Job(scope)))) if scope == class => {}
                Some(Ok(ConsoleEvent::Notice(text))) => println!("! {text}"),
                Some(Ok(ConsoleEvent::Render(_))) => continue,
                Some(Err(err)) => warn!("console: missed events: {err}"),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!(job_class = %class, "console: closing stream on interrupt");
                console.close_job(class).await;
            }
        }
        state = console.job_state(class).await;
        printed = render::print_job_log(&state, printed);
    }
    Ok(state)
}
