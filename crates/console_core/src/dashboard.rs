use std::collections::HashSet;

use futures::future::join_all;
use shared::{domain::CompetitionId, protocol::CompetitionSummary};
use tracing::{debug, info, warn};

use crate::{error::ConsoleError, reconcile::RenderScope, Console};

pub const DASHBOARD_LOAD_ERROR: &str = "We couldn't load competitions right now.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub total: usize,
    pub public_count: usize,
    pub private_count: usize,
}

impl DashboardStats {
    pub fn from_competitions(competitions: &[CompetitionSummary]) -> Self {
        let private_count = competitions.iter().filter(|c| c.is_private).count();
        Self {
            total: competitions.len(),
            public_count: competitions.len() - private_count,
            private_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub competitions: Vec<CompetitionSummary>,
    pub stats: DashboardStats,
    pub error: String,
    pub loaded: bool,
}

impl DashboardState {
    pub fn find(&self, competition: &CompetitionId) -> Option<&CompetitionSummary> {
        self.competitions
            .iter()
            .find(|summary| &summary.competition_id == competition)
    }
}

impl Console {
    pub async fn dashboard(&self) -> DashboardState {
        self.dashboard.lock().await.clone()
    }

    /// Refreshes the competition list, prunes panels for competitions that
    /// disappeared and, for managers, loads every panel not yet fetched.
    pub async fn load_dashboard(&self) -> Result<(), ConsoleError> {
        info!("dashboard: loading competitions");
        let competitions = match self.api.list_competitions().await {
            Ok(competitions) => competitions,
            Err(err) => {
                warn!("dashboard: load failed: {err}");
                {
                    let mut dashboard = self.dashboard.lock().await;
                    dashboard.error = DASHBOARD_LOAD_ERROR.to_string();
                    dashboard.loaded = true;
                }
                self.reconcile(RenderScope::Dashboard);
                return Err(err);
            }
        };

        let competitions: Vec<CompetitionSummary> = competitions
            .into_iter()
            .filter(|summary| !summary.competition_id.is_empty())
            .collect();
        let active: HashSet<CompetitionId> = competitions
            .iter()
            .map(|summary| summary.competition_id.clone())
            .collect();
        {
            let mut dashboard = self.dashboard.lock().await;
            dashboard.stats = DashboardStats::from_competitions(&competitions);
            dashboard.competitions = competitions;
            dashboard.error.clear();
            dashboard.loaded = true;
        }
        self.prune_panels(&active).await;
        self.reconcile(RenderScope::Dashboard);

        if !self.options.can_manage {
            return Ok(());
        }

        let (containers, teams) = {
            let mut store = self.store.lock().await;
            let mut containers = Vec::new();
            let mut teams = Vec::new();
            for competition in &active {
                let panel = store.containers.ensure(competition);
                if !panel.loaded && !panel.loading {
                    containers.push(competition.clone());
                }
                let panel = store.teams.ensure(competition);
                if !panel.loaded && !panel.loading {
                    teams.push(competition.clone());
                }
            }
            (containers, teams)
        };
        debug!(
            containers = containers.len(),
            teams = teams.len(),
            "dashboard: loading pending panels"
        );
        join_all(
            containers
                .iter()
                .map(|competition| self.load_containers(competition)),
        )
        .await;
        join_all(teams.iter().map(|competition| self.load_teams(competition))).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, is_private: bool) -> CompetitionSummary {
        CompetitionSummary {
            competition_id: id.into(),
            is_private,
            ..CompetitionSummary::default()
        }
    }

    #[test]
    fn stats_split_public_and_private() {
        let stats = DashboardStats::from_competitions(&[
            summary("a", false),
            summary("b", true),
            summary("c", false),
        ]);
        assert_eq!(
            stats,
            DashboardStats {
                total: 3,
                public_count: 2,
                private_count: 1
            }
        );
    }
}
