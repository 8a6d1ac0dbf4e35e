//! Selection maintenance for container and team panels.
//!
//! Every mutation is checked against the identifiers of the panel's current
//! entities, so a selection can never name an entity the panel does not hold.

use shared::domain::{CompetitionId, ContainerId, TeamId};

use crate::{
    reconcile::RenderScope,
    store::{ContainerPanel, PanelEntity, PanelState, TeamPanel},
    Console,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAllState {
    Checked,
    Unchecked,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSummary {
    pub count: usize,
    pub total: usize,
    pub select_all: SelectAllState,
}

pub fn toggle_one<E: PanelEntity, X>(panel: &mut PanelState<E, X>, id: E::Id, checked: bool) {
    if checked {
        if panel.contains(id) {
            panel.selected.insert(id);
        }
    } else {
        panel.selected.remove(&id);
    }
}

pub fn toggle_all<E: PanelEntity, X>(panel: &mut PanelState<E, X>, checked: bool) {
    panel.selected.clear();
    if checked {
        let ids: Vec<E::Id> = panel.entity_ids().collect();
        panel.selected.extend(ids);
    }
}

pub fn selection_summary<E: PanelEntity, X>(panel: &PanelState<E, X>) -> SelectionSummary {
    let count = panel.selected.len();
    let total = panel.entities.len();
    let select_all = if total > 0 && count == total {
        SelectAllState::Checked
    } else if count > 0 && count < total {
        SelectAllState::Indeterminate
    } else {
        SelectAllState::Unchecked
    };
    SelectionSummary {
        count,
        total,
        select_all,
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

pub fn container_selection_label(panel: &ContainerPanel) -> String {
    let count = panel.selected.len();
    if panel.loading {
        "Loading containers...".to_string()
    } else if count > 0 {
        format!("{count} container{} selected", plural(count))
    } else if !panel.loaded {
        "Load the list to manage containers".to_string()
    } else if panel.entities.is_empty() {
        "No containers found".to_string()
    } else {
        "No containers selected".to_string()
    }
}

pub fn team_selection_label(panel: &TeamPanel) -> String {
    let count = panel.selected.len();
    if panel.loading {
        "Loading teams...".to_string()
    } else if !panel.loaded {
        "Expand to load teams.".to_string()
    } else if panel.entities.is_empty() {
        "No teams available".to_string()
    } else if count > 0 {
        format!("{count} team{} selected", plural(count))
    } else {
        "Select teams to adjust".to_string()
    }
}

/// Start/stop buttons.
pub fn container_actions_enabled(panel: &ContainerPanel) -> bool {
    !panel.loading && !panel.selected.is_empty()
}

pub fn container_select_all_enabled(panel: &ContainerPanel) -> bool {
    !panel.loading && panel.loaded && !panel.entities.is_empty()
}

/// Reset/adjust buttons and the adjustment input.
pub fn team_actions_enabled(panel: &TeamPanel) -> bool {
    !panel.loading && !panel.extra.action_loading && !panel.selected.is_empty()
}

pub fn team_select_all_enabled(panel: &TeamPanel) -> bool {
    !panel.loading && !panel.entities.is_empty()
}

impl Console {
    pub async fn toggle_container(&self, competition: &CompetitionId, id: ContainerId, checked: bool) {
        self.store
            .lock()
            .await
            .containers
            .update(competition, |panel| toggle_one(panel, id, checked));
        self.reconcile(RenderScope::Containers(competition.clone()));
    }

    pub async fn toggle_all_containers(&self, competition: &CompetitionId, checked: bool) {
        self.store
            .lock()
            .await
            .containers
            .update(competition, |panel| toggle_all(panel, checked));
        self.reconcile(RenderScope::Containers(competition.clone()));
    }

    pub async fn toggle_team(&self, competition: &CompetitionId, id: TeamId, checked: bool) {
        self.store
            .lock()
            .await
            .teams
            .update(competition, |panel| toggle_one(panel, id, checked));
        self.reconcile(RenderScope::Teams(competition.clone()));
    }

    pub async fn toggle_all_teams(&self, competition: &CompetitionId, checked: bool) {
        self.store
            .lock()
            .await
            .teams
            .update(competition, |panel| toggle_all(panel, checked));
        self.reconcile(RenderScope::Teams(competition.clone()));
    }

    /// Records the raw score-adjustment text; it is validated when the
    /// adjust action runs.
    pub async fn set_adjust_input(&self, competition: &CompetitionId, raw: &str) {
        self.store
            .lock()
            .await
            .teams
            .update(competition, |panel| panel.extra.adjust_input = raw.to_string());
        self.reconcile(RenderScope::Teams(competition.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{ContainerRecord, TeamRecord};

    fn team(id: i64) -> TeamRecord {
        TeamRecord {
            id: TeamId(id),
            name: format!("Team {id}"),
            score: 0,
            last_updated: String::new(),
            network: String::new(),
        }
    }

    fn loaded_panel(ids: &[i64]) -> TeamPanel {
        let mut panel = TeamPanel::default();
        let ticket = panel.begin_load();
        panel.finish_load(ticket, Ok(ids.iter().copied().map(team).collect()));
        panel
    }

    #[test]
    fn toggle_all_selects_every_current_entity() {
        let mut panel = loaded_panel(&[1, 2, 3]);
        toggle_all(&mut panel, true);
        assert_eq!(
            panel.selected.iter().copied().collect::<Vec<_>>(),
            vec![TeamId(1), TeamId(2), TeamId(3)]
        );
        toggle_all(&mut panel, false);
        assert!(panel.selected.is_empty());
    }

    #[test]
    fn toggle_one_ignores_unknown_ids() {
        let mut panel = loaded_panel(&[1, 2]);
        toggle_one(&mut panel, TeamId(99), true);
        assert!(panel.selected.is_empty());
        toggle_one(&mut panel, TeamId(2), true);
        toggle_one(&mut panel, TeamId(2), true);
        assert_eq!(panel.selected.len(), 1);
        toggle_one(&mut panel, TeamId(2), false);
        assert!(panel.selected.is_empty());
    }

    #[test]
    fn summary_is_tri_state() {
        let mut panel = loaded_panel(&[1, 2, 3]);
        assert_eq!(selection_summary(&panel).select_all, SelectAllState::Unchecked);

        toggle_one(&mut panel, TeamId(1), true);
        let summary = selection_summary(&panel);
        assert_eq!(summary.select_all, SelectAllState::Indeterminate);
        assert_eq!((summary.count, summary.total), (1, 3));

        toggle_all(&mut panel, true);
        assert_eq!(selection_summary(&panel).select_all, SelectAllState::Checked);
    }

    #[test]
    fn empty_panel_is_never_checked() {
        let panel = loaded_panel(&[]);
        assert_eq!(selection_summary(&panel).select_all, SelectAllState::Unchecked);
        assert!(!team_select_all_enabled(&panel));
    }

    #[test]
    fn labels_follow_panel_lifecycle() {
        let mut panel = ContainerPanel::default();
        assert_eq!(
            container_selection_label(&panel),
            "Load the list to manage containers"
        );
        panel.begin_load();
        assert_eq!(container_selection_label(&panel), "Loading containers...");

        let mut teams = loaded_panel(&[1, 2]);
        assert_eq!(team_selection_label(&teams), "Select teams to adjust");
        toggle_one(&mut teams, TeamId(1), true);
        assert_eq!(team_selection_label(&teams), "1 team selected");
        toggle_all(&mut teams, true);
        assert_eq!(team_selection_label(&teams), "2 teams selected");
    }

    #[test]
    fn team_actions_are_disabled_while_an_action_runs() {
        let mut panel = loaded_panel(&[1]);
        toggle_all(&mut panel, true);
        assert!(team_actions_enabled(&panel));
        panel.extra.action_loading = true;
        assert!(!team_actions_enabled(&panel));
    }

    fn container(id: i64) -> ContainerRecord {
        ContainerRecord {
            id: ContainerId(id),
            name: None,
            ip_address: None,
            node: None,
            status: "stopped".into(),
            team: None,
            container_config_name: None,
            last_updated: None,
        }
    }

    #[test]
    fn container_controls_follow_load_and_selection() {
        let mut panel = ContainerPanel::default();
        assert!(!container_select_all_enabled(&panel));
        assert!(!container_actions_enabled(&panel));

        let ticket = panel.begin_load();
        panel.finish_load(ticket, Ok(vec![container(301), container(302)]));
        assert!(container_select_all_enabled(&panel));
        assert!(!container_actions_enabled(&panel));

        toggle_one(&mut panel, ContainerId(301), true);
        assert!(container_actions_enabled(&panel));

        panel.begin_load();
        assert!(!container_actions_enabled(&panel));
        assert!(!container_select_all_enabled(&panel));
    }

    #[test]
    fn empty_container_list_disables_select_all() {
        let mut panel = ContainerPanel::default();
        let ticket = panel.begin_load();
        panel.finish_load(ticket, Ok(Vec::new()));
        assert!(panel.loaded);
        assert!(!container_select_all_enabled(&panel));
    }
}
