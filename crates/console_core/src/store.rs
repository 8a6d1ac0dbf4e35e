//! Competition-scoped cache of container and team panels.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    hash::Hash,
};

use shared::{
    domain::{CompetitionId, ContainerId, TeamId},
    protocol::{ContainerRecord, TeamRecord},
};
use tracing::{debug, info, warn};

use crate::{reconcile::RenderScope, Console};

pub trait PanelEntity: Clone {
    type Id: Copy + Eq + Ord + Hash + std::fmt::Debug;

    fn entity_id(&self) -> Self::Id;
}

impl PanelEntity for ContainerRecord {
    type Id = ContainerId;

    fn entity_id(&self) -> ContainerId {
        self.id
    }
}

impl PanelEntity for TeamRecord {
    type Id = TeamId;

    fn entity_id(&self) -> TeamId {
        self.id
    }
}

/// Issued by [`PanelState::begin_load`]; only the newest ticket may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone)]
pub struct PanelState<E: PanelEntity, X = ()> {
    pub entities: Vec<E>,
    pub selected: BTreeSet<E::Id>,
    pub loading: bool,
    pub loaded: bool,
    pub error: String,
    pub extra: X,
    latest_request: u64,
}

impl<E: PanelEntity, X: Default> Default for PanelState<E, X> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            selected: BTreeSet::new(),
            loading: false,
            loaded: false,
            error: String::new(),
            extra: X::default(),
            latest_request: 0,
        }
    }
}

impl<E: PanelEntity, X> PanelState<E, X> {
    pub fn begin_load(&mut self) -> LoadTicket {
        self.latest_request += 1;
        self.loading = true;
        self.error.clear();
        LoadTicket(self.latest_request)
    }

    /// Applies a fetch outcome unless a newer load has been issued since
    /// `ticket`. Returns whether the outcome was applied.
    pub fn finish_load(&mut self, ticket: LoadTicket, outcome: Result<Vec<E>, String>) -> bool {
        if ticket.0 != self.latest_request {
            return false;
        }
        match outcome {
            Ok(entities) => {
                let ids: HashSet<E::Id> = entities.iter().map(PanelEntity::entity_id).collect();
                self.selected.retain(|id| ids.contains(id));
                self.entities = entities;
                self.error.clear();
            }
            Err(message) => {
                self.entities.clear();
                self.selected.clear();
                self.error = message;
            }
        }
        self.loaded = true;
        self.loading = false;
        true
    }

    /// Settles a non-load request that took `ticket` without a fresh entity
    /// list. `loading` is only cleared while the ticket is still the latest.
    pub fn fail_request(&mut self, ticket: LoadTicket, message: String) {
        if ticket.0 == self.latest_request {
            self.loading = false;
        }
        self.error = message;
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = E::Id> + '_ {
        self.entities.iter().map(PanelEntity::entity_id)
    }

    pub fn contains(&self, id: E::Id) -> bool {
        self.entities.iter().any(|entity| entity.entity_id() == id)
    }

    pub fn find_mut(&mut self, id: E::Id) -> Option<&mut E> {
        self.entities
            .iter_mut()
            .find(|entity| entity.entity_id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackTone {
    #[default]
    Neutral,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Feedback {
    pub text: String,
    pub tone: FeedbackTone,
}

impl Feedback {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: FeedbackTone::Error,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: FeedbackTone::Success,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TeamPanelExtras {
    pub action_loading: bool,
    pub feedback: Feedback,
    pub adjust_input: String,
}

pub type ContainerPanel = PanelState<ContainerRecord>;
pub type TeamPanel = PanelState<TeamRecord, TeamPanelExtras>;

pub struct PanelStore<E: PanelEntity, X = ()> {
    panels: HashMap<CompetitionId, PanelState<E, X>>,
}

impl<E: PanelEntity, X: Default> Default for PanelStore<E, X> {
    fn default() -> Self {
        Self {
            panels: HashMap::new(),
        }
    }
}

impl<E: PanelEntity, X: Default> PanelStore<E, X> {
    pub fn ensure(&mut self, competition: &CompetitionId) -> &mut PanelState<E, X> {
        self.panels.entry(competition.clone()).or_default()
    }

    pub fn get(&self, competition: &CompetitionId) -> Option<&PanelState<E, X>> {
        self.panels.get(competition)
    }

    pub fn get_mut(&mut self, competition: &CompetitionId) -> Option<&mut PanelState<E, X>> {
        self.panels.get_mut(competition)
    }

    pub fn update<R>(
        &mut self,
        competition: &CompetitionId,
        apply: impl FnOnce(&mut PanelState<E, X>) -> R,
    ) -> R {
        apply(self.ensure(competition))
    }

    /// Drops every panel whose competition is not in `active`.
    pub fn prune(&mut self, active: &HashSet<CompetitionId>) -> usize {
        let before = self.panels.len();
        self.panels.retain(|id, _| active.contains(id));
        before - self.panels.len()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn contains(&self, competition: &CompetitionId) -> bool {
        self.panels.contains_key(competition)
    }
}

#[derive(Default)]
pub struct EntityStore {
    pub containers: PanelStore<ContainerRecord>,
    pub teams: PanelStore<TeamRecord, TeamPanelExtras>,
}

impl EntityStore {
    pub fn prune(&mut self, active: &HashSet<CompetitionId>) -> usize {
        self.containers.prune(active) + self.teams.prune(active)
    }
}

impl Console {
    pub async fn container_panel(&self, competition: &CompetitionId) -> Option<ContainerPanel> {
        self.store.lock().await.containers.get(competition).cloned()
    }

    pub async fn team_panel(&self, competition: &CompetitionId) -> Option<TeamPanel> {
        self.store.lock().await.teams.get(competition).cloned()
    }

    pub async fn load_containers(&self, competition: &CompetitionId) {
        let ticket = self
            .store
            .lock()
            .await
            .containers
            .update(competition, PanelState::begin_load);
        self.reconcile(RenderScope::Containers(competition.clone()));
        info!(competition_id = %competition, "containers: loading");

        let outcome = self
            .api
            .list_containers(competition)
            .await
            .map_err(|err| err.display_message("Unable to load containers."));
        if let Err(message) = &outcome {
            warn!(competition_id = %competition, "containers: load failed: {message}");
        }

        let applied = {
            let mut store = self.store.lock().await;
            match store.containers.get_mut(competition) {
                Some(panel) => panel.finish_load(ticket, outcome),
                None => false,
            }
        };
        if !applied {
            debug!(competition_id = %competition, "containers: discarded superseded response");
        }
        self.reconcile(RenderScope::Containers(competition.clone()));
    }

    pub async fn load_teams(&self, competition: &CompetitionId) {
        let ticket = self
            .store
            .lock()
            .await
            .teams
            .update(competition, PanelState::begin_load);
        self.reconcile(RenderScope::Teams(competition.clone()));
        info!(competition_id = %competition, "teams: loading");

        let outcome = self
            .api
            .list_teams(competition)
            .await
            .map_err(|err| err.display_message("Unable to load teams."));
        if let Err(message) = &outcome {
            warn!(competition_id = %competition, "teams: load failed: {message}");
        }

        let applied = {
            let mut store = self.store.lock().await;
            match store.teams.get_mut(competition) {
                Some(panel) => panel.finish_load(ticket, outcome),
                None => false,
            }
        };
        if !applied {
            debug!(competition_id = %competition, "teams: discarded superseded response");
        }
        self.reconcile(RenderScope::Teams(competition.clone()));
    }

    /// Removes panels for competitions that are no longer listed.
    pub async fn prune_panels(&self, active: &HashSet<CompetitionId>) -> usize {
        let removed = self.store.lock().await.prune(active);
        if removed > 0 {
            debug!(removed, "store: pruned panels for departed competitions");
        }
        removed
    }
}
