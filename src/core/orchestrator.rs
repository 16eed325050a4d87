/// The narrative orchestrator: state → ranked, varied candidate developments,
/// and the single commit path that mutates a session.
///
/// Composes the state store, canon manager, branch catalog, heuristic
/// selector and variation generator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::canon::{ActTransition, CanonError};
use crate::core::catalog::CatalogError;
use crate::core::chronicle::ChronicleEntry;
use crate::core::config::{ConfigError, EngineConfig, SeedStrategy};
use crate::core::selector::{HeuristicSelector, Ranked};
use crate::core::state::{NarrativeState, StateError};
use crate::core::story::Story;
use crate::core::variation::{VariationError, VariationGenerator};
use crate::schema::development::{CandidateDevelopment, PossibleAction};

/// Tag attached to developments that satisfy a canon event.
pub const CANON_TAG: &str = "canon";
/// Tag attached to developments whose branch carries a twist.
pub const PLOT_TWIST_TAG: &str = "plot_twist";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("canon error: {0}")]
    Canon(#[from] CanonError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("variation error: {0}")]
    Variation(#[from] VariationError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no branch can be offered in act '{act}' at turn {turn}")]
    ExhaustedBranches {
        act: String,
        turn: u64,
        /// Canon still owed by the act, for the caller to present directly.
        outstanding: Vec<String>,
    },
    #[error("development for '{0}' was proposed against a different state")]
    StaleDevelopment(String),
    #[error("unknown branch '{0}'")]
    UnknownBranch(String),
    #[error("choice {index} is out of range for {offered} development(s)")]
    InvalidChoice { index: usize, offered: usize },
    #[error("no story supplied: use story_file() or with_story()")]
    MissingStory,
}

/// What a commit changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub branch_id: String,
    /// Canon event newly satisfied by this commit.
    pub satisfied_event: Option<String>,
    /// Whether the current act's canon list is now complete.
    pub act_complete: bool,
    pub turn: u64,
}

/// Immutable, shareable engine over one story. Sessions own their state.
#[derive(Debug, Clone)]
pub struct NarrativeOrchestrator {
    story: Story,
    config: EngineConfig,
}

/// Builder for constructing a `NarrativeOrchestrator`.
#[derive(Debug, Default)]
pub struct NarrativeOrchestratorBuilder {
    story_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    /// Directly provided story (for testing without files).
    story: Option<Story>,
    /// Directly provided config (for testing without files).
    config: Option<EngineConfig>,
    max_choices: Option<usize>,
    force_canon_after_turns: Option<Option<u32>>,
    variation_seed: Option<SeedStrategy>,
}

impl NarrativeOrchestrator {
    pub fn builder() -> NarrativeOrchestratorBuilder {
        NarrativeOrchestratorBuilder::default()
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh session at the start of the first act.
    pub fn new_state(&self) -> NarrativeState {
        NarrativeState::new(&self.story.schema, self.story.canon.first_act())
    }

    /// Canon events still owed by the current act.
    pub fn outstanding(&self, state: &NarrativeState) -> Vec<String> {
        self.story
            .canon
            .outstanding_current(state)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Rank, vary and render the next developments for `player_action`.
    ///
    /// Side-effect free: repeated calls on the same state and action
    /// return identical results.
    pub fn propose(
        &self,
        state: &NarrativeState,
        player_action: &str,
    ) -> Result<Vec<CandidateDevelopment>, OrchestratorError> {
        let eligible = self.story.catalog.eligible_for(state, player_action)?;
        let traits = state.trait_snapshot();
        let selector = HeuristicSelector::new(&self.story.canon, &self.story.catalog, &self.config);
        let ranked = selector.rank(&eligible, state, &traits);
        let generator = VariationGenerator::for_turn(self.config.variation_seed, state, player_action);

        let mut picked = Vec::with_capacity(self.config.max_choices);
        for candidate in ranked {
            if picked.len() == self.config.max_choices {
                break;
            }
            match generator.resolve(candidate.branch, &traits) {
                Ok(variations) => picked.push((candidate, variations)),
                Err(e) => warn!(error = %e, "branch dropped from proposal"),
            }
        }

        if picked.is_empty() {
            warn!(act = state.act(), turn = state.turn(), "branches exhausted");
            return Err(self.exhausted(state));
        }

        let offered = picked.len();
        let fingerprint = state.fingerprint();
        let impact = state.chronicle().action_impact();
        let developments: Vec<CandidateDevelopment> = picked
            .into_iter()
            .enumerate()
            .map(|(index, (ranked, variations))| {
                build_development(index, offered, ranked, variations, player_action, impact, fingerprint)
            })
            .collect();

        debug!(
            turn = state.turn(),
            action = player_action,
            eligible = eligible.len(),
            offered,
            "developments proposed"
        );
        Ok(developments)
    }

    /// Apply a proposed development to the session it was proposed for.
    ///
    /// All-or-nothing: on error `state` is left untouched.
    pub fn commit(
        &self,
        state: &mut NarrativeState,
        development: &CandidateDevelopment,
    ) -> Result<CommitOutcome, OrchestratorError> {
        if development.state_fingerprint != state.fingerprint() {
            return Err(OrchestratorError::StaleDevelopment(development.branch_id.clone()));
        }
        let branch = self
            .story
            .catalog
            .get(&development.branch_id)
            .ok_or_else(|| OrchestratorError::UnknownBranch(development.branch_id.clone()))?;

        let mut next = state.clone();
        for effect in &branch.effects {
            next.apply_effect(effect)?;
        }
        next.record_visit(&branch.id);
        next.close_branches(&branch.closes);

        let mut satisfied_event = None;
        if let Some(event) = &branch.canon_event {
            if self.story.canon.mark_satisfied(&mut next, event)? {
                satisfied_event = Some(event.clone());
            }
        }

        next.chronicle_mut().record(ChronicleEntry {
            branch_id: branch.id.clone(),
            description: development.description.clone(),
            choices: development.offered,
            chosen_index: development.index,
            tags: development.tags.clone(),
        });
        next.advance_turn();

        let outcome = CommitOutcome {
            branch_id: branch.id.clone(),
            satisfied_event,
            act_complete: self.story.canon.is_act_complete(&next),
            turn: next.turn(),
        };
        *state = next;

        info!(
            branch = %outcome.branch_id,
            turn = outcome.turn,
            canon = outcome.satisfied_event.as_deref().unwrap_or("-"),
            act_complete = outcome.act_complete,
            "development committed"
        );
        Ok(outcome)
    }

    /// Commit the development the player picked from a proposal.
    pub fn commit_choice(
        &self,
        state: &mut NarrativeState,
        developments: &[CandidateDevelopment],
        index: usize,
    ) -> Result<CommitOutcome, OrchestratorError> {
        let development = developments.get(index).ok_or(OrchestratorError::InvalidChoice {
            index,
            offered: developments.len(),
        })?;
        self.commit(state, development)
    }

    pub fn advance_act(&self, state: &mut NarrativeState) -> Result<ActTransition, OrchestratorError> {
        Ok(self.story.canon.advance_act(state)?)
    }

    fn exhausted(&self, state: &NarrativeState) -> OrchestratorError {
        OrchestratorError::ExhaustedBranches {
            act: state.act().to_string(),
            turn: state.turn(),
            outstanding: self.outstanding(state),
        }
    }
}

fn build_development(
    index: usize,
    offered: usize,
    ranked: Ranked<'_>,
    variations: BTreeMap<String, String>,
    player_action: &str,
    impact: f64,
    fingerprint: u64,
) -> CandidateDevelopment {
    let branch = ranked.branch;
    let mut tags = branch.tags.clone();
    if branch.canon_event.is_some() && !tags.iter().any(|t| t == CANON_TAG) {
        tags.push(CANON_TAG.to_string());
    }
    if branch.twist.is_some() && !tags.iter().any(|t| t == PLOT_TWIST_TAG) {
        tags.push(PLOT_TWIST_TAG.to_string());
    }

    CandidateDevelopment {
        index,
        offered,
        branch_id: branch.id.clone(),
        tier: ranked.tier,
        score: ranked.score,
        canon_event: branch.canon_event.clone(),
        description: branch.description.render(&variations),
        situation: branch.situation.render(&variations),
        twist: branch.twist.clone(),
        possible_actions: branch
            .actions
            .iter()
            .map(|action| PossibleAction {
                text: action.render(&variations),
                impact,
            })
            .collect(),
        tags,
        variations,
        player_action: player_action.to_string(),
        state_fingerprint: fingerprint,
    }
}

impl NarrativeOrchestratorBuilder {
    /// Load the story from a RON file at build time.
    pub fn story_file(mut self, path: impl AsRef<Path>) -> Self {
        self.story_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Provide a story directly (for testing without files).
    pub fn with_story(mut self, story: Story) -> Self {
        self.story = Some(story);
        self
    }

    /// Load the engine configuration from a RON file at build time.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn max_choices(mut self, max_choices: usize) -> Self {
        self.max_choices = Some(max_choices);
        self
    }

    pub fn force_canon_after_turns(mut self, turns: u32) -> Self {
        self.force_canon_after_turns = Some(Some(turns));
        self
    }

    pub fn seed_strategy(mut self, strategy: SeedStrategy) -> Self {
        self.variation_seed = Some(strategy);
        self
    }

    pub fn build(self) -> Result<NarrativeOrchestrator, OrchestratorError> {
        let story = match (self.story, self.story_path) {
            (Some(story), _) => story,
            (None, Some(path)) => Story::load_from_ron(&path)?,
            (None, None) => return Err(OrchestratorError::MissingStory),
        };

        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(&path)?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(max_choices) = self.max_choices {
            config.max_choices = max_choices;
        }
        if let Some(turns) = self.force_canon_after_turns {
            config.force_canon_after_turns = turns;
        }
        if let Some(strategy) = self.variation_seed {
            config.variation_seed = strategy;
        }
        config.validate()?;

        debug!(
            max_choices = config.max_choices,
            force_canon_after_turns = ?config.force_canon_after_turns,
            "orchestrator built"
        );
        Ok(NarrativeOrchestrator { story, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StateSchema;
    use crate::schema::branch::{BranchDraft, CandidateDraft, Effect, SlotDraft};
    use crate::schema::canon::ActDefinition;
    use crate::schema::development::SelectionTier;
    use crate::schema::value::{Value, VarDecl};

    fn story() -> Story {
        let schema = StateSchema::new()
            .declare("trust", VarDecl::number(50.0).with_range(0.0, 100.0))
            .declare("courage", VarDecl::trait_score(80.0, 0.0, 100.0));
        Story::new(
            schema,
            vec![
                ActDefinition::new("ACT1", &["Arrival"]),
                ActDefinition::new("ACT2", &["Betrayal"]),
            ],
            vec![
                BranchDraft::new("arrive")
                    .canon("Arrival")
                    .description("The gates of the manor open.")
                    .action("Step inside"),
                BranchDraft::new("betray")
                    .canon("Betrayal")
                    .twist("The butler was the informant all along.")
                    .effect(Effect::Adjust {
                        variable: "trust".into(),
                        delta: -30.0,
                    }),
                BranchDraft::new("climb")
                    .slot(
                        "height",
                        SlotDraft::new(vec![
                            CandidateDraft::new("the wall"),
                            CandidateDraft::gated("the tower", "courage > 70"),
                        ]),
                    )
                    .description("You climb {height}.")
                    .action("Look out from {height}")
                    .effect(Effect::Adjust {
                        variable: "trust".into(),
                        delta: 5.0,
                    }),
                BranchDraft::new("rest").repeatable(),
            ],
        )
        .unwrap()
    }

    fn orchestrator() -> NarrativeOrchestrator {
        NarrativeOrchestrator::builder().with_story(story()).build().unwrap()
    }

    #[test]
    fn builder_requires_story() {
        assert!(matches!(
            NarrativeOrchestrator::builder().build(),
            Err(OrchestratorError::MissingStory)
        ));
    }

    #[test]
    fn builder_validates_config() {
        let err = NarrativeOrchestrator::builder()
            .with_story(story())
            .max_choices(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn orchestrator_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NarrativeOrchestrator>();
    }

    #[test]
    fn propose_renders_variations_and_payload() {
        let engine = orchestrator();
        let state = engine.new_state();
        let developments = engine.propose(&state, "look around").unwrap();
        assert_eq!(developments.len(), 3);

        let climb = &developments[0];
        assert_eq!(climb.branch_id, "climb");
        assert_eq!(climb.tier, SelectionTier::TraitMatch);
        assert_eq!(climb.variations["height"], "the tower");
        assert_eq!(climb.description, "You climb the tower.");
        assert_eq!(climb.possible_actions[0].text, "Look out from the tower");
        assert!((climb.possible_actions[0].impact - 0.5).abs() < 1e-9);
        assert_eq!(climb.state_fingerprint, state.fingerprint());

        let arrive = &developments[1];
        assert!(arrive.has_tag(CANON_TAG));
        assert!(developments.iter().all(|d| d.offered == 3));
    }

    #[test]
    fn propose_is_repeatable() {
        let engine = orchestrator();
        let state = engine.new_state();
        let first = engine.propose(&state, "wait").unwrap();
        let second = engine.propose(&state, "wait").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn commit_applies_effects_and_canon() {
        let engine = orchestrator();
        let mut state = engine.new_state();
        let developments = engine.propose(&state, "wait").unwrap();
        let index = developments.iter().position(|d| d.branch_id == "arrive").unwrap();

        let outcome = engine.commit_choice(&mut state, &developments, index).unwrap();
        assert_eq!(outcome.satisfied_event.as_deref(), Some("Arrival"));
        assert!(outcome.act_complete);
        assert_eq!(state.turn(), 1);
        assert!(state.visited_branches().contains("arrive"));
        assert_eq!(state.chronicle().len(), 1);
        assert_eq!(state.chronicle().entries()[0].chosen_index, index);

        assert!(matches!(
            engine.advance_act(&mut state).unwrap(),
            ActTransition::Advanced { .. }
        ));
        let developments = engine.propose(&state, "wait").unwrap();
        let betray = developments.iter().find(|d| d.branch_id == "betray").unwrap();
        assert!(betray.has_tag(PLOT_TWIST_TAG));
        engine.commit(&mut state, betray).unwrap();
        assert_eq!(state.get("trust").unwrap(), Value::Number(20.0));
    }

    #[test]
    fn stale_development_rejected() {
        let engine = orchestrator();
        let mut state = engine.new_state();
        let developments = engine.propose(&state, "wait").unwrap();
        engine.commit(&mut state, &developments[0]).unwrap();
        let before = state.clone();
        assert!(matches!(
            engine.commit(&mut state, &developments[1]),
            Err(OrchestratorError::StaleDevelopment(_))
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn invalid_choice_rejected() {
        let engine = orchestrator();
        let mut state = engine.new_state();
        let developments = engine.propose(&state, "wait").unwrap();
        assert!(matches!(
            engine.commit_choice(&mut state, &developments, 7),
            Err(OrchestratorError::InvalidChoice { index: 7, offered: 3 })
        ));
    }

    #[test]
    fn consumed_branches_are_not_offered_again() {
        let engine = orchestrator();
        let mut state = engine.new_state();
        let developments = engine.propose(&state, "wait").unwrap();
        let climb = developments.iter().find(|d| d.branch_id == "climb").unwrap();
        engine.commit(&mut state, climb).unwrap();
        let ids: Vec<String> = engine
            .propose(&state, "wait")
            .unwrap()
            .into_iter()
            .map(|d| d.branch_id)
            .collect();
        assert!(!ids.contains(&"climb".to_string()));
        assert!(ids.contains(&"rest".to_string()));
    }

    #[test]
    fn exhausted_when_nothing_eligible() {
        let schema = StateSchema::new().declare("trust", VarDecl::number(10.0).with_range(0.0, 100.0));
        let story = Story::new(
            schema,
            vec![ActDefinition::new("ACT1", &[])],
            vec![BranchDraft::new("impossible").when("trust < 0")],
        )
        .unwrap();
        let engine = NarrativeOrchestrator::builder().with_story(story).build().unwrap();
        let state = engine.new_state();
        match engine.propose(&state, "anything") {
            Err(OrchestratorError::ExhaustedBranches { act, outstanding, .. }) => {
                assert_eq!(act, "ACT1");
                assert!(outstanding.is_empty());
            }
            other => panic!("expected ExhaustedBranches, got {other:?}"),
        }
    }

    #[test]
    fn branch_without_viable_variation_is_replaced() {
        let schema = StateSchema::new().declare("courage", VarDecl::trait_score(10.0, 0.0, 100.0));
        let story = Story::new(
            schema,
            vec![ActDefinition::new("ACT1", &[])],
            vec![
                BranchDraft::new("leap").slot(
                    "ledge",
                    SlotDraft::new(vec![CandidateDraft::gated("the roof", "courage > 70")]),
                ),
                BranchDraft::new("walk"),
                BranchDraft::new("sit"),
            ],
        )
        .unwrap();
        let engine = NarrativeOrchestrator::builder()
            .with_story(story)
            .max_choices(2)
            .build()
            .unwrap();
        let ids: Vec<String> = engine
            .propose(&engine.new_state(), "move")
            .unwrap()
            .into_iter()
            .map(|d| d.branch_id)
            .collect();
        assert_eq!(ids, vec!["walk", "sit"]);
    }
}
