/// Canon manager — the act schedule and the mandatory beats of each act.
///
/// The schedule is immutable and shared; satisfaction progress lives in
/// each session's `NarrativeState`.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::catalog::BranchCatalog;
use crate::core::state::NarrativeState;
use crate::schema::branch::BranchDefinition;
use crate::schema::canon::{ActDefinition, CanonEvent};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanonError {
    #[error("act '{act}' still has outstanding canon events: {}", .outstanding.join(", "))]
    CanonIncomplete { act: String, outstanding: Vec<String> },
    #[error("unknown canon event '{0}'")]
    UnknownEvent(String),
    #[error("unknown act '{0}'")]
    UnknownAct(String),
    #[error("canon event '{event}' belongs to act '{expected}', not the current act '{current}'")]
    WrongAct {
        event: String,
        expected: String,
        current: String,
    },
    #[error("the story is already complete")]
    StoryComplete,
    #[error("invalid canon schedule: {}", .0.join("; "))]
    InvalidSchedule(Vec<String>),
}

/// Result of a successful act advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActTransition {
    Advanced { from: String, to: String },
    /// The final act's canon was complete; the story is over.
    StoryComplete,
}

#[derive(Debug, Clone)]
pub struct CanonManager {
    acts: Vec<ActDefinition>,
    /// Canon event id → index of the owning act.
    event_acts: FxHashMap<String, usize>,
}

impl CanonManager {
    pub fn new(acts: Vec<ActDefinition>) -> Result<CanonManager, CanonError> {
        let mut problems = Vec::new();
        if acts.is_empty() {
            problems.push("at least one act is required".to_string());
        }

        let mut act_ids: FxHashMap<&str, usize> = FxHashMap::default();
        let mut event_acts = FxHashMap::default();
        for (pos, act) in acts.iter().enumerate() {
            if act.id.trim().is_empty() {
                problems.push(format!("act #{} has an empty id", pos + 1));
            }
            if act_ids.insert(act.id.as_str(), pos).is_some() {
                problems.push(format!("act '{}' is declared more than once", act.id));
            }
            for event in &act.canon {
                if event.trim().is_empty() {
                    problems.push(format!("act '{}' has an empty canon event id", act.id));
                } else if let Some(previous) = event_acts.insert(event.clone(), pos) {
                    problems.push(format!(
                        "canon event '{}' appears in both '{}' and '{}'",
                        event, acts[previous].id, act.id
                    ));
                }
            }
        }

        if !problems.is_empty() {
            return Err(CanonError::InvalidSchedule(problems));
        }
        Ok(CanonManager { acts, event_acts })
    }

    pub fn acts(&self) -> &[ActDefinition] {
        &self.acts
    }

    pub fn first_act(&self) -> &str {
        self.acts.first().map(|a| a.id.as_str()).unwrap_or_default()
    }

    pub fn act(&self, id: &str) -> Option<&ActDefinition> {
        self.acts.iter().find(|a| a.id == id)
    }

    pub fn contains_event(&self, event: &str) -> bool {
        self.event_acts.contains_key(event)
    }

    /// The act a canon event belongs to.
    pub fn act_of(&self, event: &str) -> Option<&str> {
        self.event_acts
            .get(event)
            .map(|&pos| self.acts[pos].id.as_str())
    }

    /// Every canon event with its satisfaction status in `state`.
    pub fn events(&self, state: &NarrativeState) -> Vec<CanonEvent> {
        let completed = state.completed_acts();
        self.acts
            .iter()
            .flat_map(|act| {
                let done = completed.iter().any(|a| *a == act.id);
                let current = act.id == state.act();
                act.canon.iter().map(move |event| CanonEvent {
                    id: event.clone(),
                    act: act.id.clone(),
                    satisfied: done || (current && state.triggered_events().contains(event)),
                })
            })
            .collect()
    }

    /// Unsatisfied events of `act`, in authoring order.
    ///
    /// Completed acts have nothing outstanding; acts not yet reached owe
    /// their whole list.
    pub fn outstanding<'a>(&'a self, act: &str, state: &NarrativeState) -> Vec<&'a str> {
        let Some(definition) = self.act(act) else {
            return Vec::new();
        };
        if state.completed_acts().iter().any(|a| a == act) {
            return Vec::new();
        }
        let current = act == state.act();
        definition
            .canon
            .iter()
            .filter(|event| !(current && state.triggered_events().contains(*event)))
            .map(String::as_str)
            .collect()
    }

    pub fn outstanding_current<'a>(&'a self, state: &NarrativeState) -> Vec<&'a str> {
        self.outstanding(state.act(), state)
    }

    pub fn is_act_complete(&self, state: &NarrativeState) -> bool {
        self.outstanding_current(state).is_empty()
    }

    /// Record a canon event as satisfied. Returns `false` if it already was.
    pub fn mark_satisfied(&self, state: &mut NarrativeState, event: &str) -> Result<bool, CanonError> {
        let expected = self
            .act_of(event)
            .ok_or_else(|| CanonError::UnknownEvent(event.to_string()))?;
        if state.is_story_complete() {
            return Err(CanonError::StoryComplete);
        }
        if expected != state.act() {
            return Err(CanonError::WrongAct {
                event: event.to_string(),
                expected: expected.to_string(),
                current: state.act().to_string(),
            });
        }
        let newly = state.record_triggered(event);
        if newly {
            debug!(event, act = expected, "canon event satisfied");
        }
        Ok(newly)
    }

    /// Move to the next act once the current act's canon is complete.
    pub fn advance_act(&self, state: &mut NarrativeState) -> Result<ActTransition, CanonError> {
        if state.is_story_complete() {
            return Err(CanonError::StoryComplete);
        }
        let outstanding = self.outstanding_current(state);
        if !outstanding.is_empty() {
            return Err(CanonError::CanonIncomplete {
                act: state.act().to_string(),
                outstanding: outstanding.into_iter().map(str::to_string).collect(),
            });
        }
        let pos = self
            .acts
            .iter()
            .position(|a| a.id == state.act())
            .ok_or_else(|| CanonError::UnknownAct(state.act().to_string()))?;

        match self.acts.get(pos + 1) {
            Some(next) => {
                let from = state.act().to_string();
                state.enter_act(&next.id);
                info!(from = %from, to = %next.id, turn = state.turn(), "act advanced");
                Ok(ActTransition::Advanced {
                    from,
                    to: next.id.clone(),
                })
            }
            None => {
                state.finish_story();
                info!(act = state.act(), turn = state.turn(), "story complete");
                Ok(ActTransition::StoryComplete)
            }
        }
    }

    /// Whether this turn is past the canon deadline for the current act.
    pub fn is_forced_turn(&self, state: &NarrativeState, deadline: Option<u32>) -> bool {
        deadline.is_some_and(|d| state.turns_in_act() >= u64::from(d))
    }

    /// Whether committing `branch` would leave an outstanding canon event,
    /// of the current act or any act still to come, with no branch that
    /// could still satisfy it.
    ///
    /// Structural only: conditions are assumed satisfiable.
    pub fn would_block(
        &self,
        branch: &BranchDefinition,
        state: &NarrativeState,
        catalog: &BranchCatalog,
    ) -> bool {
        let Some(pos) = self.acts.iter().position(|a| a.id == state.act()) else {
            return false;
        };
        self.acts[pos..]
            .iter()
            .flat_map(|act| self.outstanding(&act.id, state))
            .any(|event| {
                if branch.canon_event.as_deref() == Some(event) {
                    return false;
                }
                let reachable_before = catalog
                    .satisfiers(event)
                    .any(|s| catalog.can_still_commit(&s.id, state, None));
                reachable_before
                    && !catalog
                        .satisfiers(event)
                        .any(|s| catalog.can_still_commit(&s.id, state, Some(branch)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StateSchema;
    use crate::schema::branch::BranchDraft;

    fn manager() -> CanonManager {
        CanonManager::new(vec![
            ActDefinition::new("ACT1", &["Arrival", "FirstClue"]),
            ActDefinition::new("ACT2", &["Betrayal"]),
        ])
        .unwrap()
    }

    fn state() -> NarrativeState {
        NarrativeState::new(&StateSchema::new(), "ACT1")
    }

    #[test]
    fn invalid_schedules_rejected() {
        assert!(matches!(CanonManager::new(vec![]), Err(CanonError::InvalidSchedule(_))));
        let err = CanonManager::new(vec![
            ActDefinition::new("ACT1", &["Arrival"]),
            ActDefinition::new("ACT1", &["Arrival"]),
        ])
        .unwrap_err();
        match err {
            CanonError::InvalidSchedule(problems) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn outstanding_in_authoring_order() {
        let canon = manager();
        let mut s = state();
        assert_eq!(canon.outstanding("ACT1", &s), vec!["Arrival", "FirstClue"]);
        assert_eq!(canon.outstanding("ACT2", &s), vec!["Betrayal"]);
        canon.mark_satisfied(&mut s, "FirstClue").unwrap();
        assert_eq!(canon.outstanding_current(&s), vec!["Arrival"]);
        assert!(canon.outstanding("ACT9", &s).is_empty());
    }

    #[test]
    fn mark_satisfied_is_idempotent() {
        let canon = manager();
        let mut s = state();
        assert!(canon.mark_satisfied(&mut s, "Arrival").unwrap());
        assert!(!canon.mark_satisfied(&mut s, "Arrival").unwrap());
        assert_eq!(s.triggered_events().len(), 1);
    }

    #[test]
    fn mark_satisfied_errors() {
        let canon = manager();
        let mut s = state();
        assert_eq!(
            canon.mark_satisfied(&mut s, "Coronation"),
            Err(CanonError::UnknownEvent("Coronation".into()))
        );
        assert!(matches!(
            canon.mark_satisfied(&mut s, "Betrayal"),
            Err(CanonError::WrongAct { .. })
        ));
    }

    #[test]
    fn advance_requires_complete_canon() {
        let canon = manager();
        let mut s = state();
        canon.mark_satisfied(&mut s, "Arrival").unwrap();
        match canon.advance_act(&mut s) {
            Err(CanonError::CanonIncomplete { act, outstanding }) => {
                assert_eq!(act, "ACT1");
                assert_eq!(outstanding, vec!["FirstClue".to_string()]);
            }
            other => panic!("expected CanonIncomplete, got {other:?}"),
        }
        assert_eq!(s.act(), "ACT1");

        canon.mark_satisfied(&mut s, "FirstClue").unwrap();
        assert_eq!(
            canon.advance_act(&mut s).unwrap(),
            ActTransition::Advanced {
                from: "ACT1".into(),
                to: "ACT2".into()
            }
        );
        assert_eq!(s.act(), "ACT2");
        assert!(canon.outstanding("ACT1", &s).is_empty());

        canon.mark_satisfied(&mut s, "Betrayal").unwrap();
        assert_eq!(canon.advance_act(&mut s).unwrap(), ActTransition::StoryComplete);
        assert!(s.is_story_complete());
        assert_eq!(canon.advance_act(&mut s), Err(CanonError::StoryComplete));
        assert!(canon.events(&s).iter().all(|e| e.satisfied));
    }

    #[test]
    fn forced_turn_deadline() {
        let canon = manager();
        let mut s = state();
        assert!(!canon.is_forced_turn(&s, None));
        assert!(canon.is_forced_turn(&s, Some(0)));
        assert!(!canon.is_forced_turn(&s, Some(1)));
        s.advance_turn();
        assert!(canon.is_forced_turn(&s, Some(1)));
    }

    #[test]
    fn would_block_detects_last_satisfier_closed() {
        let canon = CanonManager::new(vec![ActDefinition::new("ACT1", &["Arrival"])]).unwrap();
        let schema = StateSchema::new();
        let catalog = BranchCatalog::new(
            vec![
                BranchDraft::new("front_door").canon("Arrival"),
                BranchDraft::new("burn_bridge").closes("front_door"),
                BranchDraft::new("side_path").closes("back_door"),
                BranchDraft::new("back_door").canon("Arrival"),
                BranchDraft::new("wander"),
            ],
            &schema,
            &canon,
        )
        .unwrap();
        let s = NarrativeState::new(&schema, "ACT1");
        let get = |id: &str| catalog.get(id).unwrap();

        assert!(!canon.would_block(get("wander"), &s, &catalog));
        // another satisfier remains
        assert!(!canon.would_block(get("burn_bridge"), &s, &catalog));
        assert!(!canon.would_block(get("front_door"), &s, &catalog));

        let mut s2 = s.clone();
        s2.close_branches(&["back_door".to_string()]);
        assert!(canon.would_block(get("burn_bridge"), &s2, &catalog));
    }

    #[test]
    fn would_block_looks_ahead_to_later_acts() {
        let canon = manager();
        let schema = StateSchema::new();
        let catalog = BranchCatalog::new(
            vec![
                BranchDraft::new("arrive").canon("Arrival"),
                BranchDraft::new("clue").canon("FirstClue"),
                BranchDraft::new("betray").canon("Betrayal"),
                BranchDraft::new("burn_letters").closes("betray"),
            ],
            &schema,
            &canon,
        )
        .unwrap();
        let mut s = NarrativeState::new(&schema, "ACT1");
        let burn = catalog.get("burn_letters").unwrap();
        assert!(canon.would_block(burn, &s, &catalog));

        // nothing left to protect once Betrayal is behind us
        canon.mark_satisfied(&mut s, "Arrival").unwrap();
        canon.mark_satisfied(&mut s, "FirstClue").unwrap();
        canon.advance_act(&mut s).unwrap();
        canon.mark_satisfied(&mut s, "Betrayal").unwrap();
        assert!(!canon.would_block(burn, &s, &catalog));
    }
}
