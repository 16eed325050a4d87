/// Heuristic selector — ranks eligible branches into canon, trait-match and
/// momentum tiers.

use std::cmp::Reverse;
use tracing::debug;

use crate::core::canon::CanonManager;
use crate::core::catalog::BranchCatalog;
use crate::core::config::EngineConfig;
use crate::core::state::{NarrativeState, TraitSnapshot, VariableSource};
use crate::schema::branch::BranchDefinition;
use crate::schema::development::SelectionTier;

/// A branch with the tier that admitted it and its trait score.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub branch: &'a BranchDefinition,
    pub tier: SelectionTier,
    pub score: u32,
}

/// Pure ranking over a shared canon schedule and catalog.
pub struct HeuristicSelector<'a> {
    canon: &'a CanonManager,
    catalog: &'a BranchCatalog,
    max_choices: usize,
    deadline: Option<u32>,
}

impl<'a> HeuristicSelector<'a> {
    pub fn new(canon: &'a CanonManager, catalog: &'a BranchCatalog, config: &EngineConfig) -> Self {
        Self {
            canon,
            catalog,
            max_choices: config.max_choices,
            deadline: config.force_canon_after_turns,
        }
    }

    /// Number of the branch's trait gates that hold for `traits`.
    ///
    /// A gate that cannot be evaluated counts as unmatched.
    pub fn trait_score(branch: &BranchDefinition, traits: &TraitSnapshot) -> u32 {
        branch
            .trait_gates()
            .filter(|gate| traits.eval(gate).unwrap_or(false))
            .count() as u32
    }

    /// The full ranking of `eligible`, best first.
    ///
    /// On a forced turn, branches satisfying outstanding canon take over the
    /// whole ranking; without any, branches that would strand outstanding
    /// canon are vetoed. Otherwise branches sort by descending trait score
    /// with catalog order breaking ties.
    pub fn rank(
        &self,
        eligible: &[&'a BranchDefinition],
        state: &NarrativeState,
        traits: &TraitSnapshot,
    ) -> Vec<Ranked<'a>> {
        let forced = self.canon.is_forced_turn(state, self.deadline);

        if forced {
            let outstanding = self.canon.outstanding_current(state);
            let canon_tier: Vec<Ranked<'a>> = eligible
                .iter()
                .filter(|b| {
                    b.canon_event
                        .as_deref()
                        .is_some_and(|e| outstanding.contains(&e))
                })
                .map(|&branch| Ranked {
                    branch,
                    tier: SelectionTier::Canon,
                    score: Self::trait_score(branch, traits),
                })
                .collect();
            if !canon_tier.is_empty() {
                debug!(
                    act = state.act(),
                    turns_in_act = state.turns_in_act(),
                    candidates = canon_tier.len(),
                    "forced canon turn"
                );
                return canon_tier;
            }
        }

        let mut ranked: Vec<Ranked<'a>> = eligible
            .iter()
            .filter(|b| !(forced && self.canon.would_block(b, state, self.catalog)))
            .map(|&branch| {
                let score = Self::trait_score(branch, traits);
                Ranked {
                    branch,
                    tier: if score > 0 {
                        SelectionTier::TraitMatch
                    } else {
                        SelectionTier::Momentum
                    },
                    score,
                }
            })
            .collect();
        ranked.sort_by_key(|r| Reverse(r.score));

        debug!(
            eligible = eligible.len(),
            vetoed = eligible.len() - ranked.len(),
            trait_matched = ranked.iter().filter(|r| r.score > 0).count(),
            forced,
            "branches ranked"
        );
        ranked
    }

    /// The top `max_choices` of the ranking.
    pub fn select(
        &self,
        eligible: &[&'a BranchDefinition],
        state: &NarrativeState,
        traits: &TraitSnapshot,
    ) -> Vec<Ranked<'a>> {
        let mut ranked = self.rank(eligible, state, traits);
        ranked.truncate(self.max_choices);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StateSchema;
    use crate::schema::branch::{BranchDraft, CandidateDraft, SlotDraft};
    use crate::schema::canon::ActDefinition;
    use crate::schema::value::VarDecl;

    struct Fixture {
        schema: StateSchema,
        canon: CanonManager,
        catalog: BranchCatalog,
    }

    fn fixture() -> Fixture {
        let schema = StateSchema::new()
            .declare("courage", VarDecl::trait_score(80.0, 0.0, 100.0))
            .declare("fear", VarDecl::trait_score(10.0, 0.0, 100.0));
        let canon = CanonManager::new(vec![
            ActDefinition::new("ACT1", &["Arrival"]),
            ActDefinition::new("ACT2", &["Betrayal"]),
        ])
        .unwrap();
        let gated = |id: &str, gate: &str| {
            BranchDraft::new(id).slot(
                "mood",
                SlotDraft::new(vec![CandidateDraft::gated("bold", gate)]).fallback("flat"),
            )
        };
        let catalog = BranchCatalog::new(
            vec![
                BranchDraft::new("arrive").canon("Arrival"),
                BranchDraft::new("betray").canon("Betrayal"),
                BranchDraft::new("plain_a"),
                gated("timid", "fear > 50"),
                gated("brave", "courage > 70"),
                BranchDraft::new("plain_b"),
                BranchDraft::new("burn_letters").closes("betray"),
            ],
            &schema,
            &canon,
        )
        .unwrap();
        Fixture {
            schema,
            canon,
            catalog,
        }
    }

    fn ids(ranked: &[Ranked<'_>]) -> Vec<String> {
        ranked.iter().map(|r| r.branch.id.clone()).collect()
    }

    #[test]
    fn trait_match_ranks_first() {
        let f = fixture();
        let config = EngineConfig::default();
        let selector = HeuristicSelector::new(&f.canon, &f.catalog, &config);
        let state = NarrativeState::new(&f.schema, "ACT1");
        let eligible = f.catalog.eligible(&state).unwrap();
        let ranked = selector.select(&eligible, &state, &state.trait_snapshot());

        assert_eq!(ids(&ranked), vec!["brave", "arrive", "plain_a"]);
        assert_eq!(ranked[0].tier, SelectionTier::TraitMatch);
        assert_eq!(ranked[0].score, 1);
        assert_eq!(ranked[1].tier, SelectionTier::Momentum);
    }

    #[test]
    fn forced_canon_fully_determines_output() {
        let f = fixture();
        let config = EngineConfig {
            force_canon_after_turns: Some(0),
            ..EngineConfig::default()
        };
        let selector = HeuristicSelector::new(&f.canon, &f.catalog, &config);
        let mut state = NarrativeState::new(&f.schema, "ACT1");
        f.canon.mark_satisfied(&mut state, "Arrival").unwrap();
        f.canon.advance_act(&mut state).unwrap();

        let eligible = f.catalog.eligible(&state).unwrap();
        let ranked = selector.select(&eligible, &state, &state.trait_snapshot());
        assert_eq!(ids(&ranked), vec!["betray"]);
        assert_eq!(ranked[0].tier, SelectionTier::Canon);
    }

    #[test]
    fn not_forced_without_deadline() {
        let f = fixture();
        let config = EngineConfig::default();
        let selector = HeuristicSelector::new(&f.canon, &f.catalog, &config);
        let state = NarrativeState::new(&f.schema, "ACT1");
        let eligible = f.catalog.eligible(&state).unwrap();
        let ranked = selector.rank(&eligible, &state, &state.trait_snapshot());
        assert_eq!(ranked.len(), eligible.len());
        assert!(ranked.iter().all(|r| r.tier != SelectionTier::Canon));
    }

    #[test]
    fn forced_turn_vetoes_blocking_branches() {
        let f = fixture();
        let config = EngineConfig {
            force_canon_after_turns: Some(0),
            ..EngineConfig::default()
        };
        let selector = HeuristicSelector::new(&f.canon, &f.catalog, &config);
        let mut state = NarrativeState::new(&f.schema, "ACT1");
        f.canon.mark_satisfied(&mut state, "Arrival").unwrap();
        f.canon.advance_act(&mut state).unwrap();

        // betray is outstanding but not offered: its tier is empty
        let eligible: Vec<&BranchDefinition> = f
            .catalog
            .eligible(&state)
            .unwrap()
            .into_iter()
            .filter(|b| b.id != "betray")
            .collect();
        let ranked = selector.rank(&eligible, &state, &state.trait_snapshot());
        assert!(!ids(&ranked).contains(&"burn_letters".to_string()));
        assert_eq!(ranked.len(), eligible.len() - 1);
    }

    #[test]
    fn ranking_is_deterministic() {
        let f = fixture();
        let config = EngineConfig::default();
        let selector = HeuristicSelector::new(&f.canon, &f.catalog, &config);
        let state = NarrativeState::new(&f.schema, "ACT1");
        let eligible = f.catalog.eligible(&state).unwrap();
        let traits = state.trait_snapshot();
        let first = ids(&selector.rank(&eligible, &state, &traits));
        for _ in 0..10 {
            assert_eq!(ids(&selector.rank(&eligible, &state, &traits)), first);
        }
    }
}
