/// Variation generator — resolves each slot of a branch to a concrete value
/// using a seeded, reproducible random stream.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tracing::warn;

use crate::core::config::SeedStrategy;
use crate::core::state::{NarrativeState, TraitSnapshot, VariableSource};
use crate::schema::branch::{BranchDefinition, SlotCandidate, VariationSlot};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariationError {
    #[error("no viable variation for slot '{slot}' of branch '{branch}'")]
    NoViableVariation { branch: String, slot: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariationGenerator {
    base_seed: u64,
}

impl VariationGenerator {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    /// A generator for one proposal: the same state, strategy and action
    /// always yield the same seed.
    pub fn for_turn(strategy: SeedStrategy, state: &NarrativeState, action: &str) -> Self {
        let mut hasher = FxHasher::default();
        match strategy {
            SeedStrategy::FromState => state.fingerprint().hash(&mut hasher),
            SeedStrategy::Fixed(seed) => {
                seed.hash(&mut hasher);
                state.turn().hash(&mut hasher);
            }
        }
        action.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Seed of the independent stream used for one branch.
    pub fn branch_seed(&self, branch_id: &str) -> u64 {
        let mut hasher = FxHasher::default();
        branch_id.hash(&mut hasher);
        self.base_seed ^ hasher.finish()
    }

    /// Resolve every slot of `branch`, in slot-name order.
    pub fn resolve(
        &self,
        branch: &BranchDefinition,
        traits: &TraitSnapshot,
    ) -> Result<BTreeMap<String, String>, VariationError> {
        let mut rng = StdRng::seed_from_u64(self.branch_seed(&branch.id));
        let mut resolved = BTreeMap::new();
        for (name, slot) in &branch.slots {
            let value = resolve_slot(&branch.id, name, slot, traits, &mut rng)?;
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }
}

fn resolve_slot(
    branch: &str,
    name: &str,
    slot: &VariationSlot,
    traits: &TraitSnapshot,
    rng: &mut StdRng,
) -> Result<String, VariationError> {
    let gated: Vec<&SlotCandidate> = slot
        .candidates
        .iter()
        .filter(|c| {
            c.gate
                .as_ref()
                .is_some_and(|gate| traits.eval(gate).unwrap_or(false))
        })
        .collect();
    let pool: Vec<&SlotCandidate> = if gated.is_empty() {
        slot.candidates.iter().filter(|c| c.gate.is_none()).collect()
    } else {
        gated
    };

    if pool.is_empty() {
        return match &slot.fallback {
            Some(fallback) => {
                warn!(branch, slot = name, "no viable candidate, using fallback");
                Ok(fallback.clone())
            }
            None => Err(VariationError::NoViableVariation {
                branch: branch.to_string(),
                slot: name.to_string(),
            }),
        };
    }

    let weights: Vec<u32> = pool.iter().map(|c| c.weight).collect();
    let pick = match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..pool.len()),
    };
    Ok(pool[pick].value.clone())
}
