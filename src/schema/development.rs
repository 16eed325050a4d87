use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which selector tier admitted a development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionTier {
    /// Forced: satisfies an outstanding canon event past the deadline.
    Canon,
    /// At least one trait gate matched the trait snapshot.
    TraitMatch,
    /// Catalog-order fallback.
    Momentum,
}

/// An action the player may take after this development.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleAction {
    pub text: String,
    pub impact: f64,
}

/// A proposed next development, valid for one turn only.
///
/// Handed to the text-generation collaborator as-is; the engine never
/// persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDevelopment {
    /// Position in the proposal this development came from.
    pub index: usize,
    /// Size of that proposal.
    pub offered: usize,
    pub branch_id: String,
    pub tier: SelectionTier,
    pub score: u32,
    pub canon_event: Option<String>,
    pub variations: BTreeMap<String, String>,
    pub description: String,
    pub situation: String,
    pub twist: Option<String>,
    pub possible_actions: Vec<PossibleAction>,
    pub tags: Vec<String>,
    pub player_action: String,
    /// Fingerprint of the state this was proposed against.
    pub state_fingerprint: u64,
}

impl CandidateDevelopment {
    pub fn is_canon(&self) -> bool {
        self.canon_event.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
