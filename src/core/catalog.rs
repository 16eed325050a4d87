/// Branch catalog — load-time validation and state-dependent eligibility.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::canon::{CanonError, CanonManager};
use crate::core::state::{NarrativeState, StateError, StateSchema, VariableSource};
use crate::schema::branch::{
    BranchDefinition, BranchDraft, Effect, SlotCandidate, SlotDraft, VariationSlot,
};
use crate::schema::condition::Condition;
use crate::schema::template::Template;
use crate::schema::value::{Value, VarKind};

/// One problem found while validating a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The offending branch, or `None` for story-level problems.
    pub branch: Option<String>,
    pub message: String,
}

impl Violation {
    fn in_branch(branch: &str, message: String) -> Self {
        Self {
            branch: Some(branch.to_string()),
            message,
        }
    }

    fn in_story(message: String) -> Self {
        Self {
            branch: None,
            message,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch {
            Some(id) => write!(f, "branch '{}': {}", id, self.message),
            None => write!(f, "story: {}", self.message),
        }
    }
}

fn list_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("schema violation ({} problem(s)): {}", .0.len(), list_violations(.0))]
    SchemaViolation(Vec<Violation>),
    #[error("canon schedule error: {0}")]
    Canon(#[from] CanonError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl CatalogError {
    /// The individual violations, if this is a schema violation.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::SchemaViolation(v) => v,
            _ => &[],
        }
    }
}

/// The immutable, validated set of branch definitions for a story.
#[derive(Debug, Clone)]
pub struct BranchCatalog {
    branches: Vec<BranchDefinition>,
    index: FxHashMap<String, usize>,
    satisfiers: FxHashMap<String, Vec<usize>>,
    event_acts: FxHashMap<String, String>,
}

impl BranchCatalog {
    /// Validate and compile authored branches.
    ///
    /// Every violation across the whole catalog is collected before failing.
    pub fn new(
        drafts: Vec<BranchDraft>,
        schema: &StateSchema,
        canon: &CanonManager,
    ) -> Result<BranchCatalog, CatalogError> {
        let mut violations: Vec<Violation> =
            schema.validate().into_iter().map(Violation::in_story).collect();

        let mut seen = FxHashSet::default();
        for draft in &drafts {
            if !seen.insert(draft.id.as_str()) {
                violations.push(Violation::in_branch(&draft.id, "duplicate branch id".to_string()));
            }
        }

        let mut validator = Validator {
            schema,
            canon,
            ids: seen,
            violations: Vec::new(),
        };
        let branches: Vec<BranchDefinition> =
            drafts.iter().map(|draft| validator.compile(draft)).collect();
        violations.append(&mut validator.violations);

        let mut index = FxHashMap::default();
        for (pos, branch) in branches.iter().enumerate() {
            index.entry(branch.id.clone()).or_insert(pos);
        }

        violations.extend(find_parent_cycles(&branches, &index));

        let mut satisfiers: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (pos, branch) in branches.iter().enumerate() {
            if let Some(event) = &branch.canon_event {
                satisfiers.entry(event.clone()).or_default().push(pos);
            }
        }

        let mut event_acts = FxHashMap::default();
        for act in canon.acts() {
            for event in &act.canon {
                if !satisfiers.contains_key(event) {
                    violations.push(Violation::in_story(format!(
                        "canon event '{}' of act '{}' has no branch that satisfies it",
                        event, act.id
                    )));
                }
                event_acts.insert(event.clone(), act.id.clone());
            }
        }

        if !violations.is_empty() {
            warn!(count = violations.len(), "branch catalog failed validation");
            return Err(CatalogError::SchemaViolation(violations));
        }

        debug!(branches = branches.len(), "branch catalog loaded");
        Ok(BranchCatalog {
            branches,
            index,
            satisfiers,
            event_acts,
        })
    }

    /// Load and validate a RON list of branches.
    pub fn load_from_ron(
        path: &Path,
        schema: &StateSchema,
        canon: &CanonManager,
    ) -> Result<BranchCatalog, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents, schema, canon)
    }

    pub fn parse_ron(
        input: &str,
        schema: &StateSchema,
        canon: &CanonManager,
    ) -> Result<BranchCatalog, CatalogError> {
        let drafts: Vec<BranchDraft> = ron::from_str(input)?;
        Self::new(drafts, schema, canon)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// All branches in authoring order.
    pub fn iter(&self) -> impl Iterator<Item = &BranchDefinition> {
        self.branches.iter()
    }

    pub fn get(&self, id: &str) -> Option<&BranchDefinition> {
        self.index.get(id).map(|&pos| &self.branches[pos])
    }

    /// Authoring position of a branch.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Branches that can satisfy a canon event, in authoring order.
    pub fn satisfiers<'a>(&'a self, event: &str) -> impl Iterator<Item = &'a BranchDefinition> + 'a {
        self.satisfiers
            .get(event)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&pos| &self.branches[pos])
    }

    /// Every branch that may be offered in `state`, in authoring order.
    ///
    /// A branch is eligible when it is live (not consumed, not closed,
    /// parent already visited), any canon event it carries is still owed
    /// in the current act, and every condition holds.
    pub fn eligible(&self, state: &NarrativeState) -> Result<Vec<&BranchDefinition>, StateError> {
        if state.is_story_complete() {
            return Ok(Vec::new());
        }
        let mut eligible = Vec::new();
        for branch in &self.branches {
            if !self.is_live(branch, state) || !self.canon_is_owed(branch, state) {
                continue;
            }
            if self.conditions_hold(branch, state)? {
                eligible.push(branch);
            }
        }
        Ok(eligible)
    }

    /// `eligible`, narrowed to branches answering the player action.
    pub fn eligible_for(
        &self,
        state: &NarrativeState,
        action: &str,
    ) -> Result<Vec<&BranchDefinition>, StateError> {
        Ok(self
            .eligible(state)?
            .into_iter()
            .filter(|b| b.responds_to_action(action))
            .collect())
    }

    fn conditions_hold(&self, branch: &BranchDefinition, state: &NarrativeState) -> Result<bool, StateError> {
        for condition in &branch.conditions {
            if !state.eval(condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn canon_is_owed(&self, branch: &BranchDefinition, state: &NarrativeState) -> bool {
        match &branch.canon_event {
            None => true,
            Some(event) => {
                self.event_acts.get(event).map(String::as_str) == Some(state.act())
                    && !state.triggered_events().contains(event)
            }
        }
    }

    /// Whether the branch can be offered right now, ignoring conditions.
    pub fn is_live(&self, branch: &BranchDefinition, state: &NarrativeState) -> bool {
        let parent_visited = branch
            .parent
            .as_ref()
            .map_or(true, |p| state.visited_branches().contains(p));
        parent_visited && self.can_still_commit(&branch.id, state, None)
    }

    /// Whether the branch could still be committed at some future point,
    /// optionally assuming `committed` is committed first.
    ///
    /// A branch is unreachable once it is closed or consumed, or when an
    /// ancestor that was never visited has itself become unreachable.
    pub fn can_still_commit(
        &self,
        id: &str,
        state: &NarrativeState,
        committed: Option<&BranchDefinition>,
    ) -> bool {
        let visited = |id: &str| {
            state.visited_branches().contains(id) || committed.is_some_and(|c| c.id == id)
        };
        let closed = |id: &str| {
            state.closed_branches().contains(id)
                || committed.is_some_and(|c| c.closes.iter().any(|x| x == id))
        };

        let mut current = id;
        let mut is_target = true;
        for _ in 0..=self.branches.len() {
            let Some(branch) = self.get(current) else {
                return false;
            };
            if !is_target && visited(current) {
                return true;
            }
            if closed(current) || (visited(current) && !branch.repeatable) {
                return false;
            }
            match &branch.parent {
                None => return true,
                Some(parent) => {
                    current = parent.as_str();
                    is_target = false;
                }
            }
        }
        false
    }
}

struct Validator<'a> {
    schema: &'a StateSchema,
    canon: &'a CanonManager,
    ids: FxHashSet<&'a str>,
    violations: Vec<Violation>,
}

impl<'a> Validator<'a> {
    fn flag(&mut self, branch: &str, message: String) {
        self.violations.push(Violation::in_branch(branch, message));
    }

    fn compile(&mut self, draft: &BranchDraft) -> BranchDefinition {
        let id = draft.id.as_str();

        if let Some(parent) = &draft.parent {
            if parent == id {
                self.flag(id, "branch is its own parent".to_string());
            } else if !self.ids.contains(parent.as_str()) {
                self.flag(id, format!("parent '{}' does not exist", parent));
            }
        }
        for closed in &draft.closes {
            if !self.ids.contains(closed.as_str()) {
                self.flag(id, format!("closes unknown branch '{}'", closed));
            }
        }
        if let Some(event) = &draft.canon_event {
            if !self.canon.contains_event(event) {
                self.flag(id, format!("canon event '{}' is not in the canon schedule", event));
            }
        }

        let conditions = draft
            .conditions
            .iter()
            .filter_map(|text| self.condition(id, text))
            .collect();

        let slots: BTreeMap<String, VariationSlot> = draft
            .slots
            .iter()
            .map(|(name, slot)| (name.clone(), self.slot(id, name, slot)))
            .collect();

        for effect in &draft.effects {
            self.effect(id, effect);
        }

        let description = self.template(id, &draft.description, &slots);
        let situation = self.template(id, &draft.situation, &slots);
        let actions = draft
            .actions
            .iter()
            .map(|text| self.template(id, text, &slots))
            .collect();

        BranchDefinition {
            id: draft.id.clone(),
            parent: draft.parent.clone(),
            canon_event: draft.canon_event.clone(),
            conditions,
            responds_to: draft.responds_to.clone(),
            repeatable: draft.repeatable,
            closes: draft.closes.clone(),
            slots,
            effects: draft.effects.clone(),
            description,
            situation,
            actions,
            twist: draft.twist.clone(),
            tags: draft.tags.clone(),
        }
    }

    fn condition(&mut self, branch: &str, text: &str) -> Option<Condition> {
        let condition = match Condition::parse(text) {
            Ok(c) => c,
            Err(e) => {
                self.flag(branch, e.to_string());
                return None;
            }
        };
        match self.schema.kind_of(&condition.variable) {
            None => {
                self.flag(
                    branch,
                    format!(
                        "condition '{}' references undeclared variable '{}'",
                        text, condition.variable
                    ),
                );
                None
            }
            Some(kind) => match condition.check(kind) {
                Ok(()) => Some(condition),
                Err(e) => {
                    self.flag(branch, format!("condition '{}': {}", text, e));
                    None
                }
            },
        }
    }

    fn slot(&mut self, branch: &str, name: &str, draft: &SlotDraft) -> VariationSlot {
        if draft.candidates.is_empty() {
            self.flag(branch, format!("slot '{}' has no candidates", name));
        } else if draft.candidates.iter().all(|c| c.weight == 0) {
            self.flag(branch, format!("slot '{}' has only zero-weight candidates", name));
        }

        let mut candidates = Vec::with_capacity(draft.candidates.len());
        for candidate in &draft.candidates {
            let gate = match &candidate.gate {
                None => None,
                Some(text) => {
                    let gate = self.condition(branch, text);
                    if let Some(g) = &gate {
                        let is_trait = self.schema.decl(&g.variable).is_some_and(|d| d.is_trait);
                        if !is_trait {
                            self.flag(
                                branch,
                                format!(
                                    "gate '{}' in slot '{}' must reference a trait, not '{}'",
                                    text, name, g.variable
                                ),
                            );
                        }
                    }
                    gate
                }
            };
            candidates.push(SlotCandidate {
                value: candidate.value.clone(),
                weight: candidate.weight,
                gate,
            });
        }

        VariationSlot {
            candidates,
            fallback: draft.fallback.clone(),
        }
    }

    fn effect(&mut self, branch: &str, effect: &Effect) {
        let variable = effect.variable();
        if StateSchema::is_reserved(variable) {
            self.flag(branch, format!("effect writes read-only variable '{}'", variable));
            return;
        }
        let Some(decl) = self.schema.decl(variable) else {
            self.flag(branch, format!("effect references undeclared variable '{}'", variable));
            return;
        };
        let expected = match effect {
            Effect::Set { value, .. } => {
                if let Value::Number(n) = value {
                    if decl.kind == VarKind::Number && !decl.contains(*n) {
                        self.flag(
                            branch,
                            format!("effect sets '{}' to {} outside its range", variable, n),
                        );
                    }
                }
                value.kind()
            }
            Effect::Adjust { .. } => VarKind::Number,
            Effect::Insert { .. } | Effect::Remove { .. } => VarKind::Set,
        };
        if expected != decl.kind {
            self.flag(
                branch,
                format!(
                    "effect on '{}' needs a {} variable but it is declared {}",
                    variable, expected, decl.kind
                ),
            );
        }
    }

    fn template(
        &mut self,
        branch: &str,
        text: &str,
        slots: &BTreeMap<String, VariationSlot>,
    ) -> Template {
        match Template::parse(text) {
            Ok(template) => {
                let missing: Vec<String> = template
                    .slot_refs()
                    .filter(|name| !slots.contains_key(*name))
                    .map(str::to_string)
                    .collect();
                for name in missing {
                    self.flag(branch, format!("template references undeclared slot '{}'", name));
                }
                template
            }
            Err(e) => {
                self.flag(branch, e.to_string());
                Template::default()
            }
        }
    }
}

fn find_parent_cycles(
    branches: &[BranchDefinition],
    index: &FxHashMap<String, usize>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for branch in branches {
        let mut seen = FxHashSet::default();
        let mut current = branch.parent.as_deref();
        while let Some(id) = current {
            if id == branch.id {
                violations.push(Violation::in_branch(
                    &branch.id,
                    "parent chain forms a cycle".to_string(),
                ));
                break;
            }
            if !seen.insert(id) {
                break;
            }
            current = index.get(id).and_then(|&pos| branches[pos].parent.as_deref());
        }
    }
    violations
}
