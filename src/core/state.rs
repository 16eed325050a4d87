/// State store — declared narrative variables, typed access, condition
/// evaluation and effect application.

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::core::chronicle::Chronicle;
use crate::schema::branch::Effect;
use crate::schema::condition::Condition;
use crate::schema::value::{Value, VarDecl, VarKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("malformed condition '{text}': {reason}")]
    MalformedCondition { text: String, reason: String },
    #[error("type mismatch on '{variable}': expected {expected}, found {found}")]
    TypeMismatch {
        variable: String,
        expected: String,
        found: String,
    },
    #[error("variable '{0}' is read-only")]
    ReadOnlyVariable(String),
    #[error("value {value} for '{variable}' is outside its range [{min}, {max}]")]
    OutOfRange {
        variable: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Engine-maintained variables that conditions may read but nothing may
/// declare or `set`.
pub const RESERVED_VARIABLES: &[(&str, VarKind)] = &[
    ("act", VarKind::String),
    ("turn", VarKind::Number),
    ("turns_in_act", VarKind::Number),
    ("triggered_events", VarKind::Set),
    ("visited_branches", VarKind::Set),
];

fn reserved_kind(name: &str) -> Option<VarKind> {
    RESERVED_VARIABLES
        .iter()
        .find(|(reserved, _)| *reserved == name)
        .map(|(_, kind)| *kind)
}

/// Anything conditions can be evaluated against.
pub trait VariableSource {
    fn lookup(&self, name: &str) -> Result<Cow<'_, Value>, StateError>;

    fn eval(&self, condition: &Condition) -> Result<bool, StateError> {
        let value = self.lookup(&condition.variable)?;
        condition.evaluate(&value)
    }
}

/// The declared variables of a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSchema {
    pub variables: BTreeMap<String, VarDecl>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, name: &str, decl: VarDecl) -> Self {
        self.variables.insert(name.to_string(), decl);
        self
    }

    /// Kind of a declared or reserved variable.
    pub fn kind_of(&self, name: &str) -> Option<VarKind> {
        reserved_kind(name).or_else(|| self.variables.get(name).map(|d| d.kind))
    }

    pub fn decl(&self, name: &str) -> Option<&VarDecl> {
        self.variables.get(name)
    }

    pub fn is_reserved(name: &str) -> bool {
        reserved_kind(name).is_some()
    }

    pub fn traits(&self) -> impl Iterator<Item = (&String, &VarDecl)> {
        self.variables.iter().filter(|(_, d)| d.is_trait)
    }

    /// Problems with the declarations themselves, one message each.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, decl) in &self.variables {
            if Self::is_reserved(name) {
                problems.push(format!("variable '{}' uses a reserved name", name));
            }
            if let Some(default) = &decl.default {
                if default.kind() != decl.kind {
                    problems.push(format!(
                        "variable '{}' is declared {} but its default is {}",
                        name,
                        decl.kind,
                        default.kind()
                    ));
                }
            }
            if let Some((min, max)) = decl.range {
                if decl.kind != VarKind::Number {
                    problems.push(format!("variable '{}' has a range but is not a number", name));
                } else if min > max {
                    problems.push(format!("variable '{}' has an empty range [{}, {}]", name, min, max));
                } else if let Some(Value::Number(n)) = &decl.default {
                    if !decl.contains(*n) {
                        problems.push(format!(
                            "variable '{}' default {} lies outside [{}, {}]",
                            name, n, min, max
                        ));
                    }
                }
            }
            if decl.is_trait && decl.kind != VarKind::Number {
                problems.push(format!("trait '{}' must be a number", name));
            }
        }
        problems
    }
}

/// Numeric trait values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitSnapshot {
    values: BTreeMap<String, f64>,
}

impl TraitSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }
}

impl VariableSource for TraitSnapshot {
    fn lookup(&self, name: &str) -> Result<Cow<'_, Value>, StateError> {
        self.get(name)
            .map(|n| Cow::Owned(Value::Number(n)))
            .ok_or_else(|| StateError::UnknownVariable(name.to_string()))
    }
}

/// The mutable state of one narrative session.
///
/// Carries its own declarations so a snapshot is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeState {
    act: String,
    turn: u64,
    turns_in_act: u64,
    declarations: BTreeMap<String, VarDecl>,
    variables: BTreeMap<String, Value>,
    triggered_events: BTreeSet<String>,
    visited_branches: BTreeSet<String>,
    closed_branches: BTreeSet<String>,
    completed_acts: Vec<String>,
    story_complete: bool,
    chronicle: Chronicle,
}

impl NarrativeState {
    /// A fresh session at the start of `first_act`, every variable at its
    /// declared default.
    pub fn new(schema: &StateSchema, first_act: &str) -> Self {
        let variables = schema
            .variables
            .iter()
            .map(|(name, decl)| (name.clone(), decl.initial_value()))
            .collect();
        Self {
            act: first_act.to_string(),
            turn: 0,
            turns_in_act: 0,
            declarations: schema.variables.clone(),
            variables,
            triggered_events: BTreeSet::new(),
            visited_branches: BTreeSet::new(),
            closed_branches: BTreeSet::new(),
            completed_acts: Vec::new(),
            story_complete: false,
            chronicle: Chronicle::default(),
        }
    }

    pub fn act(&self) -> &str {
        &self.act
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn turns_in_act(&self) -> u64 {
        self.turns_in_act
    }

    pub fn triggered_events(&self) -> &BTreeSet<String> {
        &self.triggered_events
    }

    pub fn visited_branches(&self) -> &BTreeSet<String> {
        &self.visited_branches
    }

    pub fn closed_branches(&self) -> &BTreeSet<String> {
        &self.closed_branches
    }

    pub fn completed_acts(&self) -> &[String] {
        &self.completed_acts
    }

    pub fn is_story_complete(&self) -> bool {
        self.story_complete
    }

    pub fn chronicle(&self) -> &Chronicle {
        &self.chronicle
    }

    /// Read a declared or reserved variable.
    pub fn get(&self, name: &str) -> Result<Value, StateError> {
        self.lookup(name).map(Cow::into_owned)
    }

    /// Write a declared variable, type- and range-checked.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), StateError> {
        if StateSchema::is_reserved(name) {
            return Err(StateError::ReadOnlyVariable(name.to_string()));
        }
        let decl = self
            .declarations
            .get(name)
            .ok_or_else(|| StateError::UnknownVariable(name.to_string()))?;
        if value.kind() != decl.kind {
            return Err(StateError::TypeMismatch {
                variable: name.to_string(),
                expected: decl.kind.name().to_string(),
                found: value.kind().name().to_string(),
            });
        }
        if let (Value::Number(n), Some((min, max))) = (&value, decl.range) {
            if !decl.contains(*n) {
                return Err(StateError::OutOfRange {
                    variable: name.to_string(),
                    value: *n,
                    min,
                    max,
                });
            }
        }
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    /// Parse and evaluate a condition string against the current state.
    pub fn eval_condition(&self, condition: &str) -> Result<bool, StateError> {
        let parsed = Condition::parse(condition)?;
        self.eval(&parsed)
    }

    /// Current values of every trait-flagged variable.
    pub fn trait_snapshot(&self) -> TraitSnapshot {
        let mut snapshot = TraitSnapshot::new();
        for (name, decl) in &self.declarations {
            if !decl.is_trait {
                continue;
            }
            if let Some(Value::Number(n)) = self.variables.get(name) {
                snapshot = snapshot.with(name, *n);
            }
        }
        snapshot
    }

    /// Apply one outcome effect. Adjustments clamp into the declared range.
    pub fn apply_effect(&mut self, effect: &Effect) -> Result<(), StateError> {
        match effect {
            Effect::Set { variable, value } => self.set(variable, value.clone()),
            Effect::Adjust { variable, delta } => {
                let current = self.expect_kind(variable, VarKind::Number)?;
                let n = current.as_number().unwrap_or_default() + delta;
                let clamped = self.declarations.get(variable).map_or(n, |d| d.clamp(n));
                self.set(variable, Value::Number(clamped))
            }
            Effect::Insert { variable, item } | Effect::Remove { variable, item } => {
                let current = self.expect_kind(variable, VarKind::Set)?;
                let mut items = current.as_set().cloned().unwrap_or_default();
                if matches!(effect, Effect::Insert { .. }) {
                    items.insert(item.clone());
                } else {
                    items.remove(item);
                }
                self.set(variable, Value::Set(items))
            }
        }
    }

    fn expect_kind(&self, name: &str, kind: VarKind) -> Result<Value, StateError> {
        let current = self.get(name)?;
        if current.kind() != kind {
            return Err(StateError::TypeMismatch {
                variable: name.to_string(),
                expected: kind.name().to_string(),
                found: current.kind().name().to_string(),
            });
        }
        Ok(current)
    }

    /// Stable hash of everything selection and variation depend on.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.act.hash(&mut hasher);
        self.turn.hash(&mut hasher);
        self.turns_in_act.hash(&mut hasher);
        for (name, value) in &self.variables {
            name.hash(&mut hasher);
            hash_value(value, &mut hasher);
        }
        self.triggered_events.hash(&mut hasher);
        self.visited_branches.hash(&mut hasher);
        self.closed_branches.hash(&mut hasher);
        self.completed_acts.hash(&mut hasher);
        self.story_complete.hash(&mut hasher);
        self.chronicle.len().hash(&mut hasher);
        self.chronicle.branching_factor().to_bits().hash(&mut hasher);
        hasher.finish()
    }

    pub(crate) fn record_triggered(&mut self, event_id: &str) -> bool {
        self.triggered_events.insert(event_id.to_string())
    }

    pub(crate) fn enter_act(&mut self, next: &str) {
        let finished = std::mem::replace(&mut self.act, next.to_string());
        self.completed_acts.push(finished);
        self.triggered_events.clear();
        self.turns_in_act = 0;
    }

    pub(crate) fn finish_story(&mut self) {
        if !self.story_complete {
            self.completed_acts.push(self.act.clone());
            self.story_complete = true;
        }
    }

    pub(crate) fn record_visit(&mut self, branch_id: &str) {
        self.visited_branches.insert(branch_id.to_string());
    }

    pub(crate) fn close_branches(&mut self, ids: &[String]) {
        self.closed_branches.extend(ids.iter().cloned());
    }

    pub(crate) fn chronicle_mut(&mut self) -> &mut Chronicle {
        &mut self.chronicle
    }

    pub(crate) fn advance_turn(&mut self) {
        self.turn += 1;
        self.turns_in_act += 1;
    }
}

impl VariableSource for NarrativeState {
    fn lookup(&self, name: &str) -> Result<Cow<'_, Value>, StateError> {
        match name {
            "act" => Ok(Cow::Owned(Value::String(self.act.clone()))),
            "turn" => Ok(Cow::Owned(Value::Number(self.turn as f64))),
            "turns_in_act" => Ok(Cow::Owned(Value::Number(self.turns_in_act as f64))),
            "triggered_events" => Ok(Cow::Owned(Value::Set(self.triggered_events.clone()))),
            "visited_branches" => Ok(Cow::Owned(Value::Set(self.visited_branches.clone()))),
            _ => self
                .variables
                .get(name)
                .map(Cow::Borrowed)
                .ok_or_else(|| StateError::UnknownVariable(name.to_string())),
        }
    }
}

fn hash_value<H: Hasher>(value: &Value, hasher: &mut H) {
    match value {
        Value::Number(n) => {
            0u8.hash(hasher);
            n.to_bits().hash(hasher);
        }
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::String(s) => {
            2u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Set(items) => {
            3u8.hash(hasher);
            items.hash(hasher);
        }
    }
}
