use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::Condition;
use super::template::Template;
use super::value::Value;

/// A state mutation applied when a branch is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Overwrite a variable.
    Set { variable: String, value: Value },
    /// Add `delta` to a number, clamped into its declared range.
    Adjust { variable: String, delta: f64 },
    /// Add an item to a set.
    Insert { variable: String, item: String },
    /// Remove an item from a set.
    Remove { variable: String, item: String },
}

impl Effect {
    pub fn variable(&self) -> &str {
        match self {
            Self::Set { variable, .. }
            | Self::Adjust { variable, .. }
            | Self::Insert { variable, .. }
            | Self::Remove { variable, .. } => variable,
        }
    }
}

/// One possible value of a variation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub value: String,
    pub weight: u32,
    /// Trait gate; the candidate is preferred only while the gate holds.
    pub gate: Option<Condition>,
}

/// A parameterized aspect of a branch resolved at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationSlot {
    pub candidates: Vec<SlotCandidate>,
    /// Ungated value used when no candidate is viable.
    pub fallback: Option<String>,
}

impl VariationSlot {
    pub fn gates(&self) -> impl Iterator<Item = &Condition> {
        self.candidates.iter().filter_map(|c| c.gate.as_ref())
    }
}

/// A validated, pre-authored candidate story development.
///
/// Built only by `BranchCatalog`, which guarantees every reference in it
/// (parent, closes, canon event, variables, slots) resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDefinition {
    pub id: String,
    pub parent: Option<String>,
    pub canon_event: Option<String>,
    pub conditions: Vec<Condition>,
    pub responds_to: Vec<String>,
    pub repeatable: bool,
    pub closes: Vec<String>,
    pub slots: BTreeMap<String, VariationSlot>,
    pub effects: Vec<Effect>,
    pub description: Template,
    pub situation: Template,
    pub actions: Vec<Template>,
    pub twist: Option<String>,
    pub tags: Vec<String>,
}

impl BranchDefinition {
    /// Every trait gate across all slots.
    pub fn trait_gates(&self) -> impl Iterator<Item = &Condition> {
        self.slots.values().flat_map(VariationSlot::gates)
    }

    /// Whether this branch answers the given player action.
    pub fn responds_to_action(&self, action: &str) -> bool {
        self.responds_to.is_empty()
            || self
                .responds_to
                .iter()
                .any(|a| a.eq_ignore_ascii_case(action.trim()))
    }
}

fn default_weight() -> u32 {
    1
}

/// Authored form of a slot candidate: the gate is still raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDraft {
    pub value: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub gate: Option<String>,
}

impl CandidateDraft {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            weight: 1,
            gate: None,
        }
    }

    pub fn gated(value: &str, gate: &str) -> Self {
        Self {
            gate: Some(gate.to_string()),
            ..Self::new(value)
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Authored form of a variation slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub candidates: Vec<CandidateDraft>,
    #[serde(default)]
    pub fallback: Option<String>,
}

impl SlotDraft {
    pub fn new(candidates: Vec<CandidateDraft>) -> Self {
        Self {
            candidates,
            fallback: None,
        }
    }

    pub fn fallback(mut self, value: &str) -> Self {
        self.fallback = Some(value.to_string());
        self
    }
}

/// Authored, unvalidated form of a branch as it appears in a story file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchDraft {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub canon_event: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub responds_to: Vec<String>,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub closes: Vec<String>,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDraft>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub situation: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub twist: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BranchDraft {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn canon(mut self, event: &str) -> Self {
        self.canon_event = Some(event.to_string());
        self
    }

    pub fn when(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_string());
        self
    }

    pub fn responds_to(mut self, action: &str) -> Self {
        self.responds_to.push(action.to_string());
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn closes(mut self, branch: &str) -> Self {
        self.closes.push(branch.to_string());
        self
    }

    pub fn slot(mut self, name: &str, slot: SlotDraft) -> Self {
        self.slots.insert(name.to_string(), slot);
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    pub fn situation(mut self, text: &str) -> Self {
        self.situation = text.to_string();
        self
    }

    pub fn action(mut self, text: &str) -> Self {
        self.actions.push(text.to_string());
        self
    }

    pub fn twist(mut self, text: &str) -> Self {
        self.twist = Some(text.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_variable_names() {
        let effects = [
            Effect::Set {
                variable: "a".into(),
                value: Value::Bool(true),
            },
            Effect::Adjust {
                variable: "b".into(),
                delta: 1.0,
            },
            Effect::Insert {
                variable: "c".into(),
                item: "x".into(),
            },
            Effect::Remove {
                variable: "d".into(),
                item: "x".into(),
            },
        ];
        let names: Vec<&str> = effects.iter().map(Effect::variable).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn draft_builder() {
        let draft = BranchDraft::new("confront_butler")
            .parent("find_ledger")
            .canon("Betrayal")
            .when("trust_alice < 40")
            .responds_to("accuse")
            .slot(
                "location",
                SlotDraft::new(vec![
                    CandidateDraft::new("the pantry"),
                    CandidateDraft::gated("the roof", "courage > 70").weight(3),
                ])
                .fallback("the hall"),
            )
            .description("You corner him in {location}.");
        assert_eq!(draft.parent.as_deref(), Some("find_ledger"));
        assert_eq!(draft.canon_event.as_deref(), Some("Betrayal"));
        assert_eq!(draft.conditions.len(), 1);
        assert_eq!(draft.slots["location"].candidates[1].weight, 3);
        assert_eq!(draft.slots["location"].fallback.as_deref(), Some("the hall"));
    }

    #[test]
    fn draft_from_ron_uses_defaults() {
        let draft: BranchDraft = ron::from_str(
            r#"(
                id: "stroll",
                slots: {
                    "weather": (candidates: [(value: "rain"), (value: "fog", weight: 2, gate: Some("fear > 50"))]),
                },
                effects: [Adjust(variable: "fear", delta: -5.0)],
            )"#,
        )
        .unwrap();
        assert_eq!(draft.id, "stroll");
        assert!(draft.parent.is_none());
        assert!(!draft.repeatable);
        let weather = &draft.slots["weather"];
        assert_eq!(weather.candidates[0].weight, 1);
        assert_eq!(weather.candidates[1].gate.as_deref(), Some("fear > 50"));
        assert_eq!(
            draft.effects,
            vec![Effect::Adjust {
                variable: "fear".into(),
                delta: -5.0
            }]
        );
    }

    #[test]
    fn responds_to_matching() {
        let mut branch = BranchDefinition {
            id: "b".into(),
            parent: None,
            canon_event: None,
            conditions: vec![],
            responds_to: vec![],
            repeatable: false,
            closes: vec![],
            slots: BTreeMap::new(),
            effects: vec![],
            description: Template::default(),
            situation: Template::default(),
            actions: vec![],
            twist: None,
            tags: vec![],
        };
        assert!(branch.responds_to_action("anything"));
        branch.responds_to = vec!["Investigate".into()];
        assert!(branch.responds_to_action(" investigate "));
        assert!(!branch.responds_to_action("flee"));
    }
}
