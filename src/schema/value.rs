use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The declared kind of a narrative variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarKind {
    Number,
    Bool,
    String,
    Set,
}

impl VarKind {
    /// Lowercase name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Set => "set",
        }
    }

    /// The starting value of an undeclared-default variable of this kind.
    pub fn zero(&self) -> Value {
        match self {
            Self::Number => Value::Number(0.0),
            Self::Bool => Value::Bool(false),
            Self::String => Value::String(String::new()),
            Self::Set => Value::Set(BTreeSet::new()),
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamic value stored in the narrative state.
///
/// Sets are ordered so that snapshots hash and serialize identically
/// across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Bool(bool),
    String(String),
    Set(BTreeSet<String>),
}

impl Value {
    pub fn kind(&self) -> VarKind {
        match self {
            Self::Number(_) => VarKind::Number,
            Self::Bool(_) => VarKind::Bool,
            Self::String(_) => VarKind::String,
            Self::Set(_) => VarKind::Set,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Build a set value from anything yielding string-like items.
    pub fn set_of<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Set(items) => {
                let joined: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

/// Declaration of a narrative variable: its kind, starting value, valid
/// domain, and whether it is a character trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub kind: VarKind,
    #[serde(default)]
    pub default: Option<Value>,
    /// Inclusive `(min, max)` domain for numbers.
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    #[serde(default)]
    pub is_trait: bool,
}

impl VarDecl {
    pub fn new(kind: VarKind) -> Self {
        Self {
            kind,
            default: None,
            range: None,
            is_trait: false,
        }
    }

    pub fn number(default: f64) -> Self {
        Self::new(VarKind::Number).with_default(Value::Number(default))
    }

    /// A trait: a numeric character attribute that also gates variations.
    pub fn trait_score(default: f64, min: f64, max: f64) -> Self {
        Self::number(default).with_range(min, max).as_trait()
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn as_trait(mut self) -> Self {
        self.is_trait = true;
        self
    }

    /// Whether `n` lies inside the declared domain (always true without one).
    pub fn contains(&self, n: f64) -> bool {
        match self.range {
            Some((min, max)) => n >= min && n <= max,
            None => true,
        }
    }

    pub fn clamp(&self, n: f64) -> f64 {
        match self.range {
            Some((min, max)) => n.clamp(min, max),
            None => n,
        }
    }

    /// The value a fresh session starts with.
    pub fn initial_value(&self) -> Value {
        match self.default.clone().unwrap_or_else(|| self.kind.zero()) {
            Value::Number(n) => Value::Number(self.clamp(n)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_values() {
        assert_eq!(Value::Number(1.0).kind(), VarKind::Number);
        assert_eq!(Value::Bool(true).kind(), VarKind::Bool);
        assert_eq!(Value::String("x".into()).kind(), VarKind::String);
        assert_eq!(Value::set_of(["a"]).kind(), VarKind::Set);
        for kind in [VarKind::Number, VarKind::Bool, VarKind::String, VarKind::Set] {
            assert_eq!(kind.zero().kind(), kind);
        }
    }

    #[test]
    fn initial_value_clamps_into_range() {
        let decl = VarDecl::new(VarKind::Number).with_range(10.0, 20.0);
        assert_eq!(decl.initial_value(), Value::Number(10.0));

        let decl = VarDecl::number(50.0).with_range(0.0, 100.0);
        assert_eq!(decl.initial_value(), Value::Number(50.0));
    }

    #[test]
    fn trait_declaration() {
        let decl = VarDecl::trait_score(40.0, 0.0, 100.0);
        assert!(decl.is_trait);
        assert!(decl.contains(100.0));
        assert!(!decl.contains(-0.5));
        assert_eq!(decl.clamp(140.0), 100.0);
    }

    #[test]
    fn display_values() {
        assert_eq!(Value::Number(3.5).to_string(), "3.5");
        assert_eq!(Value::String("ACT1".into()).to_string(), "\"ACT1\"");
        assert_eq!(Value::set_of(["b", "a"]).to_string(), "{a, b}");
    }

    #[test]
    fn declaration_from_ron() {
        let decl: VarDecl =
            ron::from_str("(kind: Number, default: Some(Number(5.0)), range: Some((0.0, 10.0)))")
                .unwrap();
        assert_eq!(decl.kind, VarKind::Number);
        assert_eq!(decl.initial_value(), Value::Number(5.0));
        assert!(!decl.is_trait);
    }
}
