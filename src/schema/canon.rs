use serde::{Deserialize, Serialize};

/// An act and its ordered list of mandatory plot beats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActDefinition {
    pub id: String,
    pub canon: Vec<String>,
}

impl ActDefinition {
    pub fn new(id: &str, canon: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            canon: canon.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// An authored plot beat that must occur in its act regardless of player
/// choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonEvent {
    pub id: String,
    pub act: String,
    pub satisfied: bool,
}
