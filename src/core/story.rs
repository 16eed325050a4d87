/// A complete authored story: variable schema, act schedule and branches.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::core::canon::CanonManager;
use crate::core::catalog::{BranchCatalog, CatalogError};
use crate::core::state::StateSchema;
use crate::schema::branch::BranchDraft;
use crate::schema::canon::ActDefinition;
use crate::schema::value::VarDecl;

/// Intermediate RON representation of a story file.
#[derive(Debug, Deserialize)]
#[serde(rename = "Story")]
struct RonStory {
    #[serde(default)]
    variables: BTreeMap<String, VarDecl>,
    acts: Vec<ActDefinition>,
    #[serde(default)]
    branches: Vec<BranchDraft>,
}

#[derive(Debug, Clone)]
pub struct Story {
    pub schema: StateSchema,
    pub canon: CanonManager,
    pub catalog: BranchCatalog,
}

impl Story {
    /// Validate authored components into a story.
    pub fn new(
        schema: StateSchema,
        acts: Vec<ActDefinition>,
        branches: Vec<BranchDraft>,
    ) -> Result<Story, CatalogError> {
        let canon = CanonManager::new(acts)?;
        let catalog = BranchCatalog::new(branches, &schema, &canon)?;
        Ok(Story {
            schema,
            canon,
            catalog,
        })
    }

    /// Load a story from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Story, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let story = Self::parse_ron(&contents)?;
        info!(
            path = %path.display(),
            acts = story.canon.acts().len(),
            branches = story.catalog.len(),
            "story loaded"
        );
        Ok(story)
    }

    /// Parse a story from a RON string.
    pub fn parse_ron(input: &str) -> Result<Story, CatalogError> {
        let raw: RonStory = ron::from_str(input)?;
        Self::new(StateSchema { variables: raw.variables }, raw.acts, raw.branches)
    }
}
