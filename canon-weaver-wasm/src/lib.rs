//! WASM bindings for canon-weaver: one story session per JS object,
//! exchanging JSON strings.

use wasm_bindgen::prelude::*;

use canon_weaver::core::config::{EngineConfig, SeedStrategy};
use canon_weaver::core::orchestrator::NarrativeOrchestrator;
use canon_weaver::core::state::NarrativeState;
use canon_weaver::core::story::Story;
use canon_weaver::schema::development::CandidateDevelopment;

// ---------------------------------------------------------------------------
// Bundled story
// ---------------------------------------------------------------------------
mod data {
    pub const MANOR_STORY: &str = include_str!("../../story_data/manor/story.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct CommitInfo {
    branch_id: String,
    satisfied_event: Option<String>,
    act_complete: bool,
    turn: u64,
}

#[derive(serde::Serialize)]
struct StatusInfo<'a> {
    act: &'a str,
    turn: u64,
    turns_in_act: u64,
    outstanding: Vec<String>,
    story_complete: bool,
    branching_factor: f64,
    summary: String,
}

fn js_error(context: &str, e: impl std::fmt::Display) -> JsError {
    JsError::new(&format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// StorySession: one player session over one story
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StorySession {
    engine: NarrativeOrchestrator,
    state: NarrativeState,
    /// Developments from the last `propose`, for `commit(index)`.
    offered: Vec<CandidateDevelopment>,
}

#[wasm_bindgen]
impl StorySession {
    /// Start a session over the bundled manor story.
    ///
    /// `force_canon_after_turns` and `seed` are optional; without a seed
    /// variation derives from the session state.
    #[wasm_bindgen(constructor)]
    pub fn new(force_canon_after_turns: Option<u32>, seed: Option<u64>) -> Result<StorySession, JsError> {
        Self::from_story(data::MANOR_STORY, force_canon_after_turns, seed)
    }

    /// Start a session over a story supplied as RON text.
    pub fn from_story(
        story_ron: &str,
        force_canon_after_turns: Option<u32>,
        seed: Option<u64>,
    ) -> Result<StorySession, JsError> {
        let story = Story::parse_ron(story_ron).map_err(|e| js_error("Story error", e))?;
        let config = EngineConfig {
            force_canon_after_turns,
            variation_seed: seed.map_or(SeedStrategy::FromState, SeedStrategy::Fixed),
            ..EngineConfig::default()
        };
        let engine = NarrativeOrchestrator::builder()
            .with_story(story)
            .with_config(config)
            .build()
            .map_err(|e| js_error("Engine build error", e))?;
        let state = engine.new_state();

        Ok(StorySession {
            engine,
            state,
            offered: Vec::new(),
        })
    }

    /// Propose developments for a player action. Returns a JSON array.
    pub fn propose(&mut self, action: &str) -> Result<String, JsError> {
        self.offered = self
            .engine
            .propose(&self.state, action)
            .map_err(|e| js_error("Proposal error", e))?;
        serde_json::to_string(&self.offered).map_err(|e| js_error("Serialization error", e))
    }

    /// Commit development `index` of the last proposal. Returns JSON.
    pub fn commit(&mut self, index: usize) -> Result<String, JsError> {
        let outcome = self
            .engine
            .commit_choice(&mut self.state, &self.offered, index)
            .map_err(|e| js_error("Commit error", e))?;
        self.offered.clear();
        let info = CommitInfo {
            branch_id: outcome.branch_id,
            satisfied_event: outcome.satisfied_event,
            act_complete: outcome.act_complete,
            turn: outcome.turn,
        };
        serde_json::to_string(&info).map_err(|e| js_error("Serialization error", e))
    }

    /// Move to the next act. Returns the new act id, or `null` once the
    /// story is complete.
    pub fn advance(&mut self) -> Result<String, JsError> {
        self.engine
            .advance_act(&mut self.state)
            .map_err(|e| js_error("Act error", e))?;
        self.offered.clear();
        let next = (!self.state.is_story_complete()).then(|| self.state.act());
        serde_json::to_string(&next).map_err(|e| js_error("Serialization error", e))
    }

    /// Current act, turn, outstanding canon and history summary as JSON.
    pub fn status(&self) -> Result<String, JsError> {
        let info = StatusInfo {
            act: self.state.act(),
            turn: self.state.turn(),
            turns_in_act: self.state.turns_in_act(),
            outstanding: self.engine.outstanding(&self.state),
            story_complete: self.state.is_story_complete(),
            branching_factor: self.state.chronicle().branching_factor(),
            summary: self.state.chronicle().summary(),
        };
        serde_json::to_string(&info).map_err(|e| js_error("Serialization error", e))
    }

    /// The full session state as JSON, for saving.
    pub fn snapshot(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.state).map_err(|e| js_error("Serialization error", e))
    }

    /// Resume from a snapshot produced by `snapshot`.
    pub fn restore(&mut self, snapshot_json: &str) -> Result<(), JsError> {
        self.state = serde_json::from_str(snapshot_json).map_err(|e| js_error("Invalid snapshot JSON", e))?;
        self.offered.clear();
        Ok(())
    }

    /// Start over from the first act.
    pub fn reset(&mut self) {
        self.state = self.engine.new_state();
        self.offered.clear();
    }
}

