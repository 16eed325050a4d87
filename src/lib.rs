//! Canon Weaver — branch selection and canon enforcement for interactive
//! stories.
//!
//! Given the current narrative state and a player action, proposes a small
//! ranked set of pre-authored story developments, keeps mandatory plot beats
//! ("canon") reachable in every act, and resolves the variable details of
//! each development from a seeded, reproducible random stream.
//!
//! ```no_run
//! use canon_weaver::core::orchestrator::NarrativeOrchestrator;
//!
//! let engine = NarrativeOrchestrator::builder()
//!     .story_file("story_data/manor/story.ron")
//!     .force_canon_after_turns(4)
//!     .build()?;
//! let mut state = engine.new_state();
//! let developments = engine.propose(&state, "search the study")?;
//! engine.commit(&mut state, &developments[0])?;
//! # Ok::<(), canon_weaver::core::orchestrator::OrchestratorError>(())
//! ```

pub mod core;
pub mod schema;
