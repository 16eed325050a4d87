/// Catalog Linter — validates a story file and reports authoring risks.
///
/// Run with: cargo run --features tools --bin catalog_linter -- ...
///
/// Usage: catalog_linter <story.ron> [--config <config.ron>]

use canon_weaver::core::catalog::CatalogError;
use canon_weaver::core::config::EngineConfig;
use canon_weaver::core::story::Story;
use canon_weaver::schema::condition::Operator;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "canon_weaver=warn".into()))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: catalog_linter <story.ron> [--config <config.ron>]");
        process::exit(0);
    }

    let story_path = &args[1];
    let mut config_path = None;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            i += 1;
            config_path = Some(args[i].clone());
        }
        i += 1;
    }

    let config = match config_path {
        Some(ref path) => match EngineConfig::load_from_ron(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let story = match Story::load_from_ron(Path::new(story_path)) {
        Ok(story) => story,
        Err(CatalogError::SchemaViolation(violations)) => {
            println!("\n=== Catalog Lint Report ===\n");
            for violation in &violations {
                println!("ERROR: {}", violation);
            }
            println!("\nSummary: {} errors", violations.len());
            process::exit(1);
        }
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Loaded {} branches across {} acts",
        story.catalog.len(),
        story.canon.acts().len()
    );

    let warnings = lint_story(&story, &config);

    println!("\n=== Catalog Lint Report ===\n");
    if warnings.is_empty() {
        println!("All checks passed!");
    }
    for warning in &warnings {
        println!("WARNING: {}", warning);
    }
    println!("\nSummary: 0 errors, {} warnings", warnings.len());
}

fn lint_story(story: &Story, config: &EngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let act_ids: Vec<&str> = story.canon.acts().iter().map(|a| a.id.as_str()).collect();

    if config.force_canon_after_turns.is_none() {
        warnings.push(
            "No force_canon_after_turns configured: canon only advances when chosen".to_string(),
        );
    }

    // Canon events that can stall: every satisfier is conditional or nested
    for act in story.canon.acts() {
        for event in &act.canon {
            let open = story
                .catalog
                .satisfiers(event)
                .any(|b| b.conditions.is_empty() && b.parent.is_none());
            if !open {
                warnings.push(format!(
                    "Canon event '{}' ({}) has no unconditional top-level satisfier",
                    event, act.id
                ));
            }
        }
    }

    for branch in story.catalog.iter() {
        if branch.description.is_empty() {
            warnings.push(format!("Branch '{}' has no description", branch.id));
        }

        for (name, slot) in &branch.slots {
            if slot.candidates.len() < 2 && slot.fallback.is_none() {
                warnings.push(format!(
                    "Branch '{}' slot '{}' has a single candidate and no fallback",
                    branch.id, name
                ));
            }
            if slot.candidates.iter().all(|c| c.gate.is_some()) && slot.fallback.is_none() {
                warnings.push(format!(
                    "Branch '{}' slot '{}' is fully gated with no fallback; the branch may be dropped",
                    branch.id, name
                ));
            }
        }

        // act == X where X is not a declared act can never hold
        for condition in &branch.conditions {
            if condition.variable == "act"
                && condition.operator == Operator::Eq
                && !act_ids.contains(&condition.literal.as_str())
            {
                warnings.push(format!(
                    "Branch '{}' requires act '{}' which is not in the schedule",
                    branch.id, condition.literal
                ));
            }
        }

        for closed in &branch.closes {
            let Some(target) = story.catalog.get(closed) else {
                continue;
            };
            if let Some(event) = &target.canon_event {
                if story.catalog.satisfiers(event).count() == 1 {
                    warnings.push(format!(
                        "Branch '{}' closes '{}', the only satisfier of canon event '{}'",
                        branch.id, closed, event
                    ));
                }
            }
        }
    }

    warnings
}
