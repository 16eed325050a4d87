/// Playthrough — interactive (or scripted) turn loop over a story file.
///
/// Run with: cargo run --features tools --bin playthrough -- ...
///
/// Usage: playthrough --story <path> [--config <path>] [--force <n>]
///                    [--max-choices <n>] [--seed <n>] [--auto <turns>]
///
/// Commands:
///   do <action>      — propose developments for a player action
///   <n>              — commit development n from the last proposal
///   advance          — move to the next act once its canon is complete
///   status           — show act, turn, variables and outstanding canon
///   history          — show the chronicle summary
///   save <path>      — write the session snapshot as RON
///   load <path>      — restore a session snapshot
///   help             — list commands
///   quit             — exit

use canon_weaver::core::config::SeedStrategy;
use canon_weaver::core::orchestrator::{NarrativeOrchestrator, OrchestratorError};
use canon_weaver::core::state::NarrativeState;
use canon_weaver::schema::development::CandidateDevelopment;
use std::io::{self, BufRead, Write};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "canon_weaver=info".into()))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut story_path = None;
    let mut config_path = None;
    let mut force = None;
    let mut max_choices = None;
    let mut seed = None;
    let mut auto_turns = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--story" if i + 1 < args.len() => {
                i += 1;
                story_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--force" if i + 1 < args.len() => {
                i += 1;
                force = Some(parse_number(&args[i], "--force"));
            }
            "--max-choices" if i + 1 < args.len() => {
                i += 1;
                max_choices = Some(parse_number(&args[i], "--max-choices") as usize);
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = Some(parse_number(&args[i], "--seed"));
            }
            "--auto" if i + 1 < args.len() => {
                i += 1;
                auto_turns = Some(parse_number(&args[i], "--auto") as usize);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(story_path) = story_path else {
        eprintln!("ERROR: --story is required");
        print_usage();
        process::exit(1);
    };

    let mut builder = NarrativeOrchestrator::builder().story_file(&story_path);
    if let Some(path) = config_path {
        builder = builder.config_file(path);
    }
    if let Some(turns) = force {
        builder = builder.force_canon_after_turns(turns as u32);
    }
    if let Some(n) = max_choices {
        builder = builder.max_choices(n);
    }
    if let Some(seed) = seed {
        builder = builder.seed_strategy(SeedStrategy::Fixed(seed));
    }

    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Loaded '{}': {} branches, {} acts",
        story_path,
        engine.story().catalog.len(),
        engine.story().canon.acts().len()
    );

    let mut state = engine.new_state();
    match auto_turns {
        Some(turns) => run_auto(&engine, &mut state, turns),
        None => run_interactive(&engine, &mut state),
    }
}

fn parse_number(text: &str, flag: &str) -> u64 {
    text.parse().unwrap_or_else(|_| {
        eprintln!("ERROR: {} expects a non-negative integer, got '{}'", flag, text);
        process::exit(1);
    })
}

fn run_auto(engine: &NarrativeOrchestrator, state: &mut NarrativeState, turns: usize) {
    for turn in 0..turns {
        if state.is_story_complete() {
            println!("\nThe story is complete.");
            break;
        }
        let developments = match engine.propose(state, "continue") {
            Ok(d) => d,
            Err(e) => {
                println!("\nStopped: {}", e);
                break;
            }
        };
        print_developments(state, &developments);
        let index = turn % developments.len();
        println!("-> choosing [{}]", index + 1);
        commit_and_advance(engine, state, &developments, index);
    }
    println!("\n{}", state.chronicle().summary());
}

fn run_interactive(engine: &NarrativeOrchestrator, state: &mut NarrativeState) {
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut developments: Vec<CandidateDevelopment> = Vec::new();

    loop {
        print!("{} turn {}> ", state.act(), state.turn());
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "do" => {
                let action = if rest.is_empty() { "continue" } else { rest };
                match engine.propose(state, action) {
                    Ok(d) => {
                        developments = d;
                        print_developments(state, &developments);
                    }
                    Err(OrchestratorError::ExhaustedBranches { outstanding, .. }) => {
                        developments.clear();
                        println!("Nothing can happen next.");
                        if !outstanding.is_empty() {
                            println!("Outstanding canon: {}", outstanding.join(", "));
                        }
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "advance" => match engine.advance_act(state) {
                Ok(transition) => {
                    developments.clear();
                    println!("{:?}", transition);
                }
                Err(e) => println!("Error: {}", e),
            },
            "status" => print_status(engine, state),
            "history" => {
                if state.chronicle().is_empty() {
                    println!("Nothing has happened yet.");
                } else {
                    println!("{}", state.chronicle().summary());
                }
            }
            "save" if !rest.is_empty() => match ron::to_string(&*state) {
                Ok(text) => match std::fs::write(rest, text) {
                    Ok(()) => println!("Saved to {}", rest),
                    Err(e) => println!("Error: {}", e),
                },
                Err(e) => println!("Error: {}", e),
            },
            "load" if !rest.is_empty() => {
                let restored = std::fs::read_to_string(rest)
                    .map_err(|e| e.to_string())
                    .and_then(|text| ron::from_str::<NarrativeState>(&text).map_err(|e| e.to_string()));
                match restored {
                    Ok(restored) => {
                        *state = restored;
                        developments.clear();
                        println!("Restored {} at turn {}", state.act(), state.turn());
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            number => match number.parse::<usize>() {
                Ok(n) if n >= 1 && n <= developments.len() => {
                    commit_and_advance(engine, state, &developments, n - 1);
                    developments.clear();
                }
                Ok(_) => println!("No such development. Use 'do <action>' first."),
                Err(_) => println!("Unknown command: {} (type 'help')", cmd),
            },
        }
    }
}

/// Commit a choice and move to the next act as soon as its canon is done.
fn commit_and_advance(
    engine: &NarrativeOrchestrator,
    state: &mut NarrativeState,
    developments: &[CandidateDevelopment],
    index: usize,
) {
    match engine.commit_choice(state, developments, index) {
        Ok(outcome) => {
            if let Some(event) = &outcome.satisfied_event {
                println!("** Canon: {} **", event);
            }
            if outcome.act_complete {
                match engine.advance_act(state) {
                    Ok(transition) => println!("{:?}", transition),
                    Err(e) => println!("Error: {}", e),
                }
            }
        }
        Err(e) => println!("Error: {}", e),
    }
}

fn print_developments(state: &NarrativeState, developments: &[CandidateDevelopment]) {
    println!("\n--- {} / turn {} ---", state.act(), state.turn());
    for (i, dev) in developments.iter().enumerate() {
        println!("[{}] {} ({:?}, score {})", i + 1, dev.branch_id, dev.tier, dev.score);
        if !dev.description.is_empty() {
            println!("    {}", dev.description);
        }
        if !dev.situation.is_empty() {
            println!("    {}", dev.situation);
        }
        if let Some(twist) = &dev.twist {
            println!("    Twist: {}", twist);
        }
        for action in &dev.possible_actions {
            println!("    - {} (impact {:.2})", action.text, action.impact);
        }
        if !dev.tags.is_empty() {
            println!("    tags: {}", dev.tags.join(", "));
        }
    }
}

fn print_status(engine: &NarrativeOrchestrator, state: &NarrativeState) {
    println!("Act: {}  Turn: {}  (turns in act: {})", state.act(), state.turn(), state.turns_in_act());
    for name in engine.story().schema.variables.keys() {
        if let Ok(value) = state.get(name) {
            println!("  {} = {}", name, value);
        }
    }
    let outstanding = engine.outstanding(state);
    if outstanding.is_empty() {
        println!("Canon for this act is complete.");
    } else {
        println!("Outstanding canon: {}", outstanding.join(", "));
    }
    println!("Branching factor: {:.3}", state.chronicle().branching_factor());
}

fn print_usage() {
    println!("Usage: playthrough --story <path> [--config <path>] [--force <n>]");
    println!("                   [--max-choices <n>] [--seed <n>] [--auto <turns>]");
}

fn print_help() {
    println!("Commands:");
    println!("  do <action>   propose developments for a player action");
    println!("  <n>           commit development n from the last proposal");
    println!("  advance       move to the next act once its canon is complete");
    println!("  status        show act, turn, variables and outstanding canon");
    println!("  history       show the chronicle summary");
    println!("  save <path>   write the session snapshot as RON");
    println!("  load <path>   restore a session snapshot");
    println!("  quit          exit");
}
