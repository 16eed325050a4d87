/// Manor Mystery example — plays the Blackwood Manor story from arrival to
/// revelation, with canon forced after two turns in each act.
///
/// Two sessions share one orchestrator: a cautious reader and a bold one.
/// Their paths differ, but every act's canon beats happen in both.
///
/// Run with: cargo run --example manor_mystery

use canon_weaver::core::orchestrator::NarrativeOrchestrator;
use canon_weaver::core::state::NarrativeState;
use canon_weaver::schema::value::Value;

fn main() {
    let engine = NarrativeOrchestrator::builder()
        .story_file("story_data/manor/story.ron")
        .force_canon_after_turns(2)
        .max_choices(3)
        .build()
        .expect("Failed to build orchestrator");

    // --- Cautious reader: always takes the first offer ---
    let mut cautious = engine.new_state();
    println!("=== The cautious guest ===\n");
    play(&engine, &mut cautious, |_| 0);

    // --- Bold reader: starts braver, takes the last offer ---
    let mut bold = engine.new_state();
    bold.set("courage", Value::Number(85.0))
        .expect("courage is a declared trait");
    bold.set("wit", Value::Number(75.0))
        .expect("wit is a declared trait");
    println!("\n=== The bold guest ===\n");
    play(&engine, &mut bold, |offered| offered - 1);

    println!("\n=== Epilogue ===");
    for (label, state) in [("cautious", &cautious), ("bold", &bold)] {
        println!(
            "{}: {} turns, suspect = {}, branching factor {:.2}",
            label,
            state.turn(),
            state.get("suspect").map(|v| v.to_string()).unwrap_or_default(),
            state.chronicle().branching_factor()
        );
    }
}

fn play(engine: &NarrativeOrchestrator, state: &mut NarrativeState, pick: impl Fn(usize) -> usize) {
    while !state.is_story_complete() && state.turn() < 40 {
        let developments = match engine.propose(state, "continue") {
            Ok(d) => d,
            Err(e) => {
                println!("(stopped: {})", e);
                return;
            }
        };
        let chosen = &developments[pick(developments.len())];

        println!("[{} turn {}] {}", state.act(), state.turn(), chosen.description);
        if let Some(twist) = &chosen.twist {
            println!("    Twist: {}", twist);
        }

        let outcome = engine.commit(state, chosen).expect("fresh development commits");
        if outcome.act_complete {
            let transition = engine.advance_act(state).expect("canon complete");
            println!("    -> {:?}", transition);
        }
    }
}
