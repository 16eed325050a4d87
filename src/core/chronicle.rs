/// Narrative chronicle — committed-development history and branching factor.

use serde::{Deserialize, Serialize};

/// Number of recent entries considered for history summaries and for the
/// branching factor.
pub const HISTORY_WINDOW: usize = 3;

/// Characters of a description kept in a summary line.
const SUMMARY_CHARS: usize = 50;

/// One committed development.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronicleEntry {
    pub branch_id: String,
    pub description: String,
    /// How many developments were on offer when this one was chosen.
    pub choices: usize,
    pub chosen_index: usize,
    pub tags: Vec<String>,
}

/// Maintains the history of committed developments and the branching
/// factor derived from the diversity of recent choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chronicle {
    entries: Vec<ChronicleEntry>,
    branching_factor: f64,
}

impl Default for Chronicle {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            branching_factor: 1.0,
        }
    }
}

impl Chronicle {
    pub fn entries(&self) -> &[ChronicleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn branching_factor(&self) -> f64 {
        self.branching_factor
    }

    /// Narrative weight of the actions offered with the next developments.
    pub fn action_impact(&self) -> f64 {
        (0.2 + self.branching_factor * 0.3).min(1.0)
    }

    /// Append an entry and fold the recent choice window into the
    /// branching factor.
    pub fn record(&mut self, entry: ChronicleEntry) {
        self.entries.push(entry);
        let window: Vec<usize> = self.recent(HISTORY_WINDOW).map(|e| e.chosen_index).collect();
        self.update_branching_factor(&window);
    }

    /// Scale the branching factor by the diversity of the last
    /// `HISTORY_WINDOW` choices: `factor *= 1 + 0.1 * unique`.
    pub fn update_branching_factor(&mut self, choices: &[usize]) {
        let start = choices.len().saturating_sub(HISTORY_WINDOW);
        let mut unique: Vec<usize> = choices[start..].to_vec();
        unique.sort_unstable();
        unique.dedup();
        self.branching_factor *= 1.0 + unique.len() as f64 * 0.1;
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ChronicleEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].iter()
    }

    /// Condensed history for the text-generation collaborator.
    pub fn summary(&self) -> String {
        let start = self.entries.len().saturating_sub(HISTORY_WINDOW);
        self.entries[start..]
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let head: String = entry.description.chars().take(SUMMARY_CHARS).collect();
                format!("Chapter {}: {}...", start + i + 1, head)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
