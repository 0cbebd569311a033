// Round definitions: the static binary-choice questions played in sequence.

use serde::{Deserialize, Serialize};

/// The rounds played when no explicit order is configured.
pub const DEFAULT_ROUND_ORDER: [&str; 4] = ["consoles", "chicken_egg", "simulation", "daylight"];

/// One of the two options of a round. Travels on the wire as its index
/// (`0` or `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    First,
    Second,
}

impl Choice {
    /// Wire index of this choice.
    pub fn index(self) -> u8 {
        match self {
            Choice::First => 0,
            Choice::Second => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Choice::First),
            1 => Some(Choice::Second),
            _ => None,
        }
    }
}

/// A single binary-choice question.
///
/// The option, color and icon pairs are fixed-size arrays: every round has
/// exactly two options, and everything downstream (tally, global map, vote
/// resolution) relies on that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    pub id: String,
    pub question: String,
    pub options: [String; 2],
    pub colors: [String; 2],
    pub icons: [String; 2],
}

impl RoundConfig {
    /// Resolve an option label to its choice. Matching is exact.
    pub fn resolve(&self, label: &str) -> Option<Choice> {
        if self.options[0] == label {
            Some(Choice::First)
        } else if self.options[1] == label {
            Some(Choice::Second)
        } else {
            None
        }
    }

    /// Label of the given choice.
    pub fn label(&self, choice: Choice) -> &str {
        &self.options[choice.index() as usize]
    }
}

fn round(
    id: &str,
    question: &str,
    options: [&str; 2],
    colors: [&str; 2],
    icons: [&str; 2],
) -> RoundConfig {
    RoundConfig {
        id: id.to_string(),
        question: question.to_string(),
        options: options.map(String::from),
        colors: colors.map(String::from),
        icons: icons.map(String::from),
    }
}

/// The built-in round table, used when no `rounds.toml` is configured.
pub fn builtin_rounds() -> Vec<RoundConfig> {
    vec![
        round(
            "consoles",
            "Which platform is superior?",
            ["Xbox", "PlayStation"],
            ["#107C10", "#003791"],
            ["fa-brands fa-xbox", "fa-brands fa-playstation"],
        ),
        round(
            "chicken_egg",
            "Which came first?",
            ["Chicken", "Egg"],
            ["#D35400", "#F1C40F"],
            ["fa-solid fa-crow", "fa-solid fa-egg"],
        ),
        round(
            "simulation",
            "Are we living in a simulation?",
            ["Yes", "No"],
            ["#2ecc71", "#e74c3c"],
            ["fa-solid fa-microchip", "fa-solid fa-ban"],
        ),
        round(
            "daylight",
            "Should we abolish Daylight Savings?",
            ["Yes", "No (Keep it)"],
            ["#34495e", "#f39c12"],
            ["fa-solid fa-thumbs-up", "fa-solid fa-clock"],
        ),
        round(
            "mobile_os",
            "iOS or Android?",
            ["Apple", "Android"],
            ["#A2AAAD", "#3DDC84"],
            ["fa-brands fa-apple", "fa-brands fa-android"],
        ),
        round(
            "morning_night",
            "When are you most productive?",
            ["Early Bird", "Night Owl"],
            ["#f39c12", "#2c3e50"],
            ["fa-solid fa-sun", "fa-solid fa-moon"],
        ),
        round(
            "gif_pronunciation",
            "How do you pronounce GIF?",
            ["Hard G (Gift)", "Soft G (Jif)"],
            ["#1abc9c", "#9b59b6"],
            ["fa-solid fa-g", "fa-solid fa-jar"],
        ),
        round(
            "toilet_paper",
            "Toilet paper orientation?",
            ["Over", "Under"],
            ["#34495e", "#bdc3c7"],
            ["fa-solid fa-arrow-up", "fa-solid fa-arrow-down"],
        ),
    ]
}

/// The built-in rounds arranged in [`DEFAULT_ROUND_ORDER`].
pub fn default_sequence() -> Vec<RoundConfig> {
    let table = builtin_rounds();
    DEFAULT_ROUND_ORDER
        .iter()
        .filter_map(|id| table.iter().find(|r| r.id == *id).cloned())
        .collect()
}
