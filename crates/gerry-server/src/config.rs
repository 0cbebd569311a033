// Configuration loading and parsing (server.toml, rounds.toml).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use gerry_core::rounds::{builtin_rounds, RoundConfig, DEFAULT_ROUND_ORDER};
use gerry_core::session::{GameSettings, DEFAULT_SEAT_COUNT};
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerSection,
    pub game: GameSettings,
    /// Rounds in play order, resolved from `round_order`.
    pub rounds: Vec<RoundConfig>,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerSection,
    #[serde(default)]
    game: GameSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl ServerSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GameSection {
    #[serde(default = "default_seat_count")]
    seat_count: u32,
    #[serde(default = "default_require_all_votes")]
    require_all_votes: bool,
    #[serde(default = "default_round_order")]
    round_order: Vec<String>,
}

impl Default for GameSection {
    fn default() -> Self {
        GameSection {
            seat_count: default_seat_count(),
            require_all_votes: default_require_all_votes(),
            round_order: default_round_order(),
        }
    }
}

fn default_seat_count() -> u32 {
    DEFAULT_SEAT_COUNT
}

fn default_require_all_votes() -> bool {
    true
}

fn default_round_order() -> Vec<String> {
    DEFAULT_ROUND_ORDER.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// rounds.toml structs
// ---------------------------------------------------------------------------

/// `[[round]]` tables. Replaces the built-in table entirely when present.
#[derive(Debug, Clone, Deserialize)]
struct RoundsFile {
    #[serde(rename = "round", default)]
    rounds: Vec<RoundEntry>,
}

/// File-side round. The pairs are read as lists so a wrong length is
/// reported instead of silently truncated.
#[derive(Debug, Clone, Deserialize)]
struct RoundEntry {
    id: String,
    question: String,
    options: Vec<String>,
    colors: Vec<String>,
    icons: Vec<String>,
}

impl RoundEntry {
    fn into_round(self) -> Result<RoundConfig, ConfigError> {
        let options = pair(&self.id, "options", self.options)?;
        let colors = pair(&self.id, "colors", self.colors)?;
        let icons = pair(&self.id, "icons", self.icons)?;
        Ok(RoundConfig {
            id: self.id,
            question: self.question,
            options,
            colors,
            icons,
        })
    }
}

fn pair(round_id: &str, field: &str, values: Vec<String>) -> Result<[String; 2], ConfigError> {
    <[String; 2]>::try_from(values).map_err(|values| {
        invalid(
            format!("round.{round_id}.{field}"),
            format!("expected exactly 2 entries, found {}", values.len()),
        )
    })
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml` and
/// (optionally) `config/rounds.toml`, relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- server.toml (required) ---
    let server_path = config_dir.join("server.toml");
    let server_file: ServerFile = parse_file(&server_path)?;

    // --- rounds.toml (optional) ---
    let rounds_path = config_dir.join("rounds.toml");
    let table = if rounds_path.exists() {
        let rounds_file: RoundsFile = parse_file(&rounds_path)?;
        rounds_file
            .rounds
            .into_iter()
            .map(RoundEntry::into_round)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        builtin_rounds()
    };

    validate_server(&server_file)?;
    validate_round_table(&table)?;
    let rounds = resolve_order(&server_file.game.round_order, &table)?;

    Ok(Config {
        server: server_file.server,
        game: GameSettings {
            seat_count: server_file.game.seat_count,
            require_all_votes: server_file.game.require_all_votes,
        },
        rounds,
    })
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    let copy_err = |message: String| ConfigError::DefaultsCopyError { message };

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_err(format!("failed to create config directory: {e}")))?;
    let entries = std::fs::read_dir(&defaults_dir)
        .map_err(|e| copy_err(format!("failed to read defaults directory: {e}")))?;

    let mut copied = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| copy_err(format!("failed to read defaults entry: {e}")))?
            .path();
        let Some(file_name) = path.file_name().filter(|_| path.is_file()) else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&path, &target).map_err(|e| {
            copy_err(format!(
                "failed to copy {} to {}: {e}",
                path.display(),
                target.display()
            ))
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Loads config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_server(file: &ServerFile) -> Result<(), ConfigError> {
    if file.server.host.trim().is_empty() {
        return Err(invalid("server.host", "must not be empty"));
    }
    if file.server.port == 0 {
        return Err(invalid("server.port", "must be greater than 0"));
    }
    if file.game.seat_count == 0 {
        return Err(invalid("game.seat_count", "must be greater than 0"));
    }
    if file.game.round_order.is_empty() {
        return Err(invalid("game.round_order", "must list at least one round"));
    }
    Ok(())
}

fn validate_round_table(table: &[RoundConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for round in table {
        if round.id.trim().is_empty() {
            return Err(invalid("round.id", "must not be empty"));
        }
        if !seen.insert(round.id.as_str()) {
            return Err(invalid(
                format!("round.{}", round.id),
                "duplicate round id",
            ));
        }
        let [first, second] = &round.options;
        if first.is_empty() || second.is_empty() {
            return Err(invalid(
                format!("round.{}.options", round.id),
                "option labels must not be empty",
            ));
        }
        if first == second {
            return Err(invalid(
                format!("round.{}.options", round.id),
                format!("option labels must differ, both are {first:?}"),
            ));
        }
    }
    Ok(())
}

fn resolve_order(order: &[String], table: &[RoundConfig]) -> Result<Vec<RoundConfig>, ConfigError> {
    order
        .iter()
        .map(|id| {
            table
                .iter()
                .find(|r| &r.id == id)
                .cloned()
                .ok_or_else(|| invalid("game.round_order", format!("unknown round id {id:?}")))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn crate_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    }

    /// Temp dir with a `config/` holding the given server.toml.
    fn config_dir_with(server_toml: &str) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join("config/server.toml"), server_toml).unwrap();
        tmp
    }

    const MINIMAL: &str = "[server]\nhost = \"127.0.0.1\"\nport = 8000\n";

    #[test]
    fn load_valid_config_from_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::copy(
            crate_root().join("defaults/server.toml"),
            tmp.path().join("config/server.toml"),
        )
        .unwrap();

        let config = load_config_from(tmp.path()).expect("defaults should load");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.game.seat_count, 30);
        assert!(config.game.require_all_votes);
        let ids: Vec<&str> = config.rounds.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, DEFAULT_ROUND_ORDER);
    }

    #[test]
    fn game_section_is_optional() {
        let tmp = config_dir_with(MINIMAL);
        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.game, GameSettings::default());
        assert_eq!(config.rounds.len(), 4);
    }

    #[test]
    fn round_order_selects_from_builtin_table() {
        let tmp = config_dir_with(&format!(
            "{MINIMAL}[game]\nround_order = [\"toilet_paper\", \"consoles\"]\n"
        ));
        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.rounds[0].id, "toilet_paper");
        assert_eq!(config.rounds[1].options, ["Xbox", "PlayStation"]);
    }

    #[test]
    fn rounds_toml_replaces_builtin_table() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nround_order = [\"tabs\"]\n"));
        fs::write(
            tmp.path().join("config/rounds.toml"),
            r##"
[[round]]
id = "tabs"
question = "Tabs or spaces?"
options = ["Tabs", "Spaces"]
colors = ["#111111", "#eeeeee"]
icons = ["fa-solid fa-arrow-right", "fa-solid fa-minus"]
"##,
        )
        .unwrap();

        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.rounds.len(), 1);
        assert_eq!(config.rounds[0].question, "Tabs or spaces?");
    }

    #[test]
    fn example_rounds_file_parses() {
        let text = fs::read_to_string(crate_root().join("defaults/rounds.toml.example")).unwrap();
        let parsed: RoundsFile = toml::from_str(&text).unwrap();
        let table: Vec<RoundConfig> = parsed
            .rounds
            .into_iter()
            .map(|r| r.into_round().unwrap())
            .collect();
        assert_eq!(table.len(), builtin_rounds().len());
        validate_round_table(&table).unwrap();
    }

    #[test]
    fn rejects_unknown_round_in_order() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nround_order = [\"nope\"]\n"));
        let err = load_config_from(tmp.path()).unwrap_err();
        match err {
            ConfigError::ValidationError { field, message } => {
                assert_eq!(field, "game.round_order");
                assert!(message.contains("nope"));
            }
            other => panic!("Expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_round_order() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nround_order = []\n"));
        assert!(matches!(
            load_config_from(tmp.path()),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "game.round_order"
        ));
    }

    #[test]
    fn rejects_port_zero() {
        let tmp = config_dir_with("[server]\nhost = \"127.0.0.1\"\nport = 0\n");
        assert!(matches!(
            load_config_from(tmp.path()),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "server.port"
        ));
    }

    #[test]
    fn rejects_zero_seats() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nseat_count = 0\n"));
        assert!(matches!(
            load_config_from(tmp.path()),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "game.seat_count"
        ));
    }

    #[test]
    fn rejects_identical_option_labels() {
        let mut table = builtin_rounds();
        table[0].options = ["Same".into(), "Same".into()];
        let err = validate_round_table(&table).unwrap_err();
        assert!(err.to_string().contains("round.consoles.options"));
    }

    #[test]
    fn rejects_duplicate_round_ids() {
        let mut table = builtin_rounds();
        table[1].id = "consoles".into();
        assert!(validate_round_table(&table).is_err());
    }

    fn rounds_with(tmp: &tempfile::TempDir, options: &str, colors: &str, icons: &str) {
        fs::write(
            tmp.path().join("config/rounds.toml"),
            format!(
                "[[round]]\nid = \"x\"\nquestion = \"?\"\noptions = {options}\ncolors = {colors}\nicons = {icons}\n"
            ),
        )
        .unwrap();
    }

    fn rejected_field(tmp: &tempfile::TempDir) -> String {
        match load_config_from(tmp.path()) {
            Err(ConfigError::ValidationError { field, message }) => {
                assert!(message.contains("exactly 2"), "unexpected message: {message}");
                field
            }
            other => panic!("Expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_three_option_round() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nround_order = [\"x\"]\n"));
        rounds_with(&tmp, r#"["a", "b", "c"]"#, r#"["1", "2"]"#, r#"["i", "j"]"#);
        assert_eq!(rejected_field(&tmp), "round.x.options");
    }

    #[test]
    fn rejects_wrong_length_colors_and_icons() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nround_order = [\"x\"]\n"));
        rounds_with(&tmp, r#"["a", "b"]"#, r#"["1", "2", "3"]"#, r#"["i", "j"]"#);
        assert_eq!(rejected_field(&tmp), "round.x.colors");

        rounds_with(&tmp, r#"["a", "b"]"#, r#"["1", "2"]"#, r#"["i"]"#);
        assert_eq!(rejected_field(&tmp), "round.x.icons");
    }

    #[test]
    fn two_entry_round_from_file_loads() {
        let tmp = config_dir_with(&format!("{MINIMAL}[game]\nround_order = [\"x\"]\n"));
        rounds_with(&tmp, r#"["a", "b"]"#, r#"["1", "2"]"#, r#"["i", "j"]"#);
        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.rounds[0].options, ["a", "b"]);
        assert_eq!(config.rounds[0].icons, ["i", "j"]);
    }

    #[test]
    fn file_not_found_for_missing_server_toml() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        match load_config_from(tmp.path()) {
            Err(ConfigError::FileNotFound { path }) => assert!(path.ends_with("server.toml")),
            other => panic!("Expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = config_dir_with("[server\nport = ");
        assert!(matches!(
            load_config_from(tmp.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn ensure_config_files_copies_missing_and_skips_examples() {
        let tmp = tempfile::tempdir().unwrap();
        let defaults = tmp.path().join("defaults");
        fs::create_dir_all(&defaults).unwrap();
        fs::write(defaults.join("server.toml"), MINIMAL).unwrap();
        fs::write(defaults.join("rounds.toml.example"), "").unwrap();

        let copied = ensure_config_files(tmp.path()).unwrap();

        assert_eq!(copied, vec![tmp.path().join("config/server.toml")]);
        assert!(!tmp.path().join("config/rounds.toml.example").exists());
    }

    #[test]
    fn ensure_config_files_keeps_existing() {
        let tmp = config_dir_with("# edited\n");
        let defaults = tmp.path().join("defaults");
        fs::create_dir_all(&defaults).unwrap();
        fs::write(defaults.join("server.toml"), MINIMAL).unwrap();

        let copied = ensure_config_files(tmp.path()).unwrap();

        assert!(copied.is_empty());
        let content = fs::read_to_string(tmp.path().join("config/server.toml")).unwrap();
        assert_eq!(content, "# edited\n");
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            ensure_config_files(tmp.path()),
            Err(ConfigError::DefaultsCopyError { .. })
        ));
    }
}
