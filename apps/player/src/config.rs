use std::{collections::HashMap, fs, path::Path};

use shared::domain::{Difficulty, Side};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub difficulty: Difficulty,
    pub player_side: Side,
    pub white_difficulty: Difficulty,
    pub black_difficulty: Difficulty,
    pub ai_speed_seconds: f64,
    pub analysis_depth: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            difficulty: Difficulty::Medium,
            player_side: Side::White,
            white_difficulty: Difficulty::Medium,
            black_difficulty: Difficulty::Medium,
            ai_speed_seconds: 1.5,
            analysis_depth: 4,
        }
    }
}

/// Defaults, then the optional settings file at `path`, then environment.
/// Command-line flags are applied by the caller on top.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("ignoring unreadable settings file: {err}");
            return;
        }
    };
    if let Some(v) = file_cfg.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = file_cfg.get("difficulty") {
        set_parsed(&mut settings.difficulty, "difficulty", v);
    }
    if let Some(v) = file_cfg.get("player_side") {
        set_parsed(&mut settings.player_side, "player_side", v);
    }
    if let Some(v) = file_cfg.get("white_difficulty") {
        set_parsed(&mut settings.white_difficulty, "white_difficulty", v);
    }
    if let Some(v) = file_cfg.get("black_difficulty") {
        set_parsed(&mut settings.black_difficulty, "black_difficulty", v);
    }
    if let Some(v) = file_cfg.get("ai_speed_seconds") {
        set_parsed(&mut settings.ai_speed_seconds, "ai_speed_seconds", v);
    }
    if let Some(v) = file_cfg.get("analysis_depth") {
        set_parsed(&mut settings.analysis_depth, "analysis_depth", v);
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CHESS_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__DIFFICULTY") {
        set_parsed(&mut settings.difficulty, "APP__DIFFICULTY", &v);
    }
    if let Some(v) = var("APP__PLAYER_SIDE") {
        set_parsed(&mut settings.player_side, "APP__PLAYER_SIDE", &v);
    }
    if let Some(v) = var("APP__AI_SPEED_SECONDS") {
        set_parsed(&mut settings.ai_speed_seconds, "APP__AI_SPEED_SECONDS", &v);
    }
    if let Some(v) = var("APP__ANALYSIS_DEPTH") {
        set_parsed(&mut settings.analysis_depth, "APP__ANALYSIS_DEPTH", &v);
    }
}

fn set_parsed<T>(slot: &mut T, key: &str, raw: &str)
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(err) => warn!(key, value = raw, "ignoring invalid setting: {err}"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
