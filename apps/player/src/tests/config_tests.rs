use super::{apply_env, apply_file, load_settings, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

use shared::domain::{Difficulty, Side};

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
server_url = "http://chess.local:9000"
difficulty = "hard"
player_side = "black"
white_difficulty = "EASY"
ai_speed_seconds = "0.8"
analysis_depth = "6"
"#,
    );

    assert_eq!(settings.server_url, "http://chess.local:9000");
    assert_eq!(settings.difficulty, Difficulty::Hard);
    assert_eq!(settings.player_side, Side::Black);
    assert_eq!(settings.white_difficulty, Difficulty::Easy);
    assert_eq!(settings.black_difficulty, Difficulty::Medium);
    assert_eq!(settings.ai_speed_seconds, 0.8);
    assert_eq!(settings.analysis_depth, 6);
}

#[test]
fn invalid_values_keep_previous_setting() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "difficulty = \"grandmaster\"\nanalysis_depth = \"deep\"\n");
    assert_eq!(settings, Settings::default());

    apply_file(&mut settings, "this is not toml");
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_env_wins_over_legacy_name() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("CHESS_SERVER_URL", "http://legacy:8000"),
        ("APP__SERVER_URL", "https://chess.example"),
        ("APP__PLAYER_SIDE", "b"),
        ("APP__AI_SPEED_SECONDS", "3"),
    ]);
    let mut settings = Settings::default();
    apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.server_url, "https://chess.example");
    assert_eq!(settings.player_side, Side::Black);
    assert_eq!(settings.ai_speed_seconds, 3.0);
    assert_eq!(settings.analysis_depth, 4);
}

#[test]
fn missing_file_yields_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("chess_player_missing_{suffix}.toml"));

    let settings = load_settings(&path);
    assert_eq!(settings.analysis_depth, Settings::default().analysis_depth);
}

#[test]
fn settings_file_is_read_from_disk() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("chess_player_settings_{suffix}.toml"));
    fs::write(&path, "black_difficulty = \"master\"\n").expect("write settings");

    let settings = load_settings(&path);
    assert_eq!(settings.black_difficulty, Difficulty::Master);

    fs::remove_file(path).expect("cleanup");
}
