use std::fs;
use std::path::Path;

use crate::{
    map_cli_state_invalid, map_cli_state_read, map_cli_state_write, CliError, PlayerState,
    PLAYER_STATE_SCHEMA,
};

pub(crate) fn save_player_state(path: &Path, state: &PlayerState) -> Result<(), CliError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(map_cli_state_write)?;

    let payload = serde_json::to_string(state)
        .map_err(|error| CliError::new("CLI_STATE_WRITE", error.to_string()))?;
    fs::write(path, payload).map_err(map_cli_state_write)
}

pub(crate) fn load_player_state(path: &Path) -> Result<PlayerState, CliError> {
    if !path.exists() {
        return Err(CliError::new(
            "CLI_STATE_NOT_FOUND",
            format!("State file does not exist: {}", path.display()),
        ));
    }

    let raw = fs::read_to_string(path).map_err(map_cli_state_read)?;

    let state: PlayerState = serde_json::from_str(&raw).map_err(map_cli_state_invalid)?;

    if state.schema_version != PLAYER_STATE_SCHEMA {
        return Err(CliError::new(
            "CLI_STATE_SCHEMA",
            format!("Unsupported player state schema: {}", state.schema_version),
        ));
    }

    Ok(state)
}

#[cfg(test)]
mod state_store_tests {
    use super::*;
    use crate::cli_test_support::*;

    #[test]
    fn player_state_roundtrips_and_checks_schema() {
        let path = temp_path("state-store").join("nested").join("state.json");
        let state = PlayerState {
            schema_version: PLAYER_STATE_SCHEMA.to_string(),
            game_id: "game:/tmp/story.qsp".to_string(),
            snapshot: vec![1, 2, 3],
        };
        save_player_state(&path, &state).expect("state should save");
        let loaded = load_player_state(&path).expect("state should load");
        assert_eq!(loaded.game_id, state.game_id);
        assert_eq!(loaded.snapshot, state.snapshot);

        write_file(
            &path,
            "{\"schemaVersion\":\"old\",\"gameId\":\"game:x\",\"snapshot\":[]}",
        );
        let error = load_player_state(&path).expect_err("old schema should fail");
        assert_eq!(error.code, "CLI_STATE_SCHEMA");

        write_file(&path, "{");
        let error = load_player_state(&path).expect_err("broken json should fail");
        assert_eq!(error.code, "CLI_STATE_INVALID");

        let error = load_player_state(&temp_path("no-state.json")).expect_err("missing state");
        assert_eq!(error.code, "CLI_STATE_NOT_FOUND");
    }
}
