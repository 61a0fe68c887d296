use std::path::Path;

use qsp_api::{
    create_session, resume_session, CreateSessionOptions, QspSession, ResumeSessionOptions,
};
use qsp_runtime::EngineLimits;

use crate::host::{CliHost, HostLog};
use crate::{
    emit_boundary, load_game_by_ref, load_player_state, map_engine_record, save_player_state,
    BoundaryEvent, BoundaryResult, CliError, LoadedGame, PlayerState, PLAYER_STATE_SCHEMA,
};

/// A session together with the log its host writes messages into.
pub(crate) struct PlayerSession {
    pub(crate) session: QspSession,
    pub(crate) log: HostLog,
    pub(crate) game_id: String,
}

impl PlayerSession {
    pub(crate) fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    /// Fails with the engine's error record when `succeeded` is false.
    pub(crate) fn check(&self, succeeded: bool) -> Result<(), CliError> {
        if succeeded {
            Ok(())
        } else {
            Err(map_engine_record(self.session.last_error()))
        }
    }
}

pub(crate) fn create_session_for_game(game: &LoadedGame) -> Result<PlayerSession, CliError> {
    let log = HostLog::default();
    let session = create_session(CreateSessionOptions {
        game: game.bytes.clone(),
        host: Some(Box::new(CliHost::new(game.base_dir(), log.clone()))),
        limits: EngineLimits::default(),
        random_seed: None,
    })?;
    tracing::debug!(game = %game.id, "session started");
    Ok(PlayerSession {
        session,
        log,
        game_id: game.id.clone(),
    })
}

pub(crate) fn resume_session_for_state(
    game: &LoadedGame,
    state: &PlayerState,
) -> Result<PlayerSession, CliError> {
    let log = HostLog::default();
    let session = resume_session(ResumeSessionOptions {
        game: game.bytes.clone(),
        state: state.snapshot.clone(),
        host: Some(Box::new(CliHost::new(game.base_dir(), log.clone()))),
        limits: EngineLimits::default(),
    })?;
    tracing::debug!(game = %game.id, bytes = state.snapshot.len(), "session resumed");
    Ok(PlayerSession {
        session,
        log,
        game_id: game.id.clone(),
    })
}

pub(crate) fn save_session_state(
    path: &Path,
    player: &mut PlayerSession,
    game_id: &str,
) -> Result<(), CliError> {
    let snapshot = player.session.save_state(false);
    let Some(snapshot) = snapshot else {
        return Err(map_engine_record(player.session.last_error()));
    };
    let state = PlayerState {
        schema_version: PLAYER_STATE_SCHEMA.to_string(),
        game_id: game_id.to_string(),
        snapshot,
    };
    save_player_state(path, &state)
}

pub(crate) fn load_session_from_state_for_ref(
    path: &Path,
) -> Result<(LoadedGame, PlayerState, PlayerSession), CliError> {
    let state = load_player_state(path)?;
    let game = load_game_by_ref(&state.game_id)?;
    let player = resume_session_for_state(&game, &state)?;
    Ok((game, state, player))
}

pub(crate) fn load_session_from_state_for_game(
    path: &Path,
    game: &LoadedGame,
) -> Result<(PlayerState, PlayerSession), CliError> {
    let state = load_player_state(path)?;
    if state.game_id != game.id {
        return Err(CliError::new(
            "CLI_STATE_GAME_MISMATCH",
            format!(
                "State game mismatch. expected={} actual={}",
                game.id, state.game_id
            ),
        ));
    }
    let player = resume_session_for_state(game, &state)?;
    Ok((state, player))
}

pub(crate) fn emit_boundary_with_saved_state(
    player: &mut PlayerSession,
    boundary: BoundaryResult,
    state_out: &str,
    game_id: &str,
) -> Result<i32, CliError> {
    if boundary.event != BoundaryEvent::End {
        save_session_state(Path::new(state_out), player, game_id)?;
        emit_boundary(boundary, Some(state_out.to_string()));
        return Ok(0);
    }

    emit_boundary(boundary, None);
    Ok(0)
}

#[cfg(test)]
mod session_ops_tests {
    use super::*;
    use crate::cli_test_support::*;
    use crate::{collect_boundary, load_game_by_path};

    #[test]
    fn session_helpers_cover_create_save_load_and_emit_paths() {
        let dir = temp_path("session-ops");
        let game_path = write_game(
            &dir,
            "# start\ngold = 5\nact 'Spend': gold -= 1\n--\n",
        );
        let game = load_game_by_path(game_path.to_string_lossy().as_ref()).expect("game");

        let mut player = create_session_for_game(&game).expect("session should start");
        assert!(player.session.select_action(0, false));
        assert!(player.session.execute_selected_action(false));
        let state_file = dir.join("state.json");
        save_session_state(&state_file, &mut player, &game.id).expect("state should save");

        let (loaded_game, state, resumed) =
            load_session_from_state_for_ref(&state_file).expect("state ref load should pass");
        assert_eq!(loaded_game.id, game.id);
        assert_eq!(state.game_id, game.id);
        assert_eq!(resumed.session.numeric_variable("gold", 0), 4);

        let (_state, mut resumed_for_game) =
            load_session_from_state_for_game(&state_file, &game).expect("state game load");
        let boundary = collect_boundary(&mut resumed_for_game);
        assert_eq!(boundary.event, BoundaryEvent::Actions);

        let emit_code = emit_boundary_with_saved_state(
            &mut resumed_for_game,
            boundary,
            state_file.to_string_lossy().as_ref(),
            &game.id,
        )
        .expect("emit with save should pass");
        assert_eq!(emit_code, 0);
    }

    #[test]
    fn load_session_from_state_for_game_rejects_mismatch() {
        let dir = temp_path("session-ops-mismatch");
        let first = write_game(&dir.join("a"), "# start\nact 'Wait': x = 1\n--\n");
        let second = write_game(&dir.join("b"), "# other\nact 'Wait': y = 1\n--\n");
        let first = load_game_by_path(first.to_string_lossy().as_ref()).expect("first game");
        let second = load_game_by_path(second.to_string_lossy().as_ref()).expect("second game");

        let mut player = create_session_for_game(&second).expect("session");
        let state_file = dir.join("state.json");
        save_session_state(&state_file, &mut player, &second.id).expect("state save");

        let error = match load_session_from_state_for_game(&state_file, &first) {
            Ok(_) => panic!("mismatch should fail"),
            Err(error) => error,
        };
        assert_eq!(error.code, "CLI_STATE_GAME_MISMATCH");
    }

    #[test]
    fn failed_calls_map_the_error_record() {
        let dir = temp_path("session-ops-fault");
        let game_path = write_game(&dir, "# start\nx = 1\n--\n");
        let game = load_game_by_path(game_path.to_string_lossy().as_ref()).expect("game");
        let mut player = create_session_for_game(&game).expect("session");
        let succeeded = player.session.execute("goto 'nowhere'", false);
        let error = player.check(succeeded).expect_err("goto should fail");
        assert_eq!(error.code, "LOCATION_NOT_FOUND");
        assert!(player.check(true).is_ok());
    }
}
