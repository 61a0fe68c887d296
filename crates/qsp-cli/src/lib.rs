use std::ffi::OsString;

use clap::Parser;

mod agent;
mod boundary_runner;
mod cli_args;
mod error_map;
mod game_loader;
mod host;
mod line_mode;
mod models;
mod session_ops;
mod state_store;

pub(crate) use boundary_runner::{collect_boundary, emit_boundary};
pub(crate) use cli_args::{
    AgentArgs, AgentCommand, Cli, ExecArgs, IndexArgs, InputArgs, Mode, PlayArgs, StartArgs,
    StateArgs,
};
pub(crate) use error_map::{
    emit_error, map_cli_game_path, map_cli_game_read, map_cli_state_invalid, map_cli_state_read,
    map_cli_state_write, map_engine_record, map_line_io, CliError,
};
pub(crate) use game_loader::{load_game_by_path, load_game_by_ref};
pub(crate) use line_mode::run_line_mode;
pub(crate) use models::{
    BoundaryEvent, BoundaryResult, LineCommandAction, LineCommandContext, LoadedGame, PlayerState,
    PLAYER_STATE_SCHEMA,
};
pub(crate) use session_ops::{
    create_session_for_game, emit_boundary_with_saved_state, load_session_from_state_for_game,
    load_session_from_state_for_ref, save_session_state, PlayerSession,
};
pub(crate) use state_store::{load_player_state, save_player_state};

const DEFAULT_STATE_FILE: &str = ".qsp/save.json";

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Agent(args) => agent::run_agent(args),
        Mode::Play(args) => run_play(args),
    }
}

/// Interactive mode. An existing state file for the same game is resumed.
fn run_play(args: PlayArgs) -> Result<i32, CliError> {
    let state_file = args
        .state_file
        .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
    let game = load_game_by_path(&args.game)?;
    let mut player = match load_session_from_state_for_game(std::path::Path::new(&state_file), &game)
    {
        Ok((_, player)) => player,
        Err(error) if error.code == "CLI_STATE_NOT_FOUND" => create_session_for_game(&game)?,
        Err(error) => return Err(error),
    };
    run_line_mode(&state_file, &mut player)
}

#[cfg(test)]
pub(crate) mod cli_test_support {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("qsp-rs-{}-{}", name, nanos))
    }

    pub(crate) fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent should be created");
        }
        fs::write(path, content).expect("file should be written");
    }

    /// Writes `source` as `game.txt` under `dir` and returns its path.
    pub(crate) fn write_game(dir: &Path, source: &str) -> PathBuf {
        let path = dir.join("game.txt");
        write_file(&path, source);
        path
    }
}
