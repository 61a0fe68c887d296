use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{map_cli_game_path, map_cli_game_read, CliError, LoadedGame};

const GAME_EXTENSIONS: [&str; 4] = ["qsp", "gam", "json", "txt"];
const GAME_REF_PREFIX: &str = "game:";

/// Loads a game from a file, or from the single game file inside a directory.
pub(crate) fn load_game_by_path(game: &str) -> Result<LoadedGame, CliError> {
    let resolved = resolve_game_path(game)?;
    let path = if resolved.is_dir() {
        find_game_in_dir(&resolved)?
    } else {
        resolved
    };
    let bytes = fs::read(&path).map_err(map_cli_game_read)?;
    Ok(LoadedGame {
        id: make_game_id(&path),
        path,
        bytes,
    })
}

pub(crate) fn load_game_by_ref(game_ref: &str) -> Result<LoadedGame, CliError> {
    let Some(raw) = game_ref.strip_prefix(GAME_REF_PREFIX) else {
        return Err(CliError::new(
            "CLI_GAME_REF_INVALID",
            format!("Unsupported game ref: {}", game_ref),
        ));
    };
    load_game_by_path(raw)
}

pub(crate) fn resolve_game_path(game: &str) -> Result<PathBuf, CliError> {
    let path = PathBuf::from(game);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_game_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(CliError::new(
            "CLI_GAME_NOT_FOUND",
            format!("game does not exist: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

pub(crate) fn find_game_in_dir(dir: &Path) -> Result<PathBuf, CliError> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_game_file(path))
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(CliError::new(
            "CLI_GAME_EMPTY",
            format!(
                "No .qsp/.gam/.json/.txt game under {}",
                dir.display()
            ),
        )),
        1 => Ok(candidates.remove(0)),
        count => Err(CliError::new(
            "CLI_GAME_AMBIGUOUS",
            format!("{} game files under {}", count, dir.display()),
        )),
    }
}

fn is_game_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            GAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

pub(crate) fn make_game_id(path: &Path) -> String {
    format!("{}{}", GAME_REF_PREFIX, path.display())
}
