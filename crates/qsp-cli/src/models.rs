use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub(crate) const PLAYER_STATE_SCHEMA: &str = "qsp-player-state.v1";

#[derive(Debug, Clone)]
pub(crate) struct LoadedGame {
    pub(crate) id: String,
    pub(crate) path: PathBuf,
    pub(crate) bytes: Vec<u8>,
}

impl LoadedGame {
    /// Directory that `inclib`, `openqst` and save files resolve against.
    pub(crate) fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerState {
    pub(crate) schema_version: String,
    pub(crate) game_id: String,
    pub(crate) snapshot: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundaryEvent {
    Actions,
    Input,
    End,
}

#[derive(Debug, Clone)]
pub(crate) struct BoundaryResult {
    pub(crate) event: BoundaryEvent,
    pub(crate) location: Option<String>,
    pub(crate) main_text: String,
    pub(crate) vars_text: String,
    pub(crate) messages: Vec<String>,
    pub(crate) actions: Vec<(usize, String)>,
    pub(crate) objects: Vec<(usize, String)>,
    pub(crate) input_prompt_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineCommandAction {
    NotHandled,
    Continue,
    RefreshBoundary,
    Quit,
}

pub(crate) struct LineCommandContext<'a> {
    pub(crate) state_file: &'a str,
}
