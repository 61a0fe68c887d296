use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Variant;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameBundle {
    pub locations: Vec<LocationSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationSource {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub actions: Vec<BaseActionSource>,
}

/// Action declared in the location header rather than by an `act` statement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaseActionSource {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub code: String,
}

/// Entry of the action, object or menu list as shown to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowKind {
    Actions,
    Objects,
    Vars,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowFlags {
    pub actions: bool,
    pub objects: bool,
    pub vars: bool,
    pub input: bool,
}

impl Default for WindowFlags {
    fn default() -> Self {
        Self {
            actions: true,
            objects: true,
            vars: true,
            input: true,
        }
    }
}

impl WindowFlags {
    pub fn get(&self, kind: WindowKind) -> bool {
        match kind {
            WindowKind::Actions => self.actions,
            WindowKind::Objects => self.objects,
            WindowKind::Vars => self.vars,
            WindowKind::Input => self.input,
        }
    }

    pub fn set(&mut self, kind: WindowKind, visible: bool) {
        match kind {
            WindowKind::Actions => self.actions = visible,
            WindowKind::Objects => self.objects = visible,
            WindowKind::Vars => self.vars = visible,
            WindowKind::Input => self.input = visible,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    Idle,
    Running,
    AwaitingInput,
    Error,
    Terminated,
}

/// Position of the statement currently (or most recently) executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    pub location: Option<String>,
    pub action_index: i64,
    pub line: usize,
}

impl Default for CurrentState {
    fn default() -> Self {
        Self {
            location: None,
            action_index: -1,
            line: 0,
        }
    }
}

/// Where a piece of running code comes from, so it can be recompiled after a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CodeRef {
    Location {
        name: String,
    },
    BaseAction {
        location: String,
        index: usize,
    },
    Source {
        text: String,
        #[serde(rename = "firstLine")]
        first_line: usize,
    },
}

/// One hop from a code block into a nested block: the statement at
/// `line`/`stmt` and which of its child blocks was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStep {
    pub line: usize,
    pub stmt: usize,
    pub branch: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopPhase {
    Init,
    Check,
    Body,
    Step,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableData {
    pub values: Vec<Variant>,
    #[serde(default)]
    pub indices: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedVariable {
    pub name: String,
    pub data: Option<VariableData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SnapshotFrameKind {
    Routine {
        #[serde(rename = "savedReal")]
        saved_real: CurrentState,
        #[serde(rename = "captureResult")]
        capture_result: bool,
    },
    Block,
    Loop {
        phase: LoopPhase,
    },
    Hooks {
        var: String,
        args: Vec<Variant>,
        next: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFrame {
    pub code: Option<CodeRef>,
    pub location: Option<String>,
    pub action_index: i64,
    pub tracks_lines: bool,
    pub path: Vec<BlockStep>,
    pub line: usize,
    pub stmt: usize,
    pub kind: SnapshotFrameKind,
    pub locals: Vec<SavedVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotAction {
    pub name: String,
    pub image: Option<String>,
    pub code: CodeRef,
    pub location: Option<String>,
    pub action_index: i64,
}

/// Serializable closure of a running game. Only ordered containers are used so
/// the JSON encoding of equal states is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: u32,
    pub engine_version: String,
    pub variables: BTreeMap<String, VariableData>,
    pub frames: Vec<SnapshotFrame>,
    pub actions: Vec<SnapshotAction>,
    pub objects: Vec<ListItem>,
    pub selected_action: Option<usize>,
    pub selected_object: Option<usize>,
    pub current_location: Option<String>,
    pub real_state: CurrentState,
    pub main_desc: String,
    pub vars_desc: String,
    pub input_text: String,
    pub windows: WindowFlags,
    pub timer_interval: i64,
    pub rng_state: u32,
    pub pending_input: Option<String>,
    pub included: Vec<LocationSource>,
}
