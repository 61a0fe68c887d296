mod boundary;
mod eval;
mod frame_stack;
mod functions;
mod lifecycle;
mod lists;
mod rng;
mod snapshot;
mod statements;
mod step;

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use qsp_core::{
    BlockStep, CodeRef, CurrentState, EngineState, ErrorKind, ErrorRecord, GameBundle, ListItem,
    LocationSource, LoopPhase, QspError, SavedVariable, Variant, WindowFlags, WindowKind,
};
use qsp_parser::ast::{CodeBlock, LoopStatement};
use qsp_parser::ParseLimits;
use regex::Regex;

use crate::variables::VariableStore;

pub use lifecycle::{
    build_timestamp, EngineLimits, HostCallbacks, NullHost, QspEngineOptions,
    DEFAULT_ENGINE_VERSION,
};
pub use snapshot::SNAPSHOT_FORMAT_VERSION;

pub(crate) const LINE_BREAK: &str = "\r\n";
const DEFAULT_TIMER_INTERVAL: i64 = 500;
const REGEX_CACHE_SIZE: usize = 10;

/// Why the frame machine stopped before running out of frames.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Fault(QspError),
    /// The frame stack was replaced (goto, restore); the run loop starts over.
    Restarted,
    /// Top-level `input` with no answer; the prompt is kept for the host.
    Suspend(String),
}

impl From<QspError> for Interrupt {
    fn from(error: QspError) -> Self {
        Self::Fault(error)
    }
}

pub(crate) type Exec<T> = Result<T, Interrupt>;

#[derive(Debug)]
struct Location {
    source: LocationSource,
    code: Rc<CodeBlock>,
    actions: Vec<Rc<CodeBlock>>,
    included: bool,
}

#[derive(Debug, Clone)]
struct ActionEntry {
    name: String,
    image: Option<String>,
    code: CodeRef,
    block: Rc<CodeBlock>,
    location: Option<String>,
    action_index: i64,
}

#[derive(Debug, Clone)]
enum FrameKind {
    Routine {
        saved_real: CurrentState,
        capture_result: bool,
    },
    Block,
    Loop {
        stmt: Rc<LoopStatement>,
        phase: LoopPhase,
    },
    /// Runs the location named by each item of `var` in turn.
    Hooks {
        var: String,
        args: Vec<Variant>,
        next: usize,
    },
}

#[derive(Debug, Clone)]
struct Frame {
    code: Option<CodeRef>,
    path: Vec<BlockStep>,
    block: Rc<CodeBlock>,
    location: Option<String>,
    action_index: i64,
    tracks_lines: bool,
    line: usize,
    stmt: usize,
    exec: Option<(usize, usize)>,
    kind: FrameKind,
    locals: Vec<SavedVariable>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChangeFlags {
    main_desc: bool,
    vars_desc: bool,
    actions: bool,
    objects: bool,
}

pub struct QspEngine {
    host: Box<dyn HostCallbacks>,
    limits: EngineLimits,
    parse_limits: ParseLimits,
    engine_version: String,
    initial_random_seed: u32,

    loaded: bool,
    game_id: u32,
    locations: Vec<Location>,
    location_index: HashMap<String, usize>,
    included: Vec<LocationSource>,

    state: EngineState,
    vars: VariableStore,
    frames: Vec<Frame>,
    actions: Vec<ActionEntry>,
    objects: Vec<ListItem>,
    selected_action: Option<usize>,
    selected_object: Option<usize>,
    current_location: Option<String>,
    real: CurrentState,
    main_desc: String,
    vars_desc: String,
    input_text: String,
    windows: WindowFlags,
    timer_interval: i64,
    rng_state: u32,

    pending_input: Option<String>,
    resume_input: Option<String>,
    last_result: Option<Variant>,
    last_error: ErrorRecord,
    debug: bool,
    epoch: u64,
    nesting: usize,
    changes: ChangeFlags,
    full_refresh_count: u64,
    regex_cache: Vec<(String, Regex)>,
    started: Instant,
}

#[cfg(test)]
pub(crate) mod runtime_test_support {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use qsp_core::BaseActionSource;

    /// Host double that records notifications and answers prompts from queues.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingHost {
        pub(crate) log: Rc<RefCell<Vec<String>>>,
        pub(crate) inputs: VecDeque<Option<String>>,
        pub(crate) menu_choices: VecDeque<Option<usize>>,
        pub(crate) files: HashMap<String, Vec<u8>>,
        pub(crate) saved: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl HostCallbacks for RecordingHost {
        fn show_message(&mut self, text: &str) {
            self.log.borrow_mut().push(format!("msg:{}", text));
        }

        fn show_window(&mut self, kind: WindowKind, visible: bool) {
            self.log
                .borrow_mut()
                .push(format!("window:{:?}:{}", kind, visible));
        }

        fn show_menu(&mut self, items: &[ListItem]) -> Option<usize> {
            let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
            self.log
                .borrow_mut()
                .push(format!("menu:{}", names.join("|")));
            self.menu_choices.pop_front().flatten()
        }

        fn play_file(&mut self, path: &str, volume: i64) {
            self.log.borrow_mut().push(format!("play:{}:{}", path, volume));
        }

        fn set_timer(&mut self, msecs: i64) {
            self.log.borrow_mut().push(format!("timer:{}", msecs));
        }

        fn input_box(&mut self, prompt: &str) -> Option<String> {
            self.log.borrow_mut().push(format!("input:{}", prompt));
            self.inputs.pop_front().flatten()
        }

        fn read_game_file(&mut self, path: &str) -> Option<Vec<u8>> {
            self.files.get(path).cloned()
        }

        fn open_game(&mut self, path: Option<&str>) -> Option<Vec<u8>> {
            path.and_then(|path| self.files.get(path).cloned())
                .or_else(|| self.saved.borrow().last().cloned())
        }

        fn save_game(&mut self, _path: Option<&str>, state: &[u8]) -> bool {
            self.saved.borrow_mut().push(state.to_vec());
            true
        }

        fn debug(&mut self, text: &str) {
            self.log.borrow_mut().push(format!("debug:{}", text));
        }
    }

    pub(crate) fn location(name: &str, code: &str) -> LocationSource {
        LocationSource {
            name: name.to_string(),
            code: code.to_string(),
            ..LocationSource::default()
        }
    }

    pub(crate) fn location_with_actions(
        name: &str,
        desc: &str,
        code: &str,
        actions: &[(&str, &str)],
    ) -> LocationSource {
        LocationSource {
            name: name.to_string(),
            desc: desc.to_string(),
            code: code.to_string(),
            actions: actions
                .iter()
                .map(|(name, code)| BaseActionSource {
                    name: (*name).to_string(),
                    image: String::new(),
                    code: (*code).to_string(),
                })
                .collect(),
        }
    }

    pub(crate) fn bundle_from_locations(locations: Vec<LocationSource>) -> GameBundle {
        GameBundle { locations }
    }

    pub(crate) fn engine_with_host(
        locations: Vec<LocationSource>,
        host: RecordingHost,
    ) -> QspEngine {
        let mut engine = QspEngine::new(QspEngineOptions {
            host: Some(Box::new(host)),
            limits: EngineLimits::default(),
            random_seed: Some(1),
            engine_version: None,
        });
        engine
            .load_game_bundle(bundle_from_locations(locations), false)
            .expect("bundle should load");
        engine
    }

    pub(crate) fn engine_from_locations(locations: Vec<LocationSource>) -> QspEngine {
        engine_with_host(locations, RecordingHost::default())
    }

    pub(crate) fn run_code(engine: &mut QspEngine, code: &str) {
        engine.execute_code(code).expect("code should run");
    }

    pub(crate) fn number(engine: &QspEngine, name: &str) -> i64 {
        engine.numeric_variable(name, 0)
    }

    pub(crate) fn text(engine: &QspEngine, name: &str) -> String {
        engine.text_variable(name, 0)
    }
}
