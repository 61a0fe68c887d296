use super::*;

use std::collections::BTreeMap;

use qsp_core::{GameSnapshot, SnapshotAction, SnapshotFrame, SnapshotFrameKind, VariableData};
use qsp_parser::ast::Statement;
use qsp_parser::compile_code;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 8] = b"QSPSNAP\0";
const HEADER_LEN: usize = 8 + 4 + 8;
const CHECKSUM_LEN: usize = 4;

pub(super) fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn load_error(message: impl Into<String>) -> QspError {
    QspError::new(ErrorKind::CannotLoadFile, message)
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw: [u8; 8] = bytes.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

/// Splits a snapshot file into its JSON payload after checking the envelope.
fn unwrap_payload(bytes: &[u8]) -> Result<&[u8], QspError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN || &bytes[..8] != MAGIC {
        return Err(load_error("Not a saved game."));
    }
    let version = read_u32(bytes, 8).ok_or_else(|| load_error("Truncated saved game."))?;
    if version != SNAPSHOT_FORMAT_VERSION {
        return Err(load_error(format!(
            "Unsupported saved game version {}.",
            version
        )));
    }
    let len = read_u64(bytes, 12).ok_or_else(|| load_error("Truncated saved game."))?;
    let len = usize::try_from(len).map_err(|_| load_error("Saved game is too large."))?;
    let expected = HEADER_LEN
        .checked_add(len)
        .and_then(|total| total.checked_add(CHECKSUM_LEN));
    if expected != Some(bytes.len()) {
        return Err(load_error("Saved game length does not match its header."));
    }
    let payload = &bytes[HEADER_LEN..HEADER_LEN + len];
    let checksum = read_u32(bytes, HEADER_LEN + len).ok_or_else(|| load_error("Truncated saved game."))?;
    if checksum != fnv1a(payload) {
        return Err(load_error("Saved game checksum mismatch."));
    }
    Ok(payload)
}

/// Fully validated state ready to replace the engine's own.
pub(super) struct Restored {
    variables: BTreeMap<String, VariableData>,
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
    included: Vec<Location>,
}

/// Locations visible to a snapshot: the game's own plus the libraries it had
/// included when saved.
struct World<'a> {
    engine: &'a QspEngine,
    included: &'a [Location],
}

impl World<'_> {
    fn location(&self, name: &str) -> Option<&Location> {
        let key = name.trim().to_uppercase();
        self.engine
            .locations
            .iter()
            .filter(|location| !location.included)
            .chain(self.included.iter())
            .find(|location| location.source.name.trim().to_uppercase() == key)
    }

    fn block(&self, code: &CodeRef) -> Result<Rc<CodeBlock>, QspError> {
        match code {
            CodeRef::Location { name } => self
                .location(name)
                .map(|location| location.code.clone())
                .ok_or_else(|| load_error(format!("Saved game refers to missing location \"{}\".", name))),
            CodeRef::BaseAction { location, index } => self
                .location(location)
                .and_then(|found| found.actions.get(*index).cloned())
                .ok_or_else(|| {
                    load_error(format!(
                        "Saved game refers to missing action {} of \"{}\".",
                        index, location
                    ))
                }),
            CodeRef::Source { text, first_line } => Ok(Rc::new(compile_code(
                text,
                *first_line,
                &self.engine.parse_limits,
            ))),
        }
    }

    fn frame(&self, saved: SnapshotFrame) -> Result<Frame, QspError> {
        let broken = || load_error("Saved game has an invalid call stack.");
        let (block, kind) = match saved.kind {
            SnapshotFrameKind::Hooks { var, args, next } => (
                Rc::new(CodeBlock::default()),
                FrameKind::Hooks { var, args, next },
            ),
            kind => {
                let code = saved.code.as_ref().ok_or_else(broken)?;
                let mut block = self.block(code)?;
                let mut owner = None;
                for step in &saved.path {
                    let stmt = block
                        .lines
                        .get(step.line)
                        .and_then(|line| line.stmts.get(step.stmt))
                        .cloned()
                        .ok_or_else(broken)?;
                    block = stmt.child_block(step.branch).ok_or_else(broken)?;
                    owner = Some(stmt);
                }
                match kind {
                    SnapshotFrameKind::Routine {
                        saved_real,
                        capture_result,
                    } => (
                        block,
                        FrameKind::Routine {
                            saved_real,
                            capture_result,
                        },
                    ),
                    SnapshotFrameKind::Block => (block, FrameKind::Block),
                    SnapshotFrameKind::Loop { phase } => {
                        let Some(Statement::Loop(stmt)) = owner else {
                            return Err(broken());
                        };
                        let block = if phase == LoopPhase::Check {
                            Rc::new(CodeBlock::default())
                        } else {
                            block
                        };
                        (block, FrameKind::Loop { stmt, phase })
                    }
                    SnapshotFrameKind::Hooks { .. } => return Err(broken()),
                }
            }
        };
        if saved.line > block.lines.len() {
            return Err(broken());
        }
        Ok(Frame {
            code: saved.code,
            path: saved.path,
            block,
            location: saved.location,
            action_index: saved.action_index,
            tracks_lines: saved.tracks_lines,
            line: saved.line,
            stmt: saved.stmt,
            exec: None,
            kind,
            locals: saved.locals,
        })
    }
}

impl QspEngine {
    /// Serializes the game state. The call stack is kept only while an
    /// `input` is pending; otherwise there is nothing to resume.
    pub fn snapshot(&self) -> Result<Vec<u8>, QspError> {
        let frames = if self.pending_input.is_some() {
            self.frames.iter().map(snapshot_frame).collect()
        } else {
            Vec::new()
        };
        let document = GameSnapshot {
            game_id: self.game_id,
            engine_version: self.engine_version.clone(),
            variables: self.vars.data().clone(),
            frames,
            actions: self
                .actions
                .iter()
                .map(|action| SnapshotAction {
                    name: action.name.clone(),
                    image: action.image.clone(),
                    code: action.code.clone(),
                    location: action.location.clone(),
                    action_index: action.action_index,
                })
                .collect(),
            objects: self.objects.clone(),
            selected_action: self.selected_action,
            selected_object: self.selected_object,
            current_location: self.current_location.clone(),
            real_state: self.real.clone(),
            main_desc: self.main_desc.clone(),
            vars_desc: self.vars_desc.clone(),
            input_text: self.input_text.clone(),
            windows: self.windows,
            timer_interval: self.timer_interval,
            rng_state: self.rng_state,
            pending_input: self.pending_input.clone(),
            included: self.included.clone(),
        };
        let payload = serde_json::to_vec(&document).map_err(|error| {
            QspError::new(
                ErrorKind::CannotLoadFile,
                format!("Cannot serialize game state: {}", error),
            )
        })?;
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&fnv1a(&payload).to_le_bytes());
        tracing::debug!(bytes = out.len(), frames = document.frames.len(), "snapshot taken");
        Ok(out)
    }

    /// Replaces the game state with a snapshot; nothing changes on failure.
    pub(super) fn restore(&mut self, bytes: &[u8]) -> Result<(), QspError> {
        let restored = self.prepare_restore(bytes)?;
        self.apply_restore(restored);
        Ok(())
    }

    pub(super) fn prepare_restore(&self, bytes: &[u8]) -> Result<Restored, QspError> {
        let payload = unwrap_payload(bytes)?;
        let document: GameSnapshot = serde_json::from_slice(payload)
            .map_err(|error| load_error(format!("Invalid saved game: {}", error)))?;
        if document.game_id != self.game_id {
            return Err(load_error("Saved game belongs to another game."));
        }
        let included: Vec<Location> = document
            .included
            .into_iter()
            .map(|source| self.compile_location(source, true))
            .collect();
        let world = World {
            engine: self,
            included: &included,
        };
        if let Some(name) = &document.current_location {
            if world.location(name).is_none() {
                return Err(load_error(format!(
                    "Saved game refers to missing location \"{}\".",
                    name
                )));
            }
        }
        let frames = document
            .frames
            .into_iter()
            .map(|frame| world.frame(frame))
            .collect::<Result<Vec<_>, _>>()?;
        let actions = document
            .actions
            .into_iter()
            .map(|action| {
                let block = world.block(&action.code)?;
                Ok(ActionEntry {
                    name: action.name,
                    image: action.image,
                    code: action.code,
                    block,
                    location: action.location,
                    action_index: action.action_index,
                })
            })
            .collect::<Result<Vec<_>, QspError>>()?;
        if document
            .selected_action
            .is_some_and(|index| index >= actions.len())
            || document
                .selected_object
                .is_some_and(|index| index >= document.objects.len())
        {
            return Err(load_error("Saved game has an invalid selection."));
        }
        if document.pending_input.is_some() == frames.is_empty() {
            return Err(load_error("Saved game has an invalid call stack."));
        }
        Ok(Restored {
            variables: document.variables,
            frames,
            actions,
            objects: document.objects,
            selected_action: document.selected_action,
            selected_object: document.selected_object,
            current_location: document.current_location,
            real: document.real_state,
            main_desc: document.main_desc,
            vars_desc: document.vars_desc,
            input_text: document.input_text,
            windows: document.windows,
            timer_interval: document.timer_interval,
            rng_state: document.rng_state,
            pending_input: document.pending_input,
            included,
        })
    }

    pub(super) fn apply_restore(&mut self, restored: Restored) {
        self.frames.clear();
        self.nesting = 0;
        self.epoch += 1;
        self.drop_included_locations();
        for location in restored.included {
            self.register_location(location);
        }
        self.vars.replace_data(restored.variables);
        self.frames = restored.frames;
        self.actions = restored.actions;
        self.objects = restored.objects;
        self.selected_action = restored.selected_action;
        self.selected_object = restored.selected_object;
        self.current_location = restored.current_location;
        self.real = restored.real;
        self.main_desc = restored.main_desc;
        self.vars_desc = restored.vars_desc;
        self.input_text = restored.input_text;
        self.windows = restored.windows;
        self.timer_interval = restored.timer_interval;
        self.rng_state = restored.rng_state;
        self.pending_input = restored.pending_input;
        self.resume_input = None;
        self.changes = ChangeFlags {
            main_desc: true,
            vars_desc: true,
            actions: true,
            objects: true,
        };
        self.full_refresh_count += 1;
        for kind in [
            WindowKind::Actions,
            WindowKind::Objects,
            WindowKind::Vars,
            WindowKind::Input,
        ] {
            self.host.show_window(kind, self.windows.get(kind));
        }
        self.host.set_input_text(&self.input_text);
        self.host.set_timer(self.timer_interval);
        tracing::debug!(
            frames = self.frames.len(),
            location = ?self.current_location,
            "snapshot restored"
        );
    }
}

fn snapshot_frame(frame: &Frame) -> SnapshotFrame {
    let kind = match &frame.kind {
        FrameKind::Routine {
            saved_real,
            capture_result,
        } => SnapshotFrameKind::Routine {
            saved_real: saved_real.clone(),
            capture_result: *capture_result,
        },
        FrameKind::Block => SnapshotFrameKind::Block,
        FrameKind::Loop { phase, .. } => SnapshotFrameKind::Loop { phase: *phase },
        FrameKind::Hooks { var, args, next } => SnapshotFrameKind::Hooks {
            var: var.clone(),
            args: args.clone(),
            next: *next,
        },
    };
    SnapshotFrame {
        code: frame.code.clone(),
        location: frame.location.clone(),
        action_index: frame.action_index,
        tracks_lines: frame.tracks_lines,
        path: frame.path.clone(),
        line: frame.line,
        stmt: frame.stmt,
        kind,
        locals: frame.locals.clone(),
    }
}

#[cfg(test)]
mod snapshot_tests {
    use super::runtime_test_support::*;
    use super::*;

    fn sample_engine() -> QspEngine {
        let mut engine = engine_from_locations(vec![
            location_with_actions("start", "Start <<gold>>", "gold = 3", &[("Look", "looked = 1")]),
            location("shop", "$item = 'sword'"),
        ]);
        engine.restart().expect("restart");
        run_code(
            &mut engine,
            "$name['hero'] = 'Ann' & addobj 'Lamp', 'lamp.png' & act 'Wave': waved = 1\np 'stats' & showobjs 0 & x = rand(1, 100)",
        );
        engine
    }

    #[test]
    fn snapshot_restore_snapshot_is_byte_identical() {
        let mut engine = sample_engine();
        let first = engine.save_state().expect("save");
        engine.load_state(&first).expect("load");
        let second = engine.save_state().expect("save again");
        assert_eq!(first, second);
    }

    #[test]
    fn restore_reproduces_the_game() {
        let mut engine = sample_engine();
        let saved = engine.save_state().expect("save");
        let rolls: Vec<i64> = (0..3)
            .map(|_| engine.evaluate_numeric("rand(1, 1000)").expect("roll"))
            .collect();
        run_code(&mut engine, "killall & cla & gold = 0");

        engine.load_state(&saved).expect("load");
        assert_eq!(number(&engine, "gold"), 3);
        assert_eq!(engine.text_variable("name", 0), "Ann");
        assert_eq!(engine.variable_index_by_text("name", "HERO"), 0);
        assert_eq!(engine.objects()[0].image.as_deref(), Some("lamp.png"));
        assert!(!engine.window_visible(WindowKind::Objects));
        assert_eq!(engine.vars_description(), "stats");
        assert_eq!(engine.main_description(), "Start 0");
        assert_eq!(engine.current_location(), Some("start"));
        let again: Vec<i64> = (0..3)
            .map(|_| engine.evaluate_numeric("rand(1, 1000)").expect("roll"))
            .collect();
        assert_eq!(rolls, again);

        assert!(engine.select_action(1).expect("select"));
        assert!(engine.execute_selected_action().expect("wave"));
        assert_eq!(number(&engine, "waved"), 1);
        assert!(engine.select_action(0).expect("select"));
        assert!(engine.execute_selected_action().expect("look"));
        assert_eq!(number(&engine, "looked"), 1);
    }

    #[test]
    fn corrupted_bytes_leave_state_untouched() {
        let mut engine = sample_engine();
        let before = engine.save_state().expect("save");
        let mut corrupted = before.clone();
        let middle = corrupted.len() / 2;
        corrupted[middle] ^= 0x55;
        for bytes in [
            &corrupted[..],
            &before[..before.len() - 3],
            &b"QSPSNAP\0"[..],
            &b""[..],
        ] {
            let error = engine.load_state(bytes).expect_err("corrupted");
            assert_eq!(error.kind, ErrorKind::CannotLoadFile);
            assert_eq!(engine.last_error().kind, Some(ErrorKind::CannotLoadFile));
        }
        assert_eq!(engine.save_state().expect("save"), before);
    }

    #[test]
    fn oversized_length_header_is_rejected() {
        let mut engine = sample_engine();
        let before = engine.save_state().expect("save");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(u64::MAX - 3).to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        let error = engine.load_state(&bytes).expect_err("length overflow");
        assert_eq!(error.kind, ErrorKind::CannotLoadFile);
        assert_eq!(engine.save_state().expect("save"), before);
    }

    #[test]
    fn other_version_or_game_is_rejected() {
        let mut engine = sample_engine();
        let mut saved = engine.save_state().expect("save");
        saved[8] = 9;
        let error = engine.load_state(&saved).expect_err("version");
        assert_eq!(error.kind, ErrorKind::CannotLoadFile);

        let saved = engine.save_state().expect("save");
        let mut other = engine_from_locations(vec![location("elsewhere", "")]);
        let error = other.load_state(&saved).expect_err("other game");
        assert_eq!(error.kind, ErrorKind::CannotLoadFile);
    }

    #[test]
    fn pending_input_survives_a_round_trip() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location(
                "ask",
                "loop i = 1 while i <= 2 step i += 1:\n  if i = 2:\n    $answer = $input('Name?')\n  end\nend\ndone = 1",
            ),
        ]);
        engine.execute_location("ask").expect("run");
        assert_eq!(engine.pending_input_prompt(), Some("Name?"));
        let saved = engine.save_state().expect("save");

        let mut resumed = engine_from_locations(vec![
            location("start", ""),
            location(
                "ask",
                "loop i = 1 while i <= 2 step i += 1:\n  if i = 2:\n    $answer = $input('Name?')\n  end\nend\ndone = 1",
            ),
        ]);
        resumed.load_state(&saved).expect("load");
        assert_eq!(resumed.engine_state(), EngineState::AwaitingInput);
        assert_eq!(resumed.pending_input_prompt(), Some("Name?"));
        assert_eq!(resumed.save_state().expect("save"), saved);
        resumed.set_input_text("Ann");
        resumed.submit_input().expect("resume");
        assert_eq!(text(&resumed, "answer"), "Ann");
        assert_eq!(number(&resumed, "done"), 1);
        assert_eq!(number(&resumed, "i"), 3);
    }

    #[test]
    fn ongload_runs_after_load() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("loaded", "loads += 1"),
        ]);
        run_code(&mut engine, "$ongload = 'loaded'");
        let saved = engine.save_state().expect("save");
        engine.load_state(&saved).expect("load");
        assert_eq!(number(&engine, "loads"), 1);
    }
}
