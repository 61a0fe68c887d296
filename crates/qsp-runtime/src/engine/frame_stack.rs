use super::*;

use qsp_parser::compile_code;

const ARGS_VAR: &str = "ARGS";
pub(super) const RESULT_VAR: &str = "RESULT";

impl QspEngine {
    fn routine_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| matches!(frame.kind, FrameKind::Routine { .. }))
            .count()
    }

    /// Pushes a call frame. ARGS and RESULT are saved with it and restored when
    /// it is popped.
    pub(super) fn push_routine(
        &mut self,
        code: CodeRef,
        block: Rc<CodeBlock>,
        location: Option<String>,
        action_index: i64,
        args: Vec<Variant>,
        capture_result: bool,
    ) -> Exec<()> {
        if self.routine_depth() >= self.limits.max_call_depth {
            return Err(QspError::new(
                ErrorKind::StackOverflow,
                format!(
                    "Call depth exceeds {} nested calls.",
                    self.limits.max_call_depth
                ),
            )
            .into());
        }
        let tracks_lines = location.is_some();
        let locals = vec![
            SavedVariable {
                name: ARGS_VAR.to_string(),
                data: self.vars.take(ARGS_VAR),
            },
            SavedVariable {
                name: RESULT_VAR.to_string(),
                data: self.vars.take(RESULT_VAR),
            },
        ];
        let saved_real = self.real.clone();
        self.frames.push(Frame {
            code: Some(code),
            path: Vec::new(),
            block,
            location: location.clone(),
            action_index,
            tracks_lines,
            line: 0,
            stmt: 0,
            exec: None,
            kind: FrameKind::Routine {
                saved_real,
                capture_result,
            },
            locals,
        });
        if !args.is_empty() {
            self.vars.set_array(ARGS_VAR, args)?;
        }
        if tracks_lines {
            self.real = CurrentState {
                location,
                action_index,
                line: 0,
            };
        }
        Ok(())
    }

    /// Enters a nested block of the statement the top frame is executing.
    pub(super) fn push_child(&mut self, kind: FrameKind, branch: usize, block: Rc<CodeBlock>) {
        let Some(parent) = self.frames.last() else {
            return;
        };
        let (line, stmt) = parent.exec.unwrap_or((parent.line, parent.stmt));
        let mut path = parent.path.clone();
        path.push(BlockStep { line, stmt, branch });
        let frame = Frame {
            code: parent.code.clone(),
            path,
            block,
            location: parent.location.clone(),
            action_index: parent.action_index,
            tracks_lines: parent.tracks_lines,
            line: 0,
            stmt: 0,
            exec: None,
            kind,
            locals: Vec::new(),
        };
        self.frames.push(frame);
    }

    pub(super) fn push_hooks(&mut self, var: &str, args: Vec<Variant>) {
        self.frames.push(Frame {
            code: None,
            path: Vec::new(),
            block: Rc::new(CodeBlock::default()),
            location: None,
            action_index: -1,
            tracks_lines: false,
            line: 0,
            stmt: 0,
            exec: None,
            kind: FrameKind::Hooks {
                var: var.to_string(),
                args,
                next: 0,
            },
            locals: Vec::new(),
        });
    }

    /// Pops the top frame, restoring its locals. The caller's position comes
    /// back only while outer frames remain, so after an operation the state
    /// reflects the last line of the outermost code.
    pub(super) fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if let FrameKind::Routine {
            capture_result: true,
            ..
        } = frame.kind
        {
            self.last_result = self.vars.value(RESULT_VAR, 0).cloned();
        }
        for saved in frame.locals.into_iter().rev() {
            self.vars.restore(&saved.name, saved.data);
        }
        if let FrameKind::Routine { saved_real, .. } = frame.kind {
            if !self.frames.is_empty() {
                self.real = saved_real;
            }
        }
    }

    pub(super) fn unwind_frames(&mut self) {
        while !self.frames.is_empty() {
            self.pop_frame();
        }
        self.nesting = 0;
    }

    /// Declares `name` local to the innermost frame.
    pub(super) fn declare_local(&mut self, name: &str) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if frame.locals.iter().any(|saved| saved.name == name) {
            self.vars.remove(name);
            return;
        }
        frame.locals.push(SavedVariable {
            name: name.to_string(),
            data: self.vars.take(name),
        });
    }

    /// Runs a location as a call: its description is appended (or replaces the
    /// main one when `change_desc`), base actions are added, then its code is
    /// pushed.
    pub(super) fn enter_location(
        &mut self,
        name: &str,
        args: Vec<Variant>,
        change_desc: bool,
        capture_result: bool,
    ) -> Exec<()> {
        let index = self.find_location(name).ok_or_else(|| {
            QspError::new(
                ErrorKind::LocationNotFound,
                format!("Location \"{}\" not found.", name),
            )
        })?;
        let source = self.locations[index].source.clone();
        let code = self.locations[index].code.clone();
        let action_blocks = self.locations[index].actions.clone();
        tracing::debug!(location = %source.name, change_desc, "enter location");
        self.real = CurrentState {
            location: Some(source.name.clone()),
            action_index: -1,
            line: 0,
        };
        let desc = self.nested(|engine| engine.format_text(&source.desc))?;
        if change_desc {
            self.main_desc = desc;
            self.changes.main_desc = true;
        } else if !desc.is_empty() {
            self.main_desc.push_str(&desc);
            self.changes.main_desc = true;
        }
        for (action_index, action) in source.actions.iter().enumerate() {
            let action_name = self.nested(|engine| engine.format_text(&action.name))?;
            if action_name.is_empty() {
                break;
            }
            let Some(block) = action_blocks.get(action_index).cloned() else {
                break;
            };
            let image = (!action.image.is_empty()).then(|| action.image.clone());
            self.add_action(ActionEntry {
                name: action_name,
                image,
                code: CodeRef::BaseAction {
                    location: source.name.clone(),
                    index: action_index,
                },
                block,
                location: Some(source.name.clone()),
                action_index: action_index as i64,
            })?;
        }
        self.push_routine(
            CodeRef::Location {
                name: source.name.clone(),
            },
            code,
            Some(source.name),
            -1,
            args,
            capture_result,
        )
    }

    /// `goto`/`xgoto`: drops every running frame and moves to `name`; the
    /// ONNEWLOC hooks run after the location code.
    pub(super) fn navigate(&mut self, name: &str, args: Vec<Variant>, change_desc: bool) -> Exec<()> {
        let index = self.find_location(name).ok_or_else(|| {
            QspError::new(
                ErrorKind::LocationNotFound,
                format!("Location \"{}\" not found.", name),
            )
        })?;
        let target = self.locations[index].source.name.clone();
        tracing::debug!(location = %target, change_desc, "goto");
        self.unwind_frames();
        self.epoch += 1;
        self.clear_actions();
        if change_desc {
            self.full_refresh_count += 1;
        }
        self.current_location = Some(target.clone());
        self.push_hooks("ONNEWLOC", args.clone());
        self.enter_location(&target, args, change_desc, false)
    }

    /// `exit`: leaves the innermost call.
    pub(super) fn exit_routine(&mut self) {
        while let Some(frame) = self.frames.last() {
            let routine = matches!(frame.kind, FrameKind::Routine { .. });
            self.pop_frame();
            if routine {
                break;
            }
        }
    }

    /// Moves execution to `:label`, searching enclosing blocks up to the
    /// innermost call.
    pub(super) fn jump_to_label(&mut self, label: &str) -> Exec<()> {
        let label = label.trim().to_uppercase();
        let mut found = None;
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            if let Some(line) = frame.block.find_label(&label) {
                found = Some((depth, line));
                break;
            }
            if !matches!(frame.kind, FrameKind::Block | FrameKind::Loop { .. }) {
                break;
            }
        }
        let Some((depth, line)) = found else {
            return Err(QspError::new(
                ErrorKind::LabelNotFound,
                format!("Label \"{}\" not found.", label),
            )
            .into());
        };
        while self.frames.len() > depth + 1 {
            self.pop_frame();
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
            frame.stmt = 0;
            frame.exec = None;
        }
        Ok(())
    }

    /// Runs `body` as nested evaluation: `input` there never suspends.
    pub(super) fn nested<T>(&mut self, body: impl FnOnce(&mut Self) -> Exec<T>) -> Exec<T> {
        if self.nesting >= self.limits.max_nested_calls {
            return Err(QspError::new(
                ErrorKind::StackOverflow,
                format!(
                    "Nested calls exceed {} levels.",
                    self.limits.max_nested_calls
                ),
            )
            .into());
        }
        self.nesting += 1;
        let result = body(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    /// Runs a location to completion inside an expression and returns RESULT,
    /// `None` when the location never set it.
    pub(super) fn call_location(&mut self, name: &str, args: Vec<Variant>) -> Exec<Option<Variant>> {
        self.nested(|engine| {
            let floor = engine.frames.len();
            engine.last_result = None;
            engine.enter_location(name, args, false, true)?;
            engine.run_frames(floor)?;
            Ok(engine.last_result.take())
        })
    }

    pub(super) fn run_hooks_nested(&mut self, var: &str, args: Vec<Variant>) -> Exec<()> {
        self.nested(|engine| {
            let floor = engine.frames.len();
            engine.push_hooks(var, args);
            engine.run_frames(floor)
        })
    }

    /// Code behind a [`CodeRef`], recompiled for dynamic sources.
    pub(super) fn code_block(&self, code: &CodeRef) -> Result<Rc<CodeBlock>, QspError> {
        match code {
            CodeRef::Location { name } => self
                .find_location(name)
                .map(|index| self.locations[index].code.clone())
                .ok_or_else(|| {
                    QspError::new(
                        ErrorKind::LocationNotFound,
                        format!("Location \"{}\" not found.", name),
                    )
                }),
            CodeRef::BaseAction { location, index } => self
                .find_location(location)
                .and_then(|found| self.locations[found].actions.get(*index).cloned())
                .ok_or_else(|| {
                    QspError::new(
                        ErrorKind::UnknownAction,
                        format!("Action {} of location \"{}\" not found.", index, location),
                    )
                }),
            CodeRef::Source { text, first_line } => Ok(Rc::new(compile_code(
                text,
                *first_line,
                &self.parse_limits,
            ))),
        }
    }
}

#[cfg(test)]
mod frame_stack_tests {
    use super::runtime_test_support::*;
    use super::*;

    #[test]
    fn nested_calls_return_to_the_caller_line() {
        let mut engine = engine_from_locations(vec![
            location("a", "x = 1\ngosub 'b'\ny = x + 1\nz = 3"),
            location("b", "x = 10\n\nx += 5"),
        ]);
        engine.execute_location("a").expect("run a");
        assert_eq!(number(&engine, "y"), 16);
        let state = engine.current_state();
        assert_eq!(state.location.as_deref(), Some("a"));
        assert_eq!(state.line, 4);
    }

    #[test]
    fn args_and_result_are_scoped_to_the_call() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("twice", "result = args[0] * 2"),
        ]);
        run_code(
            &mut engine,
            "args[0] = 7 & result = 1 & x = func('twice', 21) & y = args[0] & z = result",
        );
        assert_eq!(number(&engine, "x"), 42);
        assert_eq!(number(&engine, "y"), 7);
        assert_eq!(number(&engine, "z"), 1);
    }

    #[test]
    fn locals_are_restored_when_their_block_ends() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("inner", "local x = 5\ny = x"),
        ]);
        run_code(&mut engine, "x = 1\ngosub 'inner'\nz = x");
        assert_eq!(number(&engine, "y"), 5);
        assert_eq!(number(&engine, "z"), 1);
        run_code(&mut engine, "if 1:\n  local x = 9\n  w = x\nend\nv = x");
        assert_eq!(number(&engine, "w"), 9);
        assert_eq!(number(&engine, "v"), 1);
    }

    #[test]
    fn call_depth_is_bounded() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("loop", "gosub 'loop'"),
        ]);
        let error = engine.execute_location("loop").expect_err("overflow");
        assert_eq!(error.kind, ErrorKind::StackOverflow);
        assert_eq!(engine.engine_state(), EngineState::Terminated);
        assert!(engine.frames.is_empty());
    }

    #[test]
    fn func_and_dyneval_recursion_is_bounded() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("rec", "result = func('rec')"),
        ]);
        let error = engine
            .evaluate_numeric("func('rec')")
            .expect_err("func recursion should overflow");
        assert_eq!(error.kind, ErrorKind::StackOverflow);
        assert_eq!(engine.engine_state(), EngineState::Terminated);
        assert!(engine.frames.is_empty());
        assert_eq!(engine.nesting, 0);

        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("again", "$code = 'result = dyneval($code)'\nresult = dyneval($code)"),
        ]);
        let error = engine
            .execute_location("again")
            .expect_err("dyneval recursion should overflow");
        assert_eq!(error.kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn nested_calls_within_the_limit_run() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("down", "if args[0] > 0: result = func('down', args[0] - 1) + 1"),
        ]);
        let depth = EngineLimits::default().max_nested_calls as i64 - 1;
        assert_eq!(
            engine
                .evaluate_numeric(&format!("func('down', {})", depth - 1))
                .expect("recursion within the limit"),
            depth - 1
        );
    }

    #[test]
    fn exit_leaves_only_the_innermost_call() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("sub", "a = 1\nif 1:\n  exit\nend\na = 2"),
        ]);
        run_code(&mut engine, "gosub 'sub'\nb = 1");
        assert_eq!(number(&engine, "a"), 1);
        assert_eq!(number(&engine, "b"), 1);
    }

    #[test]
    fn jump_finds_labels_in_enclosing_blocks() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(
            &mut engine,
            "i = 0\n:Again\ni += 1\nif i < 3:\n  jump 'again'\nend\ndone = i",
        );
        assert_eq!(number(&engine, "done"), 3);
        let error = engine.execute_code("jump 'nowhere'").expect_err("missing");
        assert_eq!(error.kind, ErrorKind::LabelNotFound);
    }

    #[test]
    fn goto_replaces_the_description_and_runs_onnewloc() {
        let mut engine = engine_from_locations(vec![
            location_with_actions("start", "Start", "", &[("Stay", "")]),
            location_with_actions("hall", "Hall <<n>>", "n += 1", &[("Back", "goto 'start'")]),
            location("hook", "$hooked = $args[0]"),
        ]);
        run_code(&mut engine, "n = 1 & $onnewloc = 'hook' & goto 'hall', 'x' & never = 1");
        assert_eq!(engine.main_description(), "Hall 1");
        assert_eq!(number(&engine, "n"), 2);
        assert_eq!(text(&engine, "hooked"), "x");
        assert_eq!(number(&engine, "never"), 0);
        assert_eq!(engine.current_location(), Some("hall"));
        let names: Vec<String> = engine.actions().into_iter().map(|item| item.name).collect();
        assert_eq!(names, vec!["Back".to_string()]);
    }

    #[test]
    fn gosub_appends_description_and_base_actions() {
        let mut engine = engine_from_locations(vec![
            location_with_actions("start", "Top.", "gosub 'side'", &[("One", "")]),
            location_with_actions("side", " Side.", "", &[("Two", "")]),
        ]);
        engine.restart().expect("restart");
        assert_eq!(engine.main_description(), "Top. Side.");
        assert_eq!(engine.actions().len(), 2);
    }

    #[test]
    fn missing_location_is_reported() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        for code in ["gosub 'nope'", "goto 'nope'", "x = func('nope')"] {
            let error = engine.execute_code(code).expect_err("missing location");
            assert_eq!(error.kind, ErrorKind::LocationNotFound);
        }
    }
}
