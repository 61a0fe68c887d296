use super::*;

use qsp_parser::parse_expression;

impl QspEngine {
    pub(super) fn run_operation(
        &mut self,
        start: impl FnOnce(&mut Self) -> Exec<()>,
    ) -> Result<(), QspError> {
        self.drive(false, start)
    }

    /// Runs one top-level operation: `start` sets up frames, then the frame
    /// machine runs until the stack is empty, input is needed or a fault stops
    /// it. `resume` keeps the frames of a suspended operation.
    fn drive(
        &mut self,
        resume: bool,
        start: impl FnOnce(&mut Self) -> Exec<()>,
    ) -> Result<(), QspError> {
        if !self.loaded || self.state == EngineState::Terminated {
            let error = QspError::new(ErrorKind::GameNotLoaded, "No game is loaded.");
            self.record_error(&error);
            return Err(error);
        }
        self.changes = ChangeFlags::default();
        if !resume && !self.frames.is_empty() {
            tracing::debug!(frames = self.frames.len(), "abandoning suspended operation");
            self.unwind_frames();
        }
        self.pending_input = None;
        self.nesting = 0;
        self.state = EngineState::Running;

        let mut outcome = start(self).and_then(|()| self.run_frames(0));
        while let Err(Interrupt::Restarted) = outcome {
            outcome = self.run_frames(0);
        }
        self.resume_input = None;
        match outcome {
            Ok(()) => {
                self.state = EngineState::Idle;
                Ok(())
            }
            Err(Interrupt::Suspend(prompt)) => {
                self.pending_input = Some(prompt);
                self.state = EngineState::AwaitingInput;
                Ok(())
            }
            Err(Interrupt::Fault(error)) => {
                self.fail(&error);
                Err(error)
            }
            Err(Interrupt::Restarted) => Ok(()),
        }
    }

    /// Records a fault raised while frames were running, then drops them.
    fn fail(&mut self, error: &QspError) {
        self.record_error(error);
        let executing = |frame: &Frame| {
            frame
                .exec
                .and_then(|(line, _)| frame.block.lines.get(line))
                .map(|line| (line.line_num, line.text.clone()))
        };
        if let Some((top_line, _)) = self.frames.iter().find_map(executing) {
            self.last_error.top_line = top_line;
        }
        if let Some((actual_line, text)) = self.frames.iter().rev().find_map(executing) {
            self.last_error.actual_line = actual_line;
            self.last_error.line_text = text;
        }
        self.unwind_frames();
        self.state = if error.kind == ErrorKind::StackOverflow {
            EngineState::Terminated
        } else {
            EngineState::Error
        };
        tracing::warn!(
            kind = error.kind.code(),
            location = ?self.last_error.location,
            line = self.last_error.actual_line,
            message = %error.message,
            "operation failed"
        );
    }

    pub(super) fn record_error(&mut self, error: &QspError) {
        self.last_error = ErrorRecord {
            kind: Some(error.kind),
            description: error.message.clone(),
            location: self.real.location.clone(),
            action_index: self.real.action_index,
            top_line: self.real.line,
            actual_line: self.real.line,
            line_text: String::new(),
        };
    }

    /// Runs script text as if it were the body of a nameless location.
    pub fn execute_code(&mut self, code: &str) -> Result<(), QspError> {
        self.run_operation(|engine| engine.push_source_call(code.to_string(), Vec::new(), false))
    }

    pub fn evaluate_text(&mut self, expr: &str) -> Result<String, QspError> {
        Ok(self.evaluate(expr)?.into_text())
    }

    /// Text that does not read as a number evaluates to 0.
    pub fn evaluate_numeric(&mut self, expr: &str) -> Result<i64, QspError> {
        Ok(self.evaluate(expr)?.to_number())
    }

    fn evaluate(&mut self, expr: &str) -> Result<Variant, QspError> {
        let mut value = None;
        self.run_operation(|engine| {
            let expr = parse_expression(expr, &engine.parse_limits)?;
            value = Some(engine.nested(|engine| engine.eval(&expr))?);
            Ok(())
        })?;
        Ok(value.unwrap_or_default())
    }

    /// Runs a location the way `gosub` does.
    pub fn execute_location(&mut self, name: &str) -> Result<(), QspError> {
        self.run_operation(|engine| engine.enter_location(name, Vec::new(), false, false))
    }

    /// Runs the locations listed in `$COUNTER`.
    pub fn run_counter(&mut self) -> Result<(), QspError> {
        self.run_operation(|engine| {
            engine.push_hooks("COUNTER", Vec::new());
            Ok(())
        })
    }

    /// Hands the current input text to the game. A suspended `input` gets it as
    /// its answer; otherwise the `$USERCOM` locations run.
    pub fn submit_input(&mut self) -> Result<(), QspError> {
        if self.pending_input.is_some() && self.state == EngineState::AwaitingInput {
            self.resume_input = Some(self.input_text.clone());
            return self.drive(true, |_| Ok(()));
        }
        self.run_operation(|engine| {
            engine.push_hooks("USERCOM", Vec::new());
            Ok(())
        })
    }

    /// Selects an action and runs `$ONACTSEL`. Out of range indices are
    /// rejected without touching the selection.
    pub fn select_action(&mut self, index: usize) -> Result<bool, QspError> {
        if index >= self.actions.len() {
            return Ok(false);
        }
        if self.selected_action == Some(index) {
            return Ok(true);
        }
        self.run_operation(|engine| {
            engine.selected_action = Some(index);
            engine.push_hooks("ONACTSEL", Vec::new());
            Ok(())
        })?;
        Ok(true)
    }

    /// Runs the code of the selected action. `false` when nothing is selected.
    pub fn execute_selected_action(&mut self) -> Result<bool, QspError> {
        let Some(action) = self
            .selected_action
            .and_then(|index| self.actions.get(index))
            .cloned()
        else {
            return Ok(false);
        };
        self.run_operation(|engine| {
            tracing::debug!(action = %action.name, "execute action");
            engine.push_routine(
                action.code,
                action.block,
                action.location,
                action.action_index,
                Vec::new(),
                false,
            )
        })?;
        Ok(true)
    }

    pub fn select_object(&mut self, index: usize) -> Result<bool, QspError> {
        if index >= self.objects.len() {
            return Ok(false);
        }
        if self.selected_object == Some(index) {
            return Ok(true);
        }
        self.run_operation(|engine| {
            engine.selected_object = Some(index);
            engine.push_hooks("ONOBJSEL", Vec::new());
            Ok(())
        })?;
        Ok(true)
    }

    /// Runs `$ONGSAVE` and returns the snapshot bytes. While input is pending
    /// the hooks are skipped so the suspended frames survive.
    pub fn save_state(&mut self) -> Result<Vec<u8>, QspError> {
        if self.pending_input.is_none() {
            self.run_operation(|engine| {
                engine.push_hooks("ONGSAVE", Vec::new());
                Ok(())
            })?;
        }
        self.snapshot().map_err(|error| {
            self.record_error(&error);
            error
        })
    }

    /// Restores a snapshot, then runs `$ONGLOAD` unless the snapshot was taken
    /// while waiting for input. Bad bytes leave the engine untouched.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), QspError> {
        if !self.loaded || self.state == EngineState::Terminated {
            return self.run_operation(|_| Ok(()));
        }
        let restored = self.prepare_restore(bytes).map_err(|error| {
            self.record_error(&error);
            error
        })?;
        self.run_operation(|engine| {
            engine.apply_restore(restored);
            match engine.pending_input.take() {
                Some(prompt) => Err(Interrupt::Suspend(prompt)),
                None => {
                    engine.push_hooks("ONGLOAD", Vec::new());
                    Ok(())
                }
            }
        })
    }
}

#[cfg(test)]
mod boundary_tests {
    use super::runtime_test_support::*;
    use super::*;

    #[test]
    fn select_action_rejects_out_of_range_indices() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(&mut engine, "act 'a': x = 1");
        assert!(engine.select_action(0).expect("select"));
        assert!(!engine.select_action(1).expect("out of range"));
        assert_eq!(engine.selected_action_index(), Some(0));
    }

    #[test]
    fn selected_action_runs_its_code_and_selection_hooks() {
        let mut engine = engine_from_locations(vec![
            location_with_actions("start", "", "", &[("Take", "taken += 1")]),
            location("picked", "hook = 1"),
        ]);
        engine.restart().expect("restart");
        run_code(&mut engine, "$onactsel = 'picked'");
        assert!(!engine.execute_selected_action().expect("nothing selected"));
        assert!(engine.select_action(0).expect("select"));
        assert_eq!(number(&engine, "hook"), 1);
        assert!(engine.execute_selected_action().expect("run"));
        assert_eq!(number(&engine, "taken"), 1);
        assert_eq!(engine.current_state().location.as_deref(), Some("start"));
    }

    #[test]
    fn select_object_runs_onobjsel() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("sel", "$seen = $selobj"),
        ]);
        run_code(&mut engine, "$onobjsel = 'sel' & addobj 'Lamp'");
        assert!(!engine.select_object(3).expect("out of range"));
        assert!(engine.select_object(0).expect("select"));
        assert_eq!(text(&engine, "seen"), "Lamp");
    }

    #[test]
    fn fault_records_position_and_keeps_the_session_usable() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("bad", "a = 1\nb = 1 / 0"),
        ]);
        let error = engine.execute_location("bad").expect_err("div by zero");
        assert_eq!(error.kind, ErrorKind::DivByZero);
        let record = engine.last_error().clone();
        assert_eq!(record.kind, Some(ErrorKind::DivByZero));
        assert_eq!(record.location.as_deref(), Some("bad"));
        assert_eq!(record.actual_line, 2);
        assert_eq!(record.line_text, "b = 1 / 0");
        assert_eq!(engine.engine_state(), EngineState::Error);
        run_code(&mut engine, "c = 2");
        assert_eq!(number(&engine, "c"), 2);
        assert_eq!(engine.last_error().kind, Some(ErrorKind::DivByZero));
        engine.clear_error();
        assert!(!engine.last_error().is_set());
    }

    #[test]
    fn input_suspends_and_resumes_at_the_same_statement() {
        let mut engine = engine_from_locations(vec![location(
            "start",
            "before = 1\n$name = $input('Who?')\nafter = 1",
        )]);
        engine.execute_location("start").expect("run");
        assert_eq!(engine.engine_state(), EngineState::AwaitingInput);
        assert_eq!(engine.pending_input_prompt(), Some("Who?"));
        assert_eq!(number(&engine, "before"), 1);
        assert_eq!(number(&engine, "after"), 0);
        engine.set_input_text("Ann");
        engine.submit_input().expect("resume");
        assert_eq!(engine.engine_state(), EngineState::Idle);
        assert_eq!(text(&engine, "name"), "Ann");
        assert_eq!(number(&engine, "after"), 1);
        assert_eq!(engine.pending_input_prompt(), None);
    }

    #[test]
    fn a_new_operation_abandons_pending_input() {
        let mut engine = engine_from_locations(vec![location(
            "start",
            "$name = $input('Who?')\nafter = 1",
        )]);
        engine.execute_location("start").expect("run");
        run_code(&mut engine, "other = 1");
        assert_eq!(engine.engine_state(), EngineState::Idle);
        assert_eq!(engine.pending_input_prompt(), None);
        engine.submit_input().expect("usercom");
        assert_eq!(number(&engine, "after"), 0);
    }

    #[test]
    fn submit_input_without_pending_prompt_runs_usercom() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("command", "$heard = $user_text"),
        ]);
        run_code(&mut engine, "$usercom = 'command'");
        engine.set_input_text("look");
        engine.submit_input().expect("usercom");
        assert_eq!(text(&engine, "heard"), "look");
    }

    #[test]
    fn evaluate_numeric_reads_text_as_zero() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        assert_eq!(engine.evaluate_numeric("'abc'").expect("text"), 0);
        assert_eq!(engine.evaluate_numeric("'42'").expect("numeric text"), 42);
        assert!(!engine.last_error().is_set());
        let error = engine.evaluate_numeric("1 +").expect_err("syntax");
        assert_eq!(error.kind, ErrorKind::Syntax);
    }

    #[test]
    fn change_flags_reset_per_operation() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(&mut engine, "*p 'x' & addobj 'o'");
        assert!(engine.is_main_desc_changed());
        assert!(engine.is_objects_changed());
        run_code(&mut engine, "y = 1");
        assert!(!engine.is_main_desc_changed());
        assert!(!engine.is_objects_changed());
    }
}
